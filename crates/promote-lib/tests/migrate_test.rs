#![allow(unused_crate_dependencies, reason = "integration tests link the whole dependency set")]
use promote_lib::commands::migrate::{MigrateError, Migrator, Targets};
use promote_lib::commands::validate::Validator;
use promote_lib::config::MigrationSettings;
use promote_lib::domain::{
    BackupFolders, ContentItem, ContentRepository as _, FolderIndex, ModuleDefinition, ObjectKind,
    ObjectUpdate, RepositoryError, Tag,
};
use promote_lib::infrastructure::{MemoryRepository, Operation};
use serde_json::json;

const CLEAN_REPORT: &str =
    "<report xmlns=\"http://developer.cognos.com/schemas/report/16.0/\"><layouts/></report>";
const SQL_REPORT: &str = "<report xmlns=\"http://developer.cognos.com/schemas/report/16.0/\"><queries><query><source><sqlQuery><sqlText>select 1</sqlText></sqlQuery></source></query></queries></report>";

fn settings() -> MigrationSettings {
    MigrationSettings {
        tag: Tag::new("(tag)").unwrap(),
        root_folder_id: "team_folders".to_owned(),
        main_folders: vec!["Sales".to_owned()],
        admin_folder_name: "Admin".to_owned(),
        backup_folder_name: "Backup".to_owned(),
        backup_subfolders: Vec::new(),
        template_report_id: "tpl-report".to_owned(),
        template_dashboard_id: "tpl-dashboard".to_owned(),
        description_prefixes: vec!["owner:".to_owned()],
        required_source: "Greenplum".to_owned(),
    }
}

fn greenplum_module(label: &str, identifier: &str) -> ModuleDefinition {
    serde_json::from_value(json!({
        "label": label,
        "identifier": identifier,
        "useSpec": [{"ancestors": [{"defaultName": "Greenplum"}]}]
    }))
    .unwrap()
}

struct Fixture {
    source: MemoryRepository,
    destination: MemoryRepository,
    source_sales: String,
    dest_sales: String,
    source_main: FolderIndex,
    dest_main: FolderIndex,
    dest_backup: BackupFolders,
    settings: MigrationSettings,
}

impl Fixture {
    fn new() -> Self {
        let source = MemoryRepository::new("dev", "team_folders");
        let destination = MemoryRepository::new("prod", "team_folders");
        let source_sales = source.add_folder("team_folders", "Sales");
        let dest_sales = destination.add_folder("team_folders", "Sales");
        destination.insert(
            "team_folders",
            ContentItem::new("tpl-report", "Report template", ObjectKind::Report),
        );
        destination.insert(
            "team_folders",
            ContentItem::new("tpl-dashboard", "Dashboard template", ObjectKind::Dashboard),
        );
        Self {
            source_main: [("Sales", source_sales.as_str())].into_iter().collect(),
            dest_main: [("Sales", dest_sales.as_str())].into_iter().collect(),
            source,
            destination,
            source_sales,
            dest_sales,
            dest_backup: BackupFolders::default(),
            settings: settings(),
        }
    }

    fn add_report(&self, id: &str, name: &str, specification: &str) -> ContentItem {
        let item = ContentItem::new(id, name, ObjectKind::Report)
            .with_specification(specification)
            .with_module(ModuleDefinition::default())
            .with_description("Monthly sales");
        self.source.insert(&self.source_sales, item.clone());
        item.with_path(vec!["Sales".to_owned()])
    }

    fn add_module(&self, id: &str, name: &str, definition: ModuleDefinition) -> ContentItem {
        let item = ContentItem::new(id, name, ObjectKind::Module).with_description("owner: sales");
        self.source.insert(&self.source_sales, item.clone());
        self.source.set_module_definition(id, definition).unwrap();
        item.with_path(vec!["Sales".to_owned()])
    }

    fn migrate(&self, candidates: &[ContentItem]) -> Result<Vec<String>, MigrateError> {
        let validator = Validator::new(&self.source, &self.destination, &self.settings)?;
        let migrator = Migrator::new(&self.source, &self.destination, &self.settings, validator);
        migrator.migrate_objects(candidates, &self.targets())
    }

    fn migrate_one(&self, item: &ContentItem) -> Result<bool, MigrateError> {
        let validator = Validator::new(&self.source, &self.destination, &self.settings)?;
        let migrator = Migrator::new(&self.source, &self.destination, &self.settings, validator);
        migrator.migrate_object(item, &self.targets())
    }

    fn targets(&self) -> Targets<'_> {
        Targets {
            source_main: &self.source_main,
            dest_main: &self.dest_main,
            dest_backup: &self.dest_backup,
        }
    }

    fn dest_object(&self, folder_id: &str, name: &str, kind: &ObjectKind) -> Option<ContentItem> {
        self.destination
            .find_object_in_path(folder_id, &[], name, kind)
            .unwrap()
            .and_then(|id| self.destination.get(&id))
    }
}

#[test]
fn test_new_report_is_created_from_template() {
    let fx = Fixture::new();
    let item = fx.add_report("r1", "Sales Report (tag)", CLEAN_REPORT);

    let migrated = fx.migrate(std::slice::from_ref(&item)).unwrap();
    assert_eq!(migrated, vec!["Sales Report"]);

    let created = fx
        .dest_object(&fx.dest_sales, "Sales Report", &ObjectKind::Report)
        .unwrap();
    assert_eq!(created.specification.as_deref(), Some(CLEAN_REPORT));
    assert_eq!(created.default_description.as_deref(), Some("Monthly sales"));
    assert_eq!(fx.destination.parent_of(&created.id), Some(fx.dest_sales.clone()));

    let ops = fx.destination.operations();
    assert_eq!(ops.len(), 3);
    assert_eq!(
        ops[0],
        Operation::Copy {
            source_id: "tpl-report".to_owned(),
            dest_folder_id: fx.dest_sales.clone(),
            recursive: false,
            new_id: created.id.clone(),
        }
    );
    assert_eq!(
        ops[1],
        Operation::Update {
            id: created.id.clone(),
            update: ObjectUpdate::rename(ObjectKind::Report, "Sales Report"),
        }
    );

    // The source loses its tag once promoted
    assert_eq!(fx.source.get("r1").unwrap().default_name, "Sales Report");
}

#[test]
fn test_new_report_lands_in_matching_subfolder() {
    let fx = Fixture::new();
    let q1 = fx.destination.add_folder(&fx.dest_sales, "Q1");
    let item = fx
        .add_report("r1", "Quarter (tag)", CLEAN_REPORT)
        .with_path(vec!["Sales".to_owned(), "Q1".to_owned()]);

    assert!(fx.migrate_one(&item).unwrap());
    assert!(fx.dest_object(&q1, "Quarter", &ObjectKind::Report).is_some());
    assert!(fx.dest_object(&fx.dest_sales, "Quarter", &ObjectKind::Report).is_none());
}

#[test]
fn test_missing_destination_subfolder_aborts() {
    let fx = Fixture::new();
    let item = fx
        .add_report("r1", "Quarter (tag)", CLEAN_REPORT)
        .with_path(vec!["Sales".to_owned(), "Q1".to_owned()]);

    let err = fx.migrate(&[item]).unwrap_err();
    assert!(matches!(&err, MigrateError::DestinationPath { segment, .. } if segment == "Q1"));
    assert!(fx.destination.operations().is_empty());
}

#[test]
fn test_existing_report_is_backed_up_then_replaced() {
    let mut fx = Fixture::new();
    let admin = fx.destination.add_folder("team_folders", "Admin");
    let backup = fx.destination.add_folder(&admin, "Backup");
    let reports = fx.destination.add_folder(&backup, "Reports");
    fx.dest_backup.insert(ObjectKind::Report, reports.as_str());
    fx.destination.insert(
        &fx.dest_sales,
        ContentItem::new("p1", "Sales Report", ObjectKind::Report).with_specification("<report/>"),
    );
    let item = fx.add_report("r1", "Sales Report (tag)", SQL_REPORT);

    assert!(fx.migrate_one(&item).unwrap());

    let ops = fx.destination.operations();
    assert!(matches!(
        &ops[0],
        Operation::Copy { source_id, dest_folder_id, recursive: true, .. }
            if source_id == "p1" && *dest_folder_id == reports
    ));
    assert_eq!(
        ops[1],
        Operation::Update {
            id: "p1".to_owned(),
            update: ObjectUpdate::content(
                ObjectKind::Report,
                Some(SQL_REPORT.to_owned()),
                Some(ModuleDefinition::default()),
                Some("Monthly sales".to_owned()),
            ),
        }
    );
    assert_eq!(ops.len(), 2);

    let replaced = fx.destination.get("p1").unwrap();
    assert_eq!(replaced.specification.as_deref(), Some(SQL_REPORT));
    let backups = fx.destination.folder_items(&reports).unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].specification.as_deref(), Some("<report/>"));
}

#[test]
fn test_existing_report_without_backup_folder_is_still_replaced() {
    let fx = Fixture::new();
    fx.destination.insert(
        &fx.dest_sales,
        ContentItem::new("p1", "Sales Report", ObjectKind::Report),
    );
    let item = fx.add_report("r1", "Sales Report (tag)", CLEAN_REPORT);

    assert!(fx.migrate_one(&item).unwrap());

    let ops = fx.destination.operations();
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], Operation::Update { id, .. } if id == "p1"));
}

#[test]
fn test_new_dashboard_uses_dashboard_template() {
    let fx = Fixture::new();
    let item = ContentItem::new("d1", "Board (tag)", ObjectKind::Dashboard)
        .with_specification("{\"widgets\":[]}");
    fx.source.insert(&fx.source_sales, item.clone());
    let item = item.with_path(vec!["Sales".to_owned()]);

    assert!(fx.migrate_one(&item).unwrap());

    let ops = fx.destination.operations();
    assert!(matches!(
        &ops[0],
        Operation::Copy { source_id, recursive: false, .. } if source_id == "tpl-dashboard"
    ));
    let created = fx
        .dest_object(&fx.dest_sales, "Board", &ObjectKind::Dashboard)
        .unwrap();
    assert_eq!(created.specification.as_deref(), Some("{\"widgets\":[]}"));
}

#[test]
fn test_description_is_fetched_when_listing_lacks_it() {
    let fx = Fixture::new();
    fx.add_report("r1", "Sales Report (tag)", CLEAN_REPORT);
    let listed = ContentItem::new("r1", "Sales Report (tag)", ObjectKind::Report)
        .with_specification(CLEAN_REPORT)
        .with_module(ModuleDefinition::default())
        .with_path(vec!["Sales".to_owned()]);

    assert!(fx.migrate_one(&listed).unwrap());

    let created = fx
        .dest_object(&fx.dest_sales, "Sales Report", &ObjectKind::Report)
        .unwrap();
    assert_eq!(created.default_description.as_deref(), Some("Monthly sales"));
}

#[test]
fn test_new_module_is_created_under_its_clean_name() {
    let fx = Fixture::new();
    let item = fx.add_module("m1", "Orders (tag)", greenplum_module("Orders (tag)", "orders_dev"));

    assert!(fx.migrate_one(&item).unwrap());

    let created = fx
        .dest_object(&fx.dest_sales, "Orders", &ObjectKind::Module)
        .unwrap();
    let definition = fx.destination.definition(&created.id).unwrap();
    assert_eq!(definition.label(), Some("Orders"));
    assert_eq!(definition.identifier(), Some("orders_dev"));
    assert_eq!(created.default_description.as_deref(), Some("owner: sales"));

    let ops = fx.destination.operations();
    assert!(matches!(&ops[0], Operation::CreateModule { folder_id, .. } if *folder_id == fx.dest_sales));
    assert_eq!(
        ops[1],
        Operation::Update {
            id: created.id.clone(),
            update: ObjectUpdate::description(ObjectKind::Module, Some("owner: sales".to_owned())),
        }
    );
    assert_eq!(fx.source.get("m1").unwrap().default_name, "Orders");
}

#[test]
fn test_existing_module_keeps_destination_label_and_identifier() {
    let fx = Fixture::new();
    fx.destination.insert(
        &fx.dest_sales,
        ContentItem::new("pm1", "Orders", ObjectKind::Module),
    );
    fx.destination
        .set_module_definition("pm1", greenplum_module("Orders", "orders_prod"))
        .unwrap();

    let source_definition = serde_json::from_value(json!({
        "label": "Orders (tag)",
        "identifier": "orders_dev",
        "version": "16.1",
        "querySubject": [],
        "useSpec": [{"ancestors": [{"defaultName": "Greenplum"}]}]
    }))
    .unwrap();
    let item = fx.add_module("m1", "Orders (tag)", source_definition);

    assert!(fx.migrate_one(&item).unwrap());

    let definition = fx.destination.definition("pm1").unwrap();
    assert_eq!(definition.label(), Some("Orders"));
    assert_eq!(definition.identifier(), Some("orders_prod"));
    assert_eq!(definition.document()["version"], "16.1");
    assert_eq!(definition.document()["querySubject"], json!([]));
    assert_eq!(
        fx.destination.get("pm1").unwrap().default_description.as_deref(),
        Some("owner: sales")
    );
}

#[test]
fn test_modules_migrate_before_reports_and_dashboards() {
    let fx = Fixture::new();
    let report = fx.add_report("r1", "Report A (tag)", CLEAN_REPORT);
    let first = fx.add_module("m1", "Module A (tag)", greenplum_module("A", "a"));
    let dashboard = ContentItem::new("d1", "Board (tag)", ObjectKind::Dashboard);
    fx.source.insert(&fx.source_sales, dashboard.clone());
    let dashboard = dashboard.with_path(vec!["Sales".to_owned()]);
    let second = fx.add_module("m2", "Module B (tag)", greenplum_module("B", "b"));

    let migrated = fx.migrate(&[report, first, dashboard, second]).unwrap();

    assert_eq!(
        migrated,
        vec!["Module A", "Module B", "Report A", "Board"]
    );
}

#[test]
fn test_skipped_objects_are_not_reported() {
    let fx = Fixture::new();
    let unsupported = ContentItem::new("u1", "Link (tag)", ObjectKind::from("URL"))
        .with_path(vec!["Sales".to_owned()]);
    let outside = ContentItem::new("r2", "Elsewhere (tag)", ObjectKind::Report)
        .with_path(vec!["Archive".to_owned()]);
    let invalid = fx.add_report("r3", "Raw SQL (tag)", SQL_REPORT);
    let valid = fx.add_report("r4", "Clean (tag)", CLEAN_REPORT);

    let migrated = fx
        .migrate(&[unsupported, outside, invalid, valid])
        .unwrap();

    assert_eq!(migrated, vec!["Clean"]);
    // A rejected object keeps its tag in the source
    assert_eq!(fx.source.get("r3").unwrap().default_name, "Raw SQL (tag)");
}

#[test]
fn test_tagged_folder_is_never_created() {
    let fx = Fixture::new();
    let folder = ContentItem::new("f1", "Archive (tag)", ObjectKind::Folder)
        .with_path(vec!["Sales".to_owned()]);
    fx.source.insert(&fx.source_sales, folder.clone());

    assert!(!fx.migrate_one(&folder).unwrap());
    assert!(fx.destination.operations().is_empty());
    assert_eq!(fx.source.get("f1").unwrap().default_name, "Archive (tag)");
}

#[test]
fn test_missing_destination_main_folder_skips_object() {
    let mut fx = Fixture::new();
    let hr = fx.source.add_folder("team_folders", "HR");
    fx.source_main.insert("HR", hr.as_str());
    let item = ContentItem::new("r1", "People (tag)", ObjectKind::Report)
        .with_specification(CLEAN_REPORT)
        .with_module(ModuleDefinition::default())
        .with_path(vec!["HR".to_owned()]);
    fx.source.insert(&hr, item.clone());

    assert!(!fx.migrate_one(&item).unwrap());
    assert!(fx.destination.operations().is_empty());
    assert!(fx.source.operations().is_empty());
}

#[test]
fn test_invalid_object_is_left_untouched() {
    let fx = Fixture::new();
    let item = fx.add_report("r1", "Raw SQL (tag)", SQL_REPORT);

    assert!(!fx.migrate_one(&item).unwrap());
    assert!(fx.destination.operations().is_empty());
    assert!(fx.source.operations().is_empty());
}

#[test]
fn test_write_failure_aborts_the_run() {
    let fx = Fixture::new();
    fx.destination.fail_on("copy");
    let first = fx.add_report("r1", "First (tag)", CLEAN_REPORT);
    let second = fx.add_report("r2", "Second (tag)", CLEAN_REPORT);

    let err = fx.migrate(&[first, second]).unwrap_err();

    assert!(matches!(
        err,
        MigrateError::Repository(RepositoryError::Api { operation: "copy", .. })
    ));
    assert!(fx.source.operations().is_empty());
}
