//! Promotion rules checked before an object is written.

use log::{debug, info, warn};
use regex::Regex;
use thiserror::Error;

use crate::config::MigrationSettings;
use crate::domain::{
    ContentItem, ContentRepository, FolderIndex, ModuleDefinition, ObjectKind, PathTarget,
    RepositoryError, SearchPath, Specification,
};

/// Root element of a report specification.
const REPORT_ELEMENT: &str = "report";
/// Element holding a query's SQL text.
const SQL_TEXT_ELEMENT: &str = "sqlText";
/// Root attribute that places the page tabs.
const PAGE_VIEW_ATTRIBUTE: &str = "viewPagesAsTabs";
/// Page tab placement required for reports on the required source.
const PAGE_VIEW_REQUIRED: &str = "bottomLeft";
/// Root attribute that turns on HTML pagination.
const PAGINATION_ATTRIBUTE: &str = "paginateHTMLOutput";
/// Prefix of a named SQL reference inside report SQL.
const NAMED_SQL_MARKER: &str = "sql_";
/// Named SQL reference inside module SQL.
const NAMED_SQL_PATTERN: &str = r"sql_[A-Za-z0-9_]+";

/// Errors that stop validation altogether. A failed rule is not an error.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The report specification does not parse.
    #[error("specification of report '{name}' is not valid XML")]
    Specification {
        /// Clean report name.
        name: String,
        /// Parser error.
        #[source]
        source: roxmltree::Error,
    },

    /// The server returned no XML for a report.
    #[error("report '{name}' has no XML specification")]
    MissingSpecification {
        /// Clean report name.
        name: String,
    },

    /// A module's main folder is missing on the destination.
    #[error("main folder '{folder}' of module '{module}' not found in {location}")]
    DestinationFolder {
        /// Main folder name.
        folder: String,
        /// Clean module name.
        module: String,
        /// Destination store.
        location: String,
    },

    /// The named SQL pattern does not compile.
    #[error("invalid named SQL pattern")]
    Pattern(#[from] regex::Error),

    /// A repository call failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// AND of named checks, each outcome logged as it is recorded.
struct Verdict {
    /// Object named in log lines.
    subject: String,
    /// Whether every check so far passed.
    ok: bool,
}

impl Verdict {
    /// A verdict with no checks, which passes.
    fn new(subject: String) -> Self {
        Self { subject, ok: true }
    }

    /// Record one check; `failure` is logged when it does not pass.
    fn check(&mut self, rule: &str, passed: bool, failure: &str) {
        if passed {
            debug!("{}: {rule} ok", self.subject);
        } else {
            warn!("{} {failure}", self.subject);
            self.ok = false;
        }
    }

    /// Log the outcome and return it.
    fn finish(self) -> bool {
        info!("==========================================");
        if self.ok {
            info!("{} passed validation", self.subject);
        } else {
            info!("{} failed validation", self.subject);
        }
        self.ok
    }
}

/// Where a module referenced by a report lives, below the main folders.
struct ModuleLocation<'path> {
    /// Main folder name.
    main_folder: &'path str,
    /// Folders between the main folder and the module.
    folders: &'path [String],
}

/// Decides whether a candidate may be promoted.
///
/// Reads go to the source store, except the lookup that decides whether a
/// module referenced by a report already exists in the destination.
pub struct Validator<'run, S: ContentRepository, D: ContentRepository> {
    /// Store candidates come from.
    source: &'run S,
    /// Store candidates go to.
    destination: &'run D,
    /// Promotion rules.
    settings: &'run MigrationSettings,
    /// Compiled [`NAMED_SQL_PATTERN`].
    named_sql: Regex,
}

impl<'run, S: ContentRepository, D: ContentRepository> Validator<'run, S, D> {
    /// A validator reading from `source` and looking up modules in `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Pattern`] if the named SQL pattern fails to compile.
    pub fn new(
        source: &'run S,
        destination: &'run D,
        settings: &'run MigrationSettings,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            source,
            destination,
            settings,
            named_sql: Regex::new(NAMED_SQL_PATTERN)?,
        })
    }

    /// Validate `item` for promotion. `is_new` tells whether the destination
    /// has no object of the same name yet. Kinds without rules always pass.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if a lookup fails or the specification is unreadable.
    pub fn validate(
        &self,
        item: &ContentItem,
        source_folders: &FolderIndex,
        dest_folders: &FolderIndex,
        is_new: bool,
    ) -> Result<bool, ValidationError> {
        match item.kind {
            ObjectKind::Report => self.check_report(item, source_folders, dest_folders, is_new),
            ObjectKind::Module => {
                let definition = self.source.module_definition(&item.id)?;
                self.check_module(item, &definition, dest_folders, is_new, None)
            }
            ObjectKind::Folder | ObjectKind::Dashboard | ObjectKind::Other(_) => {
                info!("Skipping validation for {item} (no rules for {})", item.kind);
                Ok(true)
            }
        }
    }

    /// Report rules, plus the module rules for every module the report uses.
    fn check_report(
        &self,
        item: &ContentItem,
        source_folders: &FolderIndex,
        dest_folders: &FolderIndex,
        is_new: bool,
    ) -> Result<bool, ValidationError> {
        let name = self.settings.tag.strip(&item.default_name);
        info!("Validating report {name}");

        let xml = self.report_specification(item, &name)?;
        let document = roxmltree::Document::parse(xml.trim()).map_err(|source| {
            ValidationError::Specification {
                name: name.clone(),
                source,
            }
        })?;
        let root = document.root_element();
        if root.tag_name().name() != REPORT_ELEMENT {
            warn!(
                "Report {name} root element is <{}>, expected <{REPORT_ELEMENT}>",
                root.tag_name().name()
            );
            return Ok(false);
        }

        let namespace = root.tag_name().namespace();
        let queries: Vec<String> = document
            .descendants()
            .filter(|node| {
                node.is_element()
                    && node.tag_name().name() == SQL_TEXT_ELEMENT
                    && node.tag_name().namespace() == namespace
            })
            .map(|node| {
                node.descendants()
                    .filter(roxmltree::Node::is_text)
                    .filter_map(|text| text.text())
                    .collect::<String>()
            })
            .collect();

        let mut verdict = Verdict::new(format!("Report {}", item.default_name));

        // The listing's `module` field is only the reference pushed back on
        // update; the modules endpoint serves the lineage.
        let lineage = self.source.module_definition(&item.id)?;
        let mut sources: Vec<String> = Vec::new();
        for use_spec in lineage.use_specs() {
            let Some(raw) = use_spec.search_path.as_deref() else {
                continue;
            };
            let path = match SearchPath::parse(raw) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Report {name}: cannot read module path '{raw}': {e}");
                    continue;
                }
            };
            let PathTarget::Object(module_name) = &path.target else {
                debug!("Report {name}: no module behind '{raw}'");
                continue;
            };
            let Some(main_folder) = path.main_folder() else {
                warn!("Module {module_name} used by report {name} is outside the main folders");
                continue;
            };
            let Some(folder_id) = source_folders.get(main_folder) else {
                warn!(
                    "Main folder {main_folder} for module {module_name} not found in {}",
                    self.source.location()
                );
                continue;
            };
            let Some(module_id) = self.source.find_object_in_path(
                folder_id,
                path.inner_folders(),
                module_name,
                &ObjectKind::Module,
            )?
            else {
                warn!(
                    "Module {module_name} not found in {} at path {path}",
                    self.source.location()
                );
                continue;
            };

            let definition = self.source.module_definition(&module_id)?;
            sources.extend(definition.sources());
            let module = self.source.content(&module_id)?;
            info!("Validating module {module_name} used in report {name}");
            let location = ModuleLocation {
                main_folder,
                folders: path.inner_folders(),
            };
            let module_ok =
                self.check_module(&module, &definition, dest_folders, true, Some(&location))?;
            verdict.check(
                "module",
                module_ok,
                &format!("uses module {module_name} that failed validation"),
            );
        }

        verdict.check(
            "no new SQL",
            !(is_new && !queries.is_empty()),
            "contains SQL; creation not allowed",
        );

        for query in &queries {
            let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
            verdict.check(
                "no named SQL",
                !normalized.contains(NAMED_SQL_MARKER),
                "contains references to named SQL queries",
            );
        }

        let required = self.settings.required_source.as_str();
        if sources.iter().any(|s| s == required) {
            verdict.check(
                "page view",
                root.attribute(PAGE_VIEW_ATTRIBUTE) == Some(PAGE_VIEW_REQUIRED),
                &format!(
                    "has incorrect page view settings for {required} source; expected {PAGE_VIEW_REQUIRED}"
                ),
            );
            verdict.check(
                "pagination",
                !root.has_attribute(PAGINATION_ATTRIBUTE),
                &format!("has HTML pagination enabled for {required} source"),
            );
        }

        Ok(verdict.finish())
    }

    /// The listing's XML, or the server's when the listing has none.
    fn report_specification(
        &self,
        item: &ContentItem,
        name: &str,
    ) -> Result<String, ValidationError> {
        if let Some(xml) = &item.specification {
            return Ok(xml.clone());
        }
        match self.source.specification(&item.id, &item.kind)? {
            Specification::Document(xml) => Ok(xml),
            Specification::Module(_) => Err(ValidationError::MissingSpecification {
                name: name.to_owned(),
            }),
        }
    }

    /// Module rules. A module reached through a report is looked up in the
    /// destination at `from_report` to decide whether it is new.
    fn check_module(
        &self,
        item: &ContentItem,
        definition: &ModuleDefinition,
        dest_folders: &FolderIndex,
        is_new: bool,
        from_report: Option<&ModuleLocation<'_>>,
    ) -> Result<bool, ValidationError> {
        let name = self.settings.tag.strip(&item.default_name);

        let creates_module = match from_report {
            Some(location) => {
                let folder_id = dest_folders.get(location.main_folder).ok_or_else(|| {
                    ValidationError::DestinationFolder {
                        folder: location.main_folder.to_owned(),
                        module: name.clone(),
                        location: self.destination.location().to_owned(),
                    }
                })?;
                self.destination
                    .find_object_in_path(folder_id, location.folders, &name, &ObjectKind::Module)?
                    .is_none()
            }
            None => is_new,
        };

        info!("Validating module {name}");
        let mut verdict = Verdict::new(format!("Module {}", item.default_name));

        let description = item
            .default_description
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        verdict.check(
            "description prefix",
            self.settings
                .description_prefixes
                .iter()
                .any(|prefix| description.starts_with(&prefix.to_lowercase())),
            "missing required description prefix",
        );

        for (subject, sql) in definition.sql_subjects() {
            verdict.check(
                "no named SQL",
                !self.named_sql.is_match(&sql),
                &format!("uses named SQL in {subject}"),
            );
        }

        if creates_module {
            verdict.check(
                "ascii name",
                name.is_ascii(),
                "contains non-ASCII characters in name",
            );
            for (subject, _) in definition.sql_subjects() {
                verdict.check("no SQL", false, &format!("contains SQL in {subject}"));
            }
            let required = self.settings.required_source.as_str();
            if let Some(other) = definition.sources().into_iter().find(|s| s != required) {
                verdict.check(
                    "source",
                    false,
                    &format!("uses source {other} instead of {required}"),
                );
            }
        }

        Ok(verdict.finish())
    }
}
