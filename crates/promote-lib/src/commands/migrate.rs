//! Creating and replacing objects in the destination store.

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::MigrationSettings;
use crate::domain::{
    BackupFolders, ContentItem, ContentRepository, FolderIndex, ObjectKind, ObjectUpdate,
    RepositoryError,
};

use super::validate::{ValidationError, Validator};

/// Errors that abort a migration run.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A folder below the destination main folder does not exist.
    #[error("destination path not found for segment '{segment}' in {path:?}")]
    DestinationPath {
        /// The first missing folder name.
        segment: String,
        /// The whole path being resolved.
        path: Vec<String>,
    },

    /// Validation could not complete.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A repository call failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Folder indexes resolved for one run.
pub struct Targets<'index> {
    /// Source main folders by name.
    pub source_main: &'index FolderIndex,
    /// Destination main folders by name.
    pub dest_main: &'index FolderIndex,
    /// Destination backup folders by kind.
    pub dest_backup: &'index BackupFolders,
}

/// How a new destination object comes into being.
enum Origin<'run> {
    /// Pushed from the source module definition.
    Module,
    /// Copied from a template object, then overwritten.
    Template(&'run str),
}

/// Promotes candidates from the source store to the destination store.
pub struct Migrator<'run, S: ContentRepository, D: ContentRepository> {
    /// Store objects are promoted from.
    source: &'run S,
    /// Store objects are promoted to.
    destination: &'run D,
    /// Folder layout and promotion rules.
    settings: &'run MigrationSettings,
    /// Checks every object before it is written.
    validator: Validator<'run, S, D>,
}

impl<'run, S: ContentRepository, D: ContentRepository> Migrator<'run, S, D> {
    /// A migrator writing to `destination` what it reads from `source`.
    #[must_use]
    pub fn new(
        source: &'run S,
        destination: &'run D,
        settings: &'run MigrationSettings,
        validator: Validator<'run, S, D>,
    ) -> Self {
        Self {
            source,
            destination,
            settings,
            validator,
        }
    }

    /// Migrate every candidate, modules first, and return the canonical names
    /// of those that were promoted, in migration order.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError`] on the first lookup or repository failure;
    /// objects already promoted stay promoted.
    pub fn migrate_objects(
        &self,
        candidates: &[ContentItem],
        targets: &Targets<'_>,
    ) -> Result<Vec<String>, MigrateError> {
        let mut ordered: Vec<&ContentItem> = candidates.iter().collect();
        ordered.sort_by_key(|item| item.kind != ObjectKind::Module);

        let mut migrated = Vec::new();
        for item in ordered {
            info!("Migrating object: {item}");
            if self.migrate_object(item, targets)? {
                migrated.push(self.settings.tag.strip(&item.default_name));
            }
        }
        Ok(migrated)
    }

    /// Promote a single object. Returns `false` when it is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError`] if a lookup or write fails.
    pub fn migrate_object(
        &self,
        item: &ContentItem,
        targets: &Targets<'_>,
    ) -> Result<bool, MigrateError> {
        let kind = &item.kind;
        let origin = match kind {
            ObjectKind::Module => Origin::Module,
            ObjectKind::Report => Origin::Template(&self.settings.template_report_id),
            ObjectKind::Dashboard => Origin::Template(&self.settings.template_dashboard_id),
            ObjectKind::Folder | ObjectKind::Other(_) => {
                warn!("Unsupported type {kind} for object {}", item.id);
                return Ok(false);
            }
        };

        let name = self.settings.tag.strip(&item.default_name);
        let Some(main_folder) = item
            .main_folder()
            .filter(|folder| targets.source_main.contains(folder))
        else {
            warn!("Object {} not in main folders", item.id);
            return Ok(false);
        };
        let Some(dest_main_id) = targets.dest_main.get(main_folder) else {
            error!("Destination main folder {main_folder} not found");
            return Ok(false);
        };

        let existing =
            self.destination
                .find_object_in_path(dest_main_id, item.sub_path(), &name, kind)?;
        let is_new = existing.is_none();

        if !self
            .validator
            .validate(item, targets.source_main, targets.dest_main, is_new)?
        {
            info!("Validation failed for {name}, skipping migration");
            return Ok(false);
        }
        info!("Is new object: {is_new}. Destination object ID: {existing:?}");

        match existing {
            None => {
                let folder_id = self.resolve_folder_path(dest_main_id, item.sub_path())?;
                self.create(item, &name, &folder_id, &origin)?;
            }
            Some(dest_id) => {
                self.backup(&dest_id, kind, targets.dest_backup)?;
                self.replace(item, &dest_id)?;
            }
        }

        self.source.rename_object(&item.id, &name, kind)?;
        Ok(true)
    }

    /// Walk `path` below `root_id` in the destination; every folder must exist.
    fn resolve_folder_path(
        &self,
        root_id: &str,
        path: &[String],
    ) -> Result<String, MigrateError> {
        let mut current = root_id.to_owned();
        for segment in path {
            current = self
                .destination
                .find_folder_id(&current, segment)?
                .ok_or_else(|| MigrateError::DestinationPath {
                    segment: segment.clone(),
                    path: path.to_vec(),
                })?;
        }
        Ok(current)
    }

    /// Originate `item` in `folder_id` under its clean `name`.
    fn create(
        &self,
        item: &ContentItem,
        name: &str,
        folder_id: &str,
        origin: &Origin<'_>,
    ) -> Result<(), MigrateError> {
        let kind = &item.kind;
        let description = self.source_description(item)?;

        match *origin {
            Origin::Module => {
                let mut definition = self.source.module_definition(&item.id)?;
                definition.set_label(name);
                let reported = self.destination.create_module(folder_id, &definition)?;
                debug!("Create module returned {reported:?}");

                let new_id = self
                    .destination
                    .find_object_in_path(folder_id, &[], name, kind)?
                    .ok_or_else(|| RepositoryError::NotFound {
                        kind: kind.clone(),
                        name: name.to_owned(),
                        folder_id: folder_id.to_owned(),
                    })?;
                self.destination
                    .update_object(&new_id, &ObjectUpdate::description(kind.clone(), description))?;
            }
            Origin::Template(template_id) => {
                let new_id = self.destination.copy_object(template_id, folder_id, false)?;
                self.destination.rename_object(&new_id, name, kind)?;
                self.destination
                    .update_object(&new_id, &content_update(item, description))?;
            }
        }
        Ok(())
    }

    /// Copy the destination object into the backup folder for its kind, if any.
    fn backup(
        &self,
        dest_id: &str,
        kind: &ObjectKind,
        backups: &BackupFolders,
    ) -> Result<(), MigrateError> {
        match backups.get(kind) {
            Some(folder_id) => {
                self.destination.copy_object(dest_id, folder_id, true)?;
            }
            None => warn!("No backup folder for {kind}"),
        }
        Ok(())
    }

    /// Overwrite the destination object with the source content.
    fn replace(&self, item: &ContentItem, dest_id: &str) -> Result<(), MigrateError> {
        let kind = &item.kind;
        let description = self.source_description(item)?;

        if *kind == ObjectKind::Module {
            let mut definition = self.source.module_definition(&item.id)?;
            let current = self.destination.module_definition(dest_id)?;
            definition.keep_identity_of(&current);
            self.destination
                .update_module_definition(dest_id, &definition)?;
            self.destination
                .update_object(dest_id, &ObjectUpdate::description(kind.clone(), description))?;
        } else {
            self.destination
                .update_object(dest_id, &content_update(item, description))?;
        }
        Ok(())
    }

    /// The listing may omit the description; ask for it explicitly then.
    fn source_description(&self, item: &ContentItem) -> Result<Option<String>, RepositoryError> {
        match &item.default_description {
            Some(description) => Ok(Some(description.clone())),
            None => self.source.description(&item.id),
        }
    }
}

/// Specification, module reference and description copied from the source object.
fn content_update(item: &ContentItem, description: Option<String>) -> ObjectUpdate {
    ObjectUpdate::content(
        item.kind.clone(),
        item.specification.clone(),
        item.module.clone(),
        description,
    )
}
