//! Finding tagged objects and resolving folders.

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::MigrationSettings;
use crate::domain::{
    BackupFolders, ContentItem, ContentRepository, FolderIndex, ObjectKind, RepositoryError,
};

/// Errors that can occur while resolving the folder layout of a content store.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The admin folder is not under the root.
    #[error("admin folder '{name}' not found in {location}")]
    AdminFolder {
        /// Configured folder name.
        name: String,
        /// The store searched.
        location: String,
    },

    /// The backup folder is not under the admin folder.
    #[error("backup folder '{name}' not found in {location}")]
    BackupFolder {
        /// Configured folder name.
        name: String,
        /// The store searched.
        location: String,
    },

    /// A listing failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Finds the configured folders of one content store and the tagged objects below them.
pub struct Discovery<'run, R: ContentRepository> {
    /// The store searched.
    repository: &'run R,
    /// Folder names and tag.
    settings: &'run MigrationSettings,
}

impl<'run, R: ContentRepository> Discovery<'run, R> {
    /// Discovery over `repository`.
    #[must_use]
    pub fn new(repository: &'run R, settings: &'run MigrationSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Resolve every configured main folder directly under the root.
    /// Folders that do not exist are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the root folder cannot be listed.
    pub fn find_main_folders(&self) -> Result<FolderIndex, RepositoryError> {
        let mut index = FolderIndex::default();
        for name in &self.settings.main_folders {
            match self
                .repository
                .find_folder_id(&self.settings.root_folder_id, name)?
            {
                Some(id) => index.insert(name.as_str(), id),
                None => warn!(
                    "Main folder '{name}' not found in {}",
                    self.repository.location()
                ),
            }
        }
        Ok(index)
    }

    /// Resolve `root / admin / backup / <kind subfolder>` for every configured kind.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::AdminFolder`] or [`DiscoveryError::BackupFolder`]
    /// if either folder is missing. A missing kind subfolder only logs a warning.
    pub fn find_backup_folders(&self) -> Result<BackupFolders, DiscoveryError> {
        let settings = self.settings;
        let location = self.repository.location();

        let admin_id = self
            .repository
            .find_folder_id(&settings.root_folder_id, &settings.admin_folder_name)?
            .ok_or_else(|| DiscoveryError::AdminFolder {
                name: settings.admin_folder_name.clone(),
                location: location.to_owned(),
            })?;
        let backup_id = self
            .repository
            .find_folder_id(&admin_id, &settings.backup_folder_name)?
            .ok_or_else(|| DiscoveryError::BackupFolder {
                name: settings.backup_folder_name.clone(),
                location: location.to_owned(),
            })?;

        let mut folders = BackupFolders::default();
        for (kind, name) in &settings.backup_subfolders {
            match self.repository.find_folder_id(&backup_id, name)? {
                Some(id) => folders.insert(kind.clone(), id),
                None => warn!("Backup subfolder '{name}' for {kind} not found in {location}"),
            }
        }
        Ok(folders)
    }

    /// Walk `folder_id` depth-first and collect every tagged report, dashboard
    /// or module. `path` is the chain of folder names leading to `folder_id`;
    /// each result's `full_path` is that chain extended down to its parent.
    ///
    /// # Errors
    ///
    /// Returns an error if any folder on the way cannot be listed.
    pub fn recursive_search_objects(
        &self,
        folder_id: &str,
        path: &[String],
    ) -> Result<Vec<ContentItem>, RepositoryError> {
        let mut found = Vec::new();
        for item in self.repository.folder_items(folder_id)? {
            if item.kind == ObjectKind::Folder {
                let mut sub_path = path.to_vec();
                sub_path.push(item.default_name.clone());
                found.extend(self.recursive_search_objects(&item.id, &sub_path)?);
            } else if item.kind.is_migratable() && self.settings.tag.is_on(&item.default_name) {
                debug!("Found candidate {item} in {path:?}");
                found.push(item.with_path(path.to_vec()));
            }
        }
        Ok(found)
    }

    /// Search every main folder in index order.
    ///
    /// # Errors
    ///
    /// Returns an error if any folder cannot be listed.
    pub fn collect_candidates(
        &self,
        main_folders: &FolderIndex,
    ) -> Result<Vec<ContentItem>, RepositoryError> {
        let mut candidates = Vec::new();
        for (name, id) in main_folders.iter() {
            let found = self.recursive_search_objects(id, &[name.to_owned()])?;
            info!("{} candidate(s) in main folder '{name}'", found.len());
            candidates.extend(found);
        }
        Ok(candidates)
    }
}
