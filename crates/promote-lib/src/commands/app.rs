//! One promotion run from discovery to migration.

use log::info;
use thiserror::Error;

use crate::config::{Config, Connection, MigrationSettings};
use crate::domain::{BackupFolders, ContentItem, ContentRepository, FolderIndex, RepositoryError};
use crate::infrastructure::{ApiError, RestRepository};

use super::discovery::{Discovery, DiscoveryError};
use super::migrate::{MigrateError, Migrator, Targets};
use super::validate::{ValidationError, Validator};

/// Errors that can occur during command orchestration.
#[derive(Debug, Error)]
pub enum AppError {
    /// Logging in to one of the servers failed.
    #[error("failed to open a session on {location}")]
    Connect {
        /// Server base URL.
        location: String,
        /// Login failure.
        #[source]
        source: ApiError,
    },

    /// The folder layout of a server is not as configured.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// A repository call outside of discovery failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The validator could not be set up.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The migration run was aborted.
    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

/// Open a session on the source and the destination server.
///
/// # Errors
///
/// Returns [`AppError::Connect`] if either login fails.
pub fn connect(config: &Config) -> Result<(RestRepository, RestRepository), AppError> {
    let open = |connection: &Connection| {
        RestRepository::connect(connection).map_err(|source| AppError::Connect {
            location: connection.base_url.clone(),
            source,
        })
    };
    Ok((open(&config.source)?, open(&config.destination)?))
}

/// Everything resolved before the first write: folder indexes and candidates.
pub struct Plan<S: ContentRepository, D: ContentRepository> {
    /// Development store.
    source: S,
    /// Production store.
    destination: D,
    /// Source main folders by name.
    source_main: FolderIndex,
    /// Destination main folders by name.
    dest_main: FolderIndex,
    /// Destination backup folders by kind.
    dest_backup: BackupFolders,
    /// Tagged objects found in the source.
    candidates: Vec<ContentItem>,
}

impl<S: ContentRepository, D: ContentRepository> Plan<S, D> {
    /// Resolve both folder layouts and discover the tagged objects in the source.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Discovery`] if the destination has no admin or backup
    /// folder, or [`AppError::Repository`] if a listing fails.
    pub fn build(
        source: S,
        destination: D,
        settings: &MigrationSettings,
    ) -> Result<Self, AppError> {
        let source_discovery = Discovery::new(&source, settings);
        let dest_discovery = Discovery::new(&destination, settings);

        let source_main = source_discovery.find_main_folders()?;
        let dest_main = dest_discovery.find_main_folders()?;
        let dest_backup = dest_discovery.find_backup_folders()?;
        let candidates = source_discovery.collect_candidates(&source_main)?;
        info!("Found {} object(s) to migrate", candidates.len());
        for item in &candidates {
            info!("  {item} in {}", item.full_path.join("/"));
        }

        Ok(Self {
            source,
            destination,
            source_main,
            dest_main,
            dest_backup,
            candidates,
        })
    }

    /// Tagged objects, in discovery order.
    #[must_use]
    pub fn candidates(&self) -> &[ContentItem] {
        &self.candidates
    }

    /// The development store.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The production store.
    #[must_use]
    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Validate and promote every candidate; returns the promoted names.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Migrate`] if the run is aborted.
    pub fn execute(&self, settings: &MigrationSettings) -> Result<Vec<String>, AppError> {
        let validator = Validator::new(&self.source, &self.destination, settings)?;
        let migrator = Migrator::new(&self.source, &self.destination, settings, validator);
        let targets = Targets {
            source_main: &self.source_main,
            dest_main: &self.dest_main,
            dest_backup: &self.dest_backup,
        };
        let migrated = migrator.migrate_objects(&self.candidates, &targets)?;
        info!("{} object(s) migrated", migrated.len());
        Ok(migrated)
    }
}
