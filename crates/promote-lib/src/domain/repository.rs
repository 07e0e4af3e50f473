//! The content store seam.

use log::info;
use thiserror::Error;

use super::content::{ContentItem, ObjectKind};
use super::module::{ModuleDefinition, Specification};
use super::update::ObjectUpdate;

/// Errors returned by a content repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The remote API call failed (transport, status or decoding).
    #[error("{operation} failed on {location}")]
    Api {
        /// What was being done.
        operation: &'static str,
        /// The store, as reported by [`ContentRepository::location`].
        location: String,
        /// The underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An object that was just written cannot be found again.
    #[error("{kind} '{name}' not found in folder {folder_id}")]
    NotFound {
        /// Kind searched for.
        kind: ObjectKind,
        /// Name searched for.
        name: String,
        /// Folder searched.
        folder_id: String,
    },

    /// No object has this id.
    #[error("object {id} does not exist")]
    UnknownObject {
        /// The id asked for.
        id: String,
    },

    /// The server answered with something this tool cannot use.
    #[error("unexpected payload for {id}: {reason}")]
    Malformed {
        /// The object asked for.
        id: String,
        /// What is wrong with the answer.
        reason: String,
    },
}

/// Operations on one content store.
///
/// Implementations take `&self` for writes as well: a run is strictly
/// sequential and the REST client carries no mutable state after login.
pub trait ContentRepository {
    /// Human-readable location used in log messages (e.g. the base URL).
    fn location(&self) -> &str;

    /// List the direct children of a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be listed.
    fn folder_items(&self, folder_id: &str) -> Result<Vec<ContentItem>, RepositoryError>;

    /// Fetch a data module definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be fetched or decoded.
    fn module_definition(&self, id: &str) -> Result<ModuleDefinition, RepositoryError>;

    /// Fetch an object's specification in the shape its kind uses.
    ///
    /// # Errors
    ///
    /// Returns an error if the object has no specification.
    fn specification(&self, id: &str, kind: &ObjectKind)
    -> Result<Specification, RepositoryError>;

    /// Fetch an object's description.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be fetched.
    fn description(&self, id: &str) -> Result<Option<String>, RepositoryError>;

    /// Fetch every field of an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be fetched.
    fn content(&self, id: &str) -> Result<ContentItem, RepositoryError>;

    /// Copy an object into a folder, returning the id of the copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    fn copy_object(
        &self,
        source_id: &str,
        dest_folder_id: &str,
        recursive: bool,
    ) -> Result<String, RepositoryError>;

    /// Push fields to an existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the update is rejected.
    fn update_object(&self, id: &str, update: &ObjectUpdate) -> Result<(), RepositoryError>;

    /// Replace a module's definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the update is rejected.
    fn update_module_definition(
        &self,
        id: &str,
        definition: &ModuleDefinition,
    ) -> Result<(), RepositoryError>;

    /// Create a module in a folder. The server may not report the new id.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be created.
    fn create_module(
        &self,
        dest_folder_id: &str,
        definition: &ModuleDefinition,
    ) -> Result<Option<String>, RepositoryError>;

    /// Find a direct child folder by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent cannot be listed.
    fn find_folder_id(&self, parent_id: &str, name: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .folder_items(parent_id)?
            .into_iter()
            .find(|item| item.kind == ObjectKind::Folder && item.default_name == name)
            .map(|item| item.id))
    }

    /// Walk `path` folder by folder from `root_id`, then look for an object of
    /// `kind` named `name`. Any missing folder yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if a folder on the way cannot be listed.
    fn find_object_in_path(
        &self,
        root_id: &str,
        path: &[String],
        name: &str,
        kind: &ObjectKind,
    ) -> Result<Option<String>, RepositoryError> {
        let mut current = root_id.to_owned();
        for folder in path {
            match self.find_folder_id(&current, folder)? {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        info!("Searching for {kind} '{name}' in path {path:?}");
        Ok(self
            .folder_items(&current)?
            .into_iter()
            .find(|item| item.kind == *kind && item.default_name == name)
            .map(|item| item.id))
    }

    /// Change an object's display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the update is rejected.
    fn rename_object(&self, id: &str, name: &str, kind: &ObjectKind) -> Result<(), RepositoryError> {
        self.update_object(id, &ObjectUpdate::rename(kind.clone(), name))?;
        info!("Object {id} renamed to {name} ({kind})");
        Ok(())
    }
}
