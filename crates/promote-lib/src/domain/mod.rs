//! Domain types shared by the commands and the repositories.

pub mod content;
pub mod module;
pub mod repository;
pub mod search_path;
pub mod update;

pub use content::{BackupFolders, ContentItem, FolderIndex, ObjectKind, Tag};
pub use module::{Ancestor, ModuleDefinition, QuerySubject, Specification, SqlQuery, UseSpec};
pub use repository::{ContentRepository, RepositoryError};
pub use search_path::{PathTarget, SearchPath, SearchPathError};
pub use update::ObjectUpdate;
