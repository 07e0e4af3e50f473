//! Content store objects and the folder indexes built from them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::module::ModuleDefinition;

/// The type of a content store object, as reported in the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ObjectKind {
    /// A folder.
    Folder,
    /// A report.
    Report,
    /// A dashboard.
    Dashboard,
    /// A data module.
    Module,
    /// Any type this tool does not know how to handle (e.g. `dataSet2`, `URL`).
    Other(String),
}

impl ObjectKind {
    /// Whether objects of this kind can be promoted.
    #[must_use]
    pub fn is_migratable(&self) -> bool {
        matches!(
            self,
            ObjectKind::Report | ObjectKind::Dashboard | ObjectKind::Module
        )
    }

    /// The wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ObjectKind::Folder => "folder",
            ObjectKind::Report => "report",
            ObjectKind::Dashboard => "dashboard",
            ObjectKind::Module => "module",
            ObjectKind::Other(s) => s,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ObjectKind {
    fn from(s: &str) -> Self {
        match s {
            "folder" => ObjectKind::Folder,
            "report" => ObjectKind::Report,
            "dashboard" => ObjectKind::Dashboard,
            "module" => ObjectKind::Module,
            other => ObjectKind::Other(other.to_owned()),
        }
    }
}

impl From<String> for ObjectKind {
    fn from(s: String) -> Self {
        ObjectKind::from(s.as_str())
    }
}

impl From<ObjectKind> for String {
    fn from(kind: ObjectKind) -> Self {
        kind.as_str().to_owned()
    }
}

/// A snapshot of one object in a content store.
///
/// Items are read from a repository listing and are never mutated locally,
/// apart from `full_path`, which discovery fills in with the chain of folder
/// names leading to the item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Server-side id.
    pub id: String,
    /// Display name.
    pub default_name: String,
    /// Object type.
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// Report specification XML (reports and dashboards only).
    #[serde(default)]
    pub specification: Option<String>,
    /// Module reference carried by reports in the listing.
    #[serde(default)]
    pub module: Option<ModuleDefinition>,
    /// Description text.
    #[serde(default)]
    pub default_description: Option<String>,
    /// Folder names from the main folder down to the item's parent.
    #[serde(skip)]
    pub full_path: Vec<String>,
}

impl ContentItem {
    /// An item with no specification, module or path.
    #[must_use]
    pub fn new<I: Into<String>, N: Into<String>>(id: I, default_name: N, kind: ObjectKind) -> Self {
        Self {
            id: id.into(),
            default_name: default_name.into(),
            kind,
            specification: None,
            module: None,
            default_description: None,
            full_path: Vec::new(),
        }
    }

    /// Set the folder path.
    #[must_use]
    pub fn with_path(mut self, full_path: Vec<String>) -> Self {
        self.full_path = full_path;
        self
    }

    /// Set the specification XML.
    #[must_use]
    pub fn with_specification<S: Into<String>>(mut self, specification: S) -> Self {
        self.specification = Some(specification.into());
        self
    }

    /// Set the listing's module reference.
    #[must_use]
    pub fn with_module(mut self, module: ModuleDefinition) -> Self {
        self.module = Some(module);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.default_description = Some(description.into());
        self
    }

    /// The main folder this item was discovered under.
    #[must_use]
    pub fn main_folder(&self) -> Option<&str> {
        self.full_path.first().map(String::as_str)
    }

    /// Folder names below the main folder.
    #[must_use]
    pub fn sub_path(&self) -> &[String] {
        self.full_path.get(1..).unwrap_or_default()
    }
}

impl fmt::Display for ContentItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, id: {})", self.default_name, self.kind, self.id)
    }
}

/// The marker that flags an object as pending promotion, e.g. `(release)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag(String);

impl Tag {
    /// Returns `None` for an empty tag, which would match every name.
    #[must_use]
    pub fn new<T: Into<String>>(tag: T) -> Option<Self> {
        let marker: String = tag.into();
        (!marker.is_empty()).then_some(Self(marker))
    }

    /// The marker text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a display name carries this tag.
    #[must_use]
    pub fn is_on(&self, name: &str) -> bool {
        name.contains(&self.0)
    }

    /// Remove every occurrence of the tag and trim the result.
    ///
    /// Removal repeats until the name no longer carries the tag, so a tag
    /// split around another one (`ta(tag)g`) goes too and
    /// `strip(strip(x)) == strip(x)` holds for any name.
    #[must_use]
    pub fn strip(&self, name: &str) -> String {
        let mut stripped = name.replace(&self.0, "");
        while stripped.contains(&self.0) {
            stripped = stripped.replace(&self.0, "");
        }
        stripped.trim().to_owned()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical folder name to folder id, kept in resolution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderIndex {
    /// `(name, id)` pairs.
    entries: Vec<(String, String)>,
}

impl FolderIndex {
    /// Insert or replace the id for `name`.
    pub fn insert<N: Into<String>, I: Into<String>>(&mut self, name: N, id: I) {
        let key: String = name.into();
        let value: String = id.into();
        match self.entries.iter_mut().find(|(n, _)| *n == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// The id registered for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| id.as_str())
    }

    /// Whether `name` has an id.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `(name, id)` pairs in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, id)| (n.as_str(), id.as_str()))
    }
}

impl<N: Into<String>, I: Into<String>> FromIterator<(N, I)> for FolderIndex {
    fn from_iter<T: IntoIterator<Item = (N, I)>>(iter: T) -> Self {
        let mut index = FolderIndex::default();
        for (name, id) in iter {
            index.insert(name, id);
        }
        index
    }
}

/// Destination folders that receive a copy of an object before it is overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupFolders {
    /// Backup folder id per object kind.
    by_kind: HashMap<ObjectKind, String>,
}

impl BackupFolders {
    /// Register the backup folder for `kind`.
    pub fn insert<F: Into<String>>(&mut self, kind: ObjectKind, folder_id: F) {
        self.by_kind.insert(kind, folder_id.into());
    }

    /// The backup folder for `kind`.
    #[must_use]
    pub fn get(&self, kind: &ObjectKind) -> Option<&str> {
        self.by_kind.get(kind).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_kind_from_str() {
        assert_eq!(ObjectKind::from("report"), ObjectKind::Report);
        assert_eq!(ObjectKind::from("module"), ObjectKind::Module);
        assert_eq!(
            ObjectKind::from("dataSet2"),
            ObjectKind::Other("dataSet2".to_owned())
        );
    }

    #[test]
    fn only_three_kinds_are_migratable() {
        assert!(ObjectKind::Report.is_migratable());
        assert!(ObjectKind::Dashboard.is_migratable());
        assert!(ObjectKind::Module.is_migratable());
        assert!(!ObjectKind::Folder.is_migratable());
        assert!(!ObjectKind::Other("URL".to_owned()).is_migratable());
    }

    #[test]
    fn content_item_deserializes_listing_entry() {
        let json = r#"{
            "id": "i1",
            "defaultName": "Sales (tag)",
            "type": "report",
            "specification": "<report/>",
            "defaultDescription": null,
            "owner": "someone"
        }"#;
        let item: ContentItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "i1");
        assert_eq!(item.kind, ObjectKind::Report);
        assert_eq!(item.specification.as_deref(), Some("<report/>"));
        assert!(item.default_description.is_none());
        assert!(item.full_path.is_empty());
    }

    #[test]
    fn sub_path_skips_main_folder() {
        let item = ContentItem::new("i1", "x", ObjectKind::Report)
            .with_path(vec!["Sales".into(), "Q1".into()]);
        assert_eq!(item.main_folder(), Some("Sales"));
        assert_eq!(item.sub_path(), ["Q1".to_owned()]);

        let bare = ContentItem::new("i2", "y", ObjectKind::Report);
        assert_eq!(bare.main_folder(), None);
        assert!(bare.sub_path().is_empty());
    }

    #[test]
    fn tag_strip_trims_and_is_idempotent() {
        let tag = Tag::new("(tag)").unwrap();
        let once = tag.strip("Sales Report (tag)");
        assert_eq!(once, "Sales Report");
        assert_eq!(tag.strip(&once), once);
        assert!(!tag.is_on(&once));

        let nested = tag.strip("Sales (ta(tag)g)");
        assert_eq!(nested, "Sales");
        assert_eq!(tag.strip(&nested), nested);
        assert!(!tag.is_on(&nested));
    }

    #[test]
    fn tag_strip_removes_every_occurrence() {
        let tag = Tag::new("(tag)").unwrap();
        assert_eq!(tag.strip("(tag) Orders (tag) "), "Orders");
    }

    #[test]
    fn empty_tag_is_rejected() {
        assert!(Tag::new("").is_none());
    }

    #[test]
    fn folder_index_keeps_insertion_order() {
        let index: FolderIndex = [("B", "2"), ("A", "1")].into_iter().collect();
        let names: Vec<_> = index.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(index.get("A"), Some("1"));
        assert!(!index.contains("C"));
    }
}
