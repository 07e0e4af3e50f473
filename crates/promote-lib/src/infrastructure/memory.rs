//! In-memory content repository with an operation journal.

use std::cell::RefCell;

use crate::domain::{
    ContentItem, ContentRepository, ModuleDefinition, ObjectKind, ObjectUpdate, RepositoryError,
    Specification,
};

/// A write performed against a [`MemoryRepository`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// [`ContentRepository::copy_object`].
    Copy {
        /// Object copied.
        source_id: String,
        /// Folder receiving the copy.
        dest_folder_id: String,
        /// Whether children were copied too.
        recursive: bool,
        /// Id of the copy.
        new_id: String,
    },
    /// [`ContentRepository::update_object`].
    Update {
        /// Object updated.
        id: String,
        /// Fields pushed.
        update: ObjectUpdate,
    },
    /// [`ContentRepository::update_module_definition`].
    UpdateModule {
        /// Module updated.
        id: String,
        /// Definition pushed.
        definition: ModuleDefinition,
    },
    /// [`ContentRepository::create_module`].
    CreateModule {
        /// Folder receiving the module.
        folder_id: String,
        /// Definition pushed.
        definition: ModuleDefinition,
        /// Id given to the module.
        new_id: String,
    },
}

/// One stored object.
#[derive(Debug, Clone)]
struct Node {
    /// Listing snapshot.
    item: ContentItem,
    /// Holding folder; `None` for the root.
    parent: Option<String>,
    /// What the modules endpoint serves for this id.
    definition: Option<ModuleDefinition>,
}

/// Everything behind the [`RefCell`].
#[derive(Debug, Default)]
struct State {
    /// Objects in insertion order.
    nodes: Vec<Node>,
    /// Last generated id number.
    next_id: usize,
    /// Writes, oldest first.
    journal: Vec<Operation>,
    /// Operation made to fail.
    failing: Option<&'static str>,
}

impl State {
    /// The node with `id`.
    fn node(&self, id: &str) -> Result<&Node, RepositoryError> {
        self.nodes
            .iter()
            .find(|n| n.item.id == id)
            .ok_or_else(|| RepositoryError::UnknownObject { id: id.to_owned() })
    }

    /// The node with `id`, for writing.
    fn node_mut(&mut self, id: &str) -> Result<&mut Node, RepositoryError> {
        self.nodes
            .iter_mut()
            .find(|n| n.item.id == id)
            .ok_or_else(|| RepositoryError::UnknownObject { id: id.to_owned() })
    }

    /// A new unique object id.
    fn fresh_id(&mut self) -> String {
        self.next_id = self.next_id.saturating_add(1);
        format!("obj-{}", self.next_id)
    }

    /// Copy `source_id` into `dest_folder_id`, with its children if `recursive`.
    fn copy_subtree(
        &mut self,
        source_id: &str,
        dest_folder_id: &str,
        recursive: bool,
    ) -> Result<String, RepositoryError> {
        let mut node = self.node(source_id)?.clone();
        let new_id = self.fresh_id();
        node.item.id.clone_from(&new_id);
        node.parent = Some(dest_folder_id.to_owned());
        self.nodes.push(node);

        if recursive {
            let children: Vec<String> = self
                .nodes
                .iter()
                .filter(|n| n.parent.as_deref() == Some(source_id))
                .map(|n| n.item.id.clone())
                .collect();
            for child in children {
                self.copy_subtree(&child, &new_id, true)?;
            }
        }
        Ok(new_id)
    }
}

/// An in-memory content store.
///
/// Folders and objects are kept in insertion order, every write is recorded in
/// a journal, and a single operation can be made to fail to exercise error
/// paths.
#[derive(Debug)]
pub struct MemoryRepository {
    /// Name used in errors and logs.
    location: String,
    /// Objects, journal and injected failure.
    state: RefCell<State>,
}

impl MemoryRepository {
    /// Create a store holding a single root folder with id `root_id`.
    #[must_use]
    pub fn new<L: Into<String>, R: Into<String>>(location: L, root_id: R) -> Self {
        let root_name: String = root_id.into();
        let root = Node {
            item: ContentItem::new(root_name.clone(), root_name, ObjectKind::Folder),
            parent: None,
            definition: None,
        };
        Self {
            location: location.into(),
            state: RefCell::new(State {
                nodes: vec![root],
                ..State::default()
            }),
        }
    }

    /// Add a folder under `parent_id` and return its id.
    pub fn add_folder(&self, parent_id: &str, name: &str) -> String {
        let mut state = self.state.borrow_mut();
        let id = state.fresh_id();
        state.nodes.push(Node {
            item: ContentItem::new(id.clone(), name, ObjectKind::Folder),
            parent: Some(parent_id.to_owned()),
            definition: None,
        });
        id
    }

    /// Add an object under `parent_id`. An empty `item.id` gets a generated one.
    pub fn insert(&self, parent_id: &str, mut item: ContentItem) -> String {
        let mut state = self.state.borrow_mut();
        if item.id.is_empty() {
            item.id = state.fresh_id();
        }
        let id = item.id.clone();
        state.nodes.push(Node {
            item,
            parent: Some(parent_id.to_owned()),
            definition: None,
        });
        id
    }

    /// Attach the definition served by the modules endpoint for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnknownObject`] if `id` does not exist.
    pub fn set_module_definition(
        &self,
        id: &str,
        definition: ModuleDefinition,
    ) -> Result<(), RepositoryError> {
        self.state.borrow_mut().node_mut(id)?.definition = Some(definition);
        Ok(())
    }

    /// Make every later call of `operation` fail (e.g. `"copy"`, `"update"`).
    pub fn fail_on(&self, operation: &'static str) {
        self.state.borrow_mut().failing = Some(operation);
    }

    /// Current snapshot of an object.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ContentItem> {
        self.state.borrow().node(id).ok().map(|n| n.item.clone())
    }

    /// Current definition of a module.
    #[must_use]
    pub fn definition(&self, id: &str) -> Option<ModuleDefinition> {
        self.state
            .borrow()
            .node(id)
            .ok()
            .and_then(|n| n.definition.clone())
    }

    /// Id of the folder holding `id`.
    #[must_use]
    pub fn parent_of(&self, id: &str) -> Option<String> {
        self.state.borrow().node(id).ok().and_then(|n| n.parent.clone())
    }

    /// Every write performed so far, oldest first.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.state.borrow().journal.clone()
    }

    /// Fail if `operation` was made to fail.
    fn check(&self, operation: &'static str) -> Result<(), RepositoryError> {
        if self.state.borrow().failing == Some(operation) {
            return Err(RepositoryError::Api {
                operation,
                location: self.location.clone(),
                source: format!("{operation} rejected by test double").into(),
            });
        }
        Ok(())
    }
}

impl ContentRepository for MemoryRepository {
    fn location(&self) -> &str {
        &self.location
    }

    fn folder_items(&self, folder_id: &str) -> Result<Vec<ContentItem>, RepositoryError> {
        self.check("list folder")?;
        let state = self.state.borrow();
        state.node(folder_id)?;
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.parent.as_deref() == Some(folder_id))
            .map(|n| n.item.clone())
            .collect())
    }

    fn module_definition(&self, id: &str) -> Result<ModuleDefinition, RepositoryError> {
        self.check("get module")?;
        let state = self.state.borrow();
        let node = state.node(id)?;
        node.definition
            .clone()
            .or_else(|| node.item.module.clone())
            .ok_or_else(|| RepositoryError::Malformed {
                id: id.to_owned(),
                reason: "no module definition".to_owned(),
            })
    }

    fn specification(
        &self,
        id: &str,
        kind: &ObjectKind,
    ) -> Result<Specification, RepositoryError> {
        if *kind == ObjectKind::Module {
            return self.module_definition(id).map(Specification::Module);
        }
        self.check("get specification")?;
        self.state
            .borrow()
            .node(id)?
            .item
            .specification
            .clone()
            .map(Specification::Document)
            .ok_or_else(|| RepositoryError::Malformed {
                id: id.to_owned(),
                reason: "specification not found".to_owned(),
            })
    }

    fn description(&self, id: &str) -> Result<Option<String>, RepositoryError> {
        self.check("get description")?;
        Ok(self.state.borrow().node(id)?.item.default_description.clone())
    }

    fn content(&self, id: &str) -> Result<ContentItem, RepositoryError> {
        self.check("get content")?;
        Ok(self.state.borrow().node(id)?.item.clone())
    }

    fn copy_object(
        &self,
        source_id: &str,
        dest_folder_id: &str,
        recursive: bool,
    ) -> Result<String, RepositoryError> {
        self.check("copy")?;
        let mut state = self.state.borrow_mut();
        state.node(dest_folder_id)?;
        let new_id = state.copy_subtree(source_id, dest_folder_id, recursive)?;
        state.journal.push(Operation::Copy {
            source_id: source_id.to_owned(),
            dest_folder_id: dest_folder_id.to_owned(),
            recursive,
            new_id: new_id.clone(),
        });
        Ok(new_id)
    }

    fn update_object(&self, id: &str, update: &ObjectUpdate) -> Result<(), RepositoryError> {
        self.check("update")?;
        let mut state = self.state.borrow_mut();
        let item = &mut state.node_mut(id)?.item;
        if let Some(name) = &update.default_name {
            item.default_name.clone_from(name);
        }
        if update.specification.is_some() {
            item.specification.clone_from(&update.specification);
        }
        if update.module.is_some() {
            item.module.clone_from(&update.module);
        }
        if update.default_description.is_some() {
            item.default_description.clone_from(&update.default_description);
        }
        state.journal.push(Operation::Update {
            id: id.to_owned(),
            update: update.clone(),
        });
        Ok(())
    }

    fn update_module_definition(
        &self,
        id: &str,
        definition: &ModuleDefinition,
    ) -> Result<(), RepositoryError> {
        self.check("update module")?;
        let mut state = self.state.borrow_mut();
        state.node_mut(id)?.definition = Some(definition.clone());
        state.journal.push(Operation::UpdateModule {
            id: id.to_owned(),
            definition: definition.clone(),
        });
        Ok(())
    }

    fn create_module(
        &self,
        dest_folder_id: &str,
        definition: &ModuleDefinition,
    ) -> Result<Option<String>, RepositoryError> {
        self.check("create module")?;
        let mut state = self.state.borrow_mut();
        state.node(dest_folder_id)?;
        let new_id = state.fresh_id();
        let name = definition.label().unwrap_or_default().to_owned();
        state.nodes.push(Node {
            item: ContentItem::new(new_id.clone(), name, ObjectKind::Module),
            parent: Some(dest_folder_id.to_owned()),
            definition: Some(definition.clone()),
        });
        state.journal.push(Operation::CreateModule {
            folder_id: dest_folder_id.to_owned(),
            definition: definition.clone(),
            new_id: new_id.clone(),
        });
        Ok(Some(new_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_preserves_insertion_order() {
        let repo = MemoryRepository::new("mem", "root");
        repo.add_folder("root", "B");
        repo.add_folder("root", "A");
        let names: Vec<_> = repo
            .folder_items("root")
            .unwrap()
            .into_iter()
            .map(|i| i.default_name)
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn listing_unknown_folder_fails() {
        let repo = MemoryRepository::new("mem", "root");
        assert!(matches!(
            repo.folder_items("nope"),
            Err(RepositoryError::UnknownObject { .. })
        ));
    }

    #[test]
    fn recursive_copy_duplicates_children() {
        let repo = MemoryRepository::new("mem", "root");
        let src = repo.add_folder("root", "src");
        let dst = repo.add_folder("root", "dst");
        repo.insert(src.as_str(), ContentItem::new("", "r", ObjectKind::Report));

        let copy = repo.copy_object(&src, &dst, true).unwrap();
        assert_eq!(repo.folder_items(&copy).unwrap().len(), 1);

        let shallow = repo.copy_object(&src, &dst, false).unwrap();
        assert!(repo.folder_items(&shallow).unwrap().is_empty());
    }

    #[test]
    fn default_path_lookup_walks_folders() {
        let repo = MemoryRepository::new("mem", "root");
        let sales = repo.add_folder("root", "Sales");
        let q1 = repo.add_folder(&sales, "Q1");
        let id = repo.insert(&q1, ContentItem::new("", "Orders", ObjectKind::Module));

        let found = repo
            .find_object_in_path(&sales, &["Q1".to_owned()], "Orders", &ObjectKind::Module)
            .unwrap();
        assert_eq!(found, Some(id));

        let wrong_kind = repo
            .find_object_in_path(&sales, &["Q1".to_owned()], "Orders", &ObjectKind::Report)
            .unwrap();
        assert!(wrong_kind.is_none());

        let missing_folder = repo
            .find_object_in_path(&sales, &["Q2".to_owned()], "Orders", &ObjectKind::Module)
            .unwrap();
        assert!(missing_folder.is_none());
    }

    #[test]
    fn rename_is_journaled_as_update() {
        let repo = MemoryRepository::new("mem", "root");
        let id = repo.insert("root", ContentItem::new("", "Old (tag)", ObjectKind::Report));
        repo.rename_object(&id, "Old", &ObjectKind::Report).unwrap();

        assert_eq!(repo.get(&id).unwrap().default_name, "Old");
        assert_eq!(
            repo.operations(),
            vec![Operation::Update {
                id,
                update: ObjectUpdate::rename(ObjectKind::Report, "Old"),
            }]
        );
    }

    #[test]
    fn injected_failure_is_returned() {
        let repo = MemoryRepository::new("mem", "root");
        repo.fail_on("copy");
        let err = repo.copy_object("root", "root", false).unwrap_err();
        assert!(matches!(err, RepositoryError::Api { operation: "copy", .. }));
    }
}
