use serde::{Deserialize, Serialize};

use roam_types::{ContentPointer, SourceAddress};

/// Kind of a tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Folder,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// Materialized state of a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNodeData {
    pub id: String,
    pub name: String,
    /// Pointer to the current content; `None` until the first update.
    pub content: Option<ContentPointer>,
}

impl FileNodeData {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: None,
        }
    }
}

/// Materialized state of a folder.
///
/// Ids are unique across `files` and `folders` of one folder; names are
/// not, and lookups by name take the first match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNodeData {
    pub id: String,
    pub name: String,
    pub files: Vec<FileNodeData>,
    pub folders: Vec<FolderNodeData>,
    /// Sources whose streams feed this folder.
    pub sources: Vec<SourceAddress>,
}

/// Where a node sits in the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeLocation {
    /// Ids of the folders from the root (exclusive) down to the node's
    /// parent (inclusive). Empty for the root and its direct children.
    pub parents: Vec<String>,
    pub kind: NodeKind,
    pub id: String,
    pub name: String,
}

impl FolderNodeData {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        sources: Vec<SourceAddress>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            files: Vec::new(),
            folders: Vec::new(),
            sources,
        }
    }

    /// A fresh, empty subfolder carrying this folder's sources.
    pub fn new_child(&self, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, self.sources.clone())
    }

    /// Returns `true` if a file or subfolder with `id` is present.
    pub fn contains_id(&self, id: &str) -> bool {
        self.files.iter().any(|f| f.id == id) || self.folders.iter().any(|f| f.id == id)
    }

    pub fn file(&self, id: &str) -> Option<&FileNodeData> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn file_mut(&mut self, id: &str) -> Option<&mut FileNodeData> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    pub fn folder(&self, id: &str) -> Option<&FolderNodeData> {
        self.folders.iter().find(|f| f.id == id)
    }

    pub fn folder_mut(&mut self, id: &str) -> Option<&mut FolderNodeData> {
        self.folders.iter_mut().find(|f| f.id == id)
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.files.len() + self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }

    /// Follow a path of folder ids down from this folder.
    pub fn descend(&self, path: &[String]) -> Option<&FolderNodeData> {
        path.iter().try_fold(self, |folder, id| folder.folder(id))
    }

    pub fn descend_mut(&mut self, path: &[String]) -> Option<&mut FolderNodeData> {
        let mut folder = self;
        for id in path {
            folder = folder.folder_mut(id)?;
        }
        Some(folder)
    }

    /// Copy of this folder whose subfolders are empty stubs with their id,
    /// name, and sources.
    pub fn shallow_clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            files: self.files.clone(),
            folders: self
                .folders
                .iter()
                .map(|f| Self::new(f.id.clone(), f.name.clone(), f.sources.clone()))
                .collect(),
            sources: self.sources.clone(),
        }
    }

    /// Depth-first search for a file anywhere below this folder.
    pub fn find_file_recursive(&self, id: &str) -> Option<&FileNodeData> {
        self.file(id)
            .or_else(|| self.folders.iter().find_map(|folder| folder.find_file_recursive(id)))
    }

    pub fn find_file_recursive_mut(&mut self, id: &str) -> Option<&mut FileNodeData> {
        if let Some(idx) = self.files.iter().position(|f| f.id == id) {
            return self.files.get_mut(idx);
        }
        self.folders
            .iter_mut()
            .find_map(|folder| folder.find_file_recursive_mut(id))
    }

    /// Depth-first search for the node with `id` below this folder.
    ///
    /// Files are checked before subfolders at every level.
    pub fn locate(&self, id: &str) -> Option<NodeLocation> {
        let mut parents = Vec::new();
        self.locate_inner(id, &mut parents)
    }

    fn locate_inner(&self, id: &str, parents: &mut Vec<String>) -> Option<NodeLocation> {
        if let Some(file) = self.file(id) {
            return Some(NodeLocation {
                parents: parents.clone(),
                kind: NodeKind::File,
                id: file.id.clone(),
                name: file.name.clone(),
            });
        }
        if let Some(folder) = self.folder(id) {
            return Some(NodeLocation {
                parents: parents.clone(),
                kind: NodeKind::Folder,
                id: folder.id.clone(),
                name: folder.name.clone(),
            });
        }
        for folder in &self.folders {
            parents.push(folder.id.clone());
            if let Some(found) = folder.locate_inner(id, parents) {
                return Some(found);
            }
            parents.pop();
        }
        None
    }

    /// Ids of every node below this folder.
    pub fn descendant_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<String>) {
        ids.extend(self.files.iter().map(|f| f.id.clone()));
        for folder in &self.folders {
            ids.push(folder.id.clone());
            folder.collect_ids(ids);
        }
    }
}
