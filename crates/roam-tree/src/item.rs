use std::fmt;
use std::sync::Arc;

use crate::file::NomadFile;
use crate::folder::NomadFolder;
use crate::handler::{Identifiable, Navigable};
use crate::node::NodeKind;

/// Which children an enumeration yields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KindFilter {
    #[default]
    All,
    Files,
    Folders,
}

impl KindFilter {
    pub fn includes(&self, kind: NodeKind) -> bool {
        match self {
            Self::All => true,
            Self::Files => kind == NodeKind::File,
            Self::Folders => kind == NodeKind::Folder,
        }
    }
}

/// A live child of a folder.
#[derive(Clone)]
pub enum StorableItem {
    File(Arc<NomadFile>),
    Folder(Arc<NomadFolder>),
}

impl StorableItem {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::File(_) => NodeKind::File,
            Self::Folder(_) => NodeKind::Folder,
        }
    }

    pub fn as_file(&self) -> Option<&Arc<NomadFile>> {
        match self {
            Self::File(file) => Some(file),
            Self::Folder(_) => None,
        }
    }

    pub fn as_folder(&self) -> Option<&Arc<NomadFolder>> {
        match self {
            Self::Folder(folder) => Some(folder),
            Self::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<Arc<NomadFile>> {
        match self {
            Self::File(file) => Some(file),
            Self::Folder(_) => None,
        }
    }

    pub fn into_folder(self) -> Option<Arc<NomadFolder>> {
        match self {
            Self::Folder(folder) => Some(folder),
            Self::File(_) => None,
        }
    }
}

impl Identifiable for StorableItem {
    fn id(&self) -> &str {
        match self {
            Self::File(file) => file.id(),
            Self::Folder(folder) => folder.id(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::File(file) => file.name(),
            Self::Folder(folder) => folder.name(),
        }
    }
}

impl Navigable for StorableItem {
    fn parent(&self) -> Option<Arc<NomadFolder>> {
        match self {
            Self::File(file) => file.parent(),
            Self::Folder(folder) => folder.parent(),
        }
    }
}

impl From<Arc<NomadFile>> for StorableItem {
    fn from(file: Arc<NomadFile>) -> Self {
        Self::File(file)
    }
}

impl From<Arc<NomadFolder>> for StorableItem {
    fn from(folder: Arc<NomadFolder>) -> Self {
        Self::Folder(folder)
    }
}

impl fmt::Debug for StorableItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorableItem")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}
