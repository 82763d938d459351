use serde::{Deserialize, Serialize};

use roam_types::ContentPointer;

/// Discriminant of a [`StorageUpdateEvent`], with its wire tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    CreateFileInFolder,
    CreateFolderInFolder,
    DeleteFromFolder,
    FileUpdate,
}

impl EventKind {
    /// Every kind, in wire-tag order.
    pub const ALL: [EventKind; 4] = [
        Self::CreateFileInFolder,
        Self::CreateFolderInFolder,
        Self::DeleteFromFolder,
        Self::FileUpdate,
    ];

    /// The `eventId` tag used on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CreateFileInFolder => "create_file_in_folder",
            Self::CreateFolderInFolder => "create_folder_in_folder",
            Self::DeleteFromFolder => "deleted_from_folder",
            Self::FileUpdate => "file_update",
        }
    }

    /// Look up a kind by its wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Returns `true` for events that change a folder's children.
    pub fn is_folder_event(&self) -> bool {
        !matches!(self, Self::FileUpdate)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A single update to the replicated tree.
///
/// Overwrite is a flag on the create variants rather than an event of its
/// own: replace-or-reuse is decided at the moment of creation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageUpdateEvent {
    /// A file was created inside `working_folder_id`.
    CreateFileInFolder {
        working_folder_id: String,
        item_id: String,
        item_name: String,
        overwrite: bool,
    },
    /// A folder was created inside `working_folder_id`.
    CreateFolderInFolder {
        working_folder_id: String,
        item_id: String,
        item_name: String,
        overwrite: bool,
    },
    /// A file or folder was removed from `working_folder_id`.
    DeleteFromFolder {
        working_folder_id: String,
        item_id: String,
        item_name: String,
    },
    /// A file's content now lives behind `new_content`.
    FileUpdate {
        item_id: String,
        new_content: ContentPointer,
    },
}

impl StorageUpdateEvent {
    pub fn create_file(
        folder_id: impl Into<String>,
        item_id: impl Into<String>,
        name: impl Into<String>,
        overwrite: bool,
    ) -> Self {
        Self::CreateFileInFolder {
            working_folder_id: folder_id.into(),
            item_id: item_id.into(),
            item_name: name.into(),
            overwrite,
        }
    }

    pub fn create_folder(
        folder_id: impl Into<String>,
        item_id: impl Into<String>,
        name: impl Into<String>,
        overwrite: bool,
    ) -> Self {
        Self::CreateFolderInFolder {
            working_folder_id: folder_id.into(),
            item_id: item_id.into(),
            item_name: name.into(),
            overwrite,
        }
    }

    pub fn delete(
        folder_id: impl Into<String>,
        item_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::DeleteFromFolder {
            working_folder_id: folder_id.into(),
            item_id: item_id.into(),
            item_name: name.into(),
        }
    }

    pub fn file_update(item_id: impl Into<String>, new_content: ContentPointer) -> Self {
        Self::FileUpdate {
            item_id: item_id.into(),
            new_content,
        }
    }

    /// The discriminant of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CreateFileInFolder { .. } => EventKind::CreateFileInFolder,
            Self::CreateFolderInFolder { .. } => EventKind::CreateFolderInFolder,
            Self::DeleteFromFolder { .. } => EventKind::DeleteFromFolder,
            Self::FileUpdate { .. } => EventKind::FileUpdate,
        }
    }

    /// Id of the handler this event is routed to: the working folder for
    /// folder events, the file itself for content updates.
    pub fn target_id(&self) -> &str {
        match self {
            Self::CreateFileInFolder {
                working_folder_id, ..
            }
            | Self::CreateFolderInFolder {
                working_folder_id, ..
            }
            | Self::DeleteFromFolder {
                working_folder_id, ..
            } => working_folder_id,
            Self::FileUpdate { item_id, .. } => item_id,
        }
    }

    /// Id of the item the event creates, removes, or updates.
    pub fn item_id(&self) -> &str {
        match self {
            Self::CreateFileInFolder { item_id, .. }
            | Self::CreateFolderInFolder { item_id, .. }
            | Self::DeleteFromFolder { item_id, .. }
            | Self::FileUpdate { item_id, .. } => item_id,
        }
    }

    /// Name of the affected item, when the event carries one.
    pub fn item_name(&self) -> Option<&str> {
        match self {
            Self::CreateFileInFolder { item_name, .. }
            | Self::CreateFolderInFolder { item_name, .. }
            | Self::DeleteFromFolder { item_name, .. } => Some(item_name),
            Self::FileUpdate { .. } => None,
        }
    }

    /// Returns `true` if `other` creates the same item: same kind, and the
    /// item id or the item name matches.
    pub fn is_same_create(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::CreateFileInFolder {
                    item_id: a_id,
                    item_name: a_name,
                    ..
                },
                Self::CreateFileInFolder {
                    item_id: b_id,
                    item_name: b_name,
                    ..
                },
            )
            | (
                Self::CreateFolderInFolder {
                    item_id: a_id,
                    item_name: a_name,
                    ..
                },
                Self::CreateFolderInFolder {
                    item_id: b_id,
                    item_name: b_name,
                    ..
                },
            ) => a_id == b_id || a_name == b_name,
            _ => false,
        }
    }
}
