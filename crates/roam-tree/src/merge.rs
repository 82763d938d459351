//! The folder merge algorithm.
//!
//! Every function here is a synchronous, in-memory transition on node data
//! with no other side effects, so callers can run it under a single write
//! lock. Applying an event twice in a row leaves the same state as applying
//! it once.
//!
//! Existing children are matched by id first, then by name. Names are not
//! unique; the first match wins.

use tracing::trace;

use roam_event::StorageUpdateEvent;
use roam_types::ContentPointer;

use crate::node::{FileNodeData, FolderNodeData, NodeKind};

/// What applying one event did to a folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A fresh child was inserted.
    Created { kind: NodeKind, item_id: String },
    /// A matching child already existed and was kept as is.
    Reused { kind: NodeKind, item_id: String },
    /// A matching child was removed and a fresh one inserted.
    Replaced {
        kind: NodeKind,
        removed_id: String,
        item_id: String,
    },
    /// A fresh child was due but another child already holds its id.
    IdTaken { kind: NodeKind, item_id: String },
    /// A child was removed.
    Removed { kind: NodeKind, item_id: String },
    /// Nothing matched; the folder is unchanged.
    Absent { item_id: String },
    /// A file now points at new content.
    ContentUpdated {
        item_id: String,
        previous: Option<ContentPointer>,
    },
}

impl MergeOutcome {
    /// Id of the child this outcome is about.
    pub fn item_id(&self) -> &str {
        match self {
            Self::Created { item_id, .. }
            | Self::Reused { item_id, .. }
            | Self::Replaced { item_id, .. }
            | Self::IdTaken { item_id, .. }
            | Self::Removed { item_id, .. }
            | Self::Absent { item_id }
            | Self::ContentUpdated { item_id, .. } => item_id,
        }
    }

    /// Returns `true` if the outcome left a child with a fresh baseline.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Created { .. } | Self::Replaced { .. })
    }

    /// Returns `true` if node data changed.
    pub fn changed(&self) -> bool {
        !matches!(
            self,
            Self::Reused { .. } | Self::IdTaken { .. } | Self::Absent { .. }
        )
    }
}

/// Apply `event` to `folder`.
///
/// File updates are applied to the matching file anywhere below `folder`.
pub fn apply_event(folder: &mut FolderNodeData, event: &StorageUpdateEvent) -> MergeOutcome {
    let outcome = match event {
        StorageUpdateEvent::CreateFileInFolder {
            item_id,
            item_name,
            overwrite,
            ..
        } => create_file(folder, item_id, item_name, *overwrite),
        StorageUpdateEvent::CreateFolderInFolder {
            item_id,
            item_name,
            overwrite,
            ..
        } => create_folder(folder, item_id, item_name, *overwrite),
        StorageUpdateEvent::DeleteFromFolder {
            item_id, item_name, ..
        } => delete(folder, item_id, item_name),
        StorageUpdateEvent::FileUpdate {
            item_id,
            new_content,
        } => match folder.find_file_recursive_mut(item_id) {
            Some(file) => update_content(file, *new_content),
            None => MergeOutcome::Absent {
                item_id: item_id.clone(),
            },
        },
    };
    trace!(folder = %folder.id, kind = %event.kind(), ?outcome, "merged event");
    outcome
}

/// The outcome [`apply_event`] would report, leaving `folder` untouched.
pub fn preview_event(folder: &FolderNodeData, event: &StorageUpdateEvent) -> MergeOutcome {
    match event {
        StorageUpdateEvent::FileUpdate { item_id, .. } => match folder.find_file_recursive(item_id) {
            Some(file) => MergeOutcome::ContentUpdated {
                item_id: file.id.clone(),
                previous: file.content,
            },
            None => MergeOutcome::Absent {
                item_id: item_id.clone(),
            },
        },
        event => apply_event(&mut folder.shallow_clone(), event),
    }
}

/// Create (or reuse) a file named `name` with id `id`.
pub fn create_file(
    folder: &mut FolderNodeData,
    id: &str,
    name: &str,
    overwrite: bool,
) -> MergeOutcome {
    let existing = position_by_id_or_name(&folder.files, id, name);
    let matched_id = existing.map(|idx| folder.files[idx].id.as_str());
    if let (Some(matched_id), false) = (matched_id, overwrite) {
        return MergeOutcome::Reused {
            kind: NodeKind::File,
            item_id: matched_id.to_string(),
        };
    }
    if matched_id != Some(id) && folder.contains_id(id) {
        return MergeOutcome::IdTaken {
            kind: NodeKind::File,
            item_id: id.to_string(),
        };
    }

    let removed_id = existing.map(|idx| folder.files.remove(idx).id);
    folder.files.push(FileNodeData::new(id, name));
    fresh(NodeKind::File, id, removed_id)
}

/// Create (or reuse) a subfolder named `name` with id `id`.
///
/// A fresh subfolder starts empty and carries a copy of `folder`'s sources.
pub fn create_folder(
    folder: &mut FolderNodeData,
    id: &str,
    name: &str,
    overwrite: bool,
) -> MergeOutcome {
    let existing = position_by_id_or_name(&folder.folders, id, name);
    let matched_id = existing.map(|idx| folder.folders[idx].id.as_str());
    if let (Some(matched_id), false) = (matched_id, overwrite) {
        return MergeOutcome::Reused {
            kind: NodeKind::Folder,
            item_id: matched_id.to_string(),
        };
    }
    if matched_id != Some(id) && folder.contains_id(id) {
        return MergeOutcome::IdTaken {
            kind: NodeKind::Folder,
            item_id: id.to_string(),
        };
    }

    let removed_id = existing.map(|idx| folder.folders.remove(idx).id);
    let child = folder.new_child(id, name);
    folder.folders.push(child);
    fresh(NodeKind::Folder, id, removed_id)
}

/// Remove the child matching `id`, or failing that `name`.
///
/// Files are checked before folders. A missing child is not an error.
pub fn delete(folder: &mut FolderNodeData, id: &str, name: &str) -> MergeOutcome {
    let by_id = remove_where(folder, |child_id, _| child_id == id);
    let removed = by_id.or_else(|| remove_where(folder, |_, child_name| child_name == name));
    match removed {
        Some((kind, item_id)) => MergeOutcome::Removed { kind, item_id },
        None => MergeOutcome::Absent {
            item_id: id.to_string(),
        },
    }
}

/// Point `file` at `pointer`.
pub fn update_content(file: &mut FileNodeData, pointer: ContentPointer) -> MergeOutcome {
    let previous = file.content.replace(pointer);
    MergeOutcome::ContentUpdated {
        item_id: file.id.clone(),
        previous,
    }
}

fn fresh(kind: NodeKind, id: &str, removed_id: Option<String>) -> MergeOutcome {
    match removed_id {
        Some(removed_id) => MergeOutcome::Replaced {
            kind,
            removed_id,
            item_id: id.to_string(),
        },
        None => MergeOutcome::Created {
            kind,
            item_id: id.to_string(),
        },
    }
}

trait Child {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

impl Child for FileNodeData {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl Child for FolderNodeData {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

fn position_by_id_or_name<T: Child>(children: &[T], id: &str, name: &str) -> Option<usize> {
    children
        .iter()
        .position(|c| c.id() == id)
        .or_else(|| children.iter().position(|c| c.name() == name))
}

fn remove_where(
    folder: &mut FolderNodeData,
    matches: impl Fn(&str, &str) -> bool,
) -> Option<(NodeKind, String)> {
    if let Some(idx) = folder.files.iter().position(|f| matches(&f.id, &f.name)) {
        return Some((NodeKind::File, folder.files.remove(idx).id));
    }
    if let Some(idx) = folder.folders.iter().position(|f| matches(&f.id, &f.name)) {
        return Some((NodeKind::Folder, folder.folders.remove(idx).id));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use roam_types::{ContentHasher, SourceAddress};

    fn root() -> FolderNodeData {
        FolderNodeData::new("root", "Root", vec![SourceAddress::from_key_name("peer")])
    }

    fn create_a(overwrite: bool) -> StorageUpdateEvent {
        StorageUpdateEvent::create_file("root", "root/a.txt", "a.txt", overwrite)
    }

    // ---------------------------------------------------------------
    // Scenarios
    // ---------------------------------------------------------------

    #[test]
    fn basic_create() {
        let mut folder = root();
        let outcome = apply_event(&mut folder, &create_a(false));
        assert_eq!(
            outcome,
            MergeOutcome::Created {
                kind: NodeKind::File,
                item_id: "root/a.txt".into()
            }
        );
        assert_eq!(folder.files, vec![FileNodeData::new("root/a.txt", "a.txt")]);
    }

    #[test]
    fn duplicate_create_is_ignored() {
        let mut folder = root();
        apply_event(&mut folder, &create_a(false));
        let outcome = apply_event(&mut folder, &create_a(false));
        assert!(matches!(outcome, MergeOutcome::Reused { .. }));
        assert_eq!(folder.files.len(), 1);
        assert_eq!(folder.files[0].id, "root/a.txt");
    }

    #[test]
    fn non_overwrite_preserves_content() {
        let mut folder = root();
        apply_event(&mut folder, &create_a(false));
        let p1 = ContentHasher::BLOB.hash(b"v1");
        apply_event(&mut folder, &StorageUpdateEvent::file_update("root/a.txt", p1));

        apply_event(&mut folder, &create_a(false));
        assert_eq!(folder.files[0].content, Some(p1));
    }

    #[test]
    fn overwrite_resets_content() {
        let mut folder = root();
        apply_event(&mut folder, &create_a(false));
        let p1 = ContentHasher::BLOB.hash(b"v1");
        apply_event(&mut folder, &StorageUpdateEvent::file_update("root/a.txt", p1));

        let outcome = apply_event(&mut folder, &create_a(true));
        assert!(matches!(outcome, MergeOutcome::Replaced { .. }));
        assert_eq!(folder.files.len(), 1);
        assert_eq!(folder.files[0].content, None);
    }

    #[test]
    fn delete_then_duplicate_delete() {
        let mut folder = root();
        folder.files.push(FileNodeData::new("root/b.txt", "b.txt"));
        let delete = StorageUpdateEvent::delete("root", "root/b.txt", "b.txt");

        let first = apply_event(&mut folder, &delete);
        assert_eq!(
            first,
            MergeOutcome::Removed {
                kind: NodeKind::File,
                item_id: "root/b.txt".into()
            }
        );
        assert!(folder.files.is_empty());

        let second = apply_event(&mut folder, &delete);
        assert!(matches!(second, MergeOutcome::Absent { .. }));
        assert!(folder.files.is_empty());
    }

    // ---------------------------------------------------------------
    // Matching rules
    // ---------------------------------------------------------------

    #[test]
    fn create_matches_by_name_when_id_differs() {
        let mut folder = root();
        apply_event(&mut folder, &create_a(false));
        let other_id = StorageUpdateEvent::create_file("root", "peer-7", "a.txt", false);
        let outcome = apply_event(&mut folder, &other_id);
        assert_eq!(
            outcome,
            MergeOutcome::Reused {
                kind: NodeKind::File,
                item_id: "root/a.txt".into()
            }
        );
    }

    #[test]
    fn id_match_wins_over_name_match() {
        let mut folder = root();
        folder.files.push(FileNodeData::new("x", "a.txt"));
        folder.files.push(FileNodeData::new("root/a.txt", "renamed.txt"));

        let outcome = apply_event(
            &mut folder,
            &StorageUpdateEvent::create_file("root", "root/a.txt", "a.txt", true),
        );
        assert_eq!(
            outcome,
            MergeOutcome::Replaced {
                kind: NodeKind::File,
                removed_id: "root/a.txt".into(),
                item_id: "root/a.txt".into()
            }
        );
        assert!(folder.file("x").is_some());
    }

    #[test]
    fn create_never_duplicates_an_id_across_kinds() {
        let mut folder = root();
        folder.folders.push(folder.new_child("root/a", "a"));
        let outcome = apply_event(
            &mut folder,
            &StorageUpdateEvent::create_file("root", "root/a", "a", false),
        );
        assert!(matches!(outcome, MergeOutcome::IdTaken { .. }));
        assert!(folder.files.is_empty());
    }

    #[test]
    fn new_subfolder_copies_sources() {
        let mut folder = root();
        apply_event(
            &mut folder,
            &StorageUpdateEvent::create_folder("root", "root/docs", "docs", false),
        );
        assert_eq!(folder.folders[0].sources, folder.sources);
    }

    #[test]
    fn delete_prefers_files_then_folders() {
        let mut folder = root();
        folder.folders.push(folder.new_child("root/dup-folder", "dup"));
        folder.files.push(FileNodeData::new("root/dup-file", "dup"));

        let outcome = apply_event(&mut folder, &StorageUpdateEvent::delete("root", "zzz", "dup"));
        assert_eq!(
            outcome,
            MergeOutcome::Removed {
                kind: NodeKind::File,
                item_id: "root/dup-file".into()
            }
        );
        assert_eq!(folder.folders.len(), 1);
    }

    #[test]
    fn delete_of_missing_item_is_a_no_op() {
        let mut folder = root();
        folder.files.push(FileNodeData::new("root/keep", "keep"));
        let before = folder.clone();
        let outcome = apply_event(&mut folder, &StorageUpdateEvent::delete("root", "root/x", "x"));
        assert!(!outcome.changed());
        assert_eq!(folder, before);
    }

    #[test]
    fn file_update_reaches_nested_files() {
        let mut folder = root();
        let mut docs = folder.new_child("root/docs", "docs");
        docs.files.push(FileNodeData::new("root/docs/n.md", "n.md"));
        folder.folders.push(docs);

        let ptr = ContentHasher::BLOB.hash(b"nested");
        let outcome = apply_event(&mut folder, &StorageUpdateEvent::file_update("root/docs/n.md", ptr));
        assert_eq!(
            outcome,
            MergeOutcome::ContentUpdated {
                item_id: "root/docs/n.md".into(),
                previous: None
            }
        );
        assert_eq!(folder.folders[0].files[0].content, Some(ptr));

        let missing = apply_event(&mut folder, &StorageUpdateEvent::file_update("nope", ptr));
        assert!(matches!(missing, MergeOutcome::Absent { .. }));
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    // File and folder names are drawn from disjoint sets so every name
    // identifies at most one child.
    fn event_strategy() -> impl Strategy<Value = StorageUpdateEvent> {
        let file_name = prop_oneof![Just("a"), Just("b"), Just("c")];
        let folder_name = prop_oneof![Just("x"), Just("y")];
        let any_name = prop_oneof![file_name.clone(), folder_name.clone()];
        let content = any::<u8>().prop_map(|b| ContentHasher::BLOB.hash(&[b]));
        prop_oneof![
            (file_name.clone(), any::<bool>()).prop_map(|(n, o)| {
                StorageUpdateEvent::create_file("root", format!("root/{n}"), n, o)
            }),
            (folder_name, any::<bool>()).prop_map(|(n, o)| {
                StorageUpdateEvent::create_folder("root", format!("root/{n}"), n, o)
            }),
            any_name.prop_map(|n| StorageUpdateEvent::delete("root", format!("root/{n}"), n)),
            (file_name, content)
                .prop_map(|(n, p)| StorageUpdateEvent::file_update(format!("root/{n}"), p)),
        ]
    }

    fn sorted(mut folder: FolderNodeData) -> FolderNodeData {
        folder.files.sort_by(|a, b| a.id.cmp(&b.id));
        folder.folders.sort_by(|a, b| a.id.cmp(&b.id));
        folder
    }

    proptest! {
        #[test]
        fn applying_twice_equals_applying_once(
            prefix in proptest::collection::vec(event_strategy(), 0..8),
            event in event_strategy(),
        ) {
            let mut base = root();
            for e in &prefix {
                apply_event(&mut base, e);
            }
            let mut once = base.clone();
            apply_event(&mut once, &event);
            let mut twice = once.clone();
            apply_event(&mut twice, &event);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn preview_matches_apply(
            prefix in proptest::collection::vec(event_strategy(), 0..8),
            event in event_strategy(),
        ) {
            let mut folder = root();
            for e in &prefix {
                apply_event(&mut folder, e);
            }
            let before = folder.clone();
            let previewed = preview_event(&folder, &event);
            prop_assert_eq!(&folder, &before);
            prop_assert_eq!(previewed, apply_event(&mut folder, &event));
        }

        #[test]
        fn independent_creates_commute(
            names in proptest::collection::btree_set("[a-z]{1,6}", 1..6),
            folders in proptest::collection::vec(any::<bool>(), 6),
            seed in any::<u64>(),
        ) {
            let events: Vec<_> = names
                .iter()
                .zip(folders.iter())
                .map(|(n, is_folder)| {
                    let id = format!("root/{n}");
                    if *is_folder {
                        StorageUpdateEvent::create_folder("root", id, n.clone(), false)
                    } else {
                        StorageUpdateEvent::create_file("root", id, n.clone(), false)
                    }
                })
                .collect();

            let mut forward = root();
            for e in &events {
                apply_event(&mut forward, e);
            }

            let mut shuffled = events.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();
            let mut other = root();
            for e in &shuffled {
                apply_event(&mut other, e);
            }

            prop_assert_eq!(sorted(forward), sorted(other));
        }
    }
}
