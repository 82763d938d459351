use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::stream::{self, Stream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use roam_event::StorageUpdateEvent;
use roam_stream::EventStreamEntry;
use roam_types::SourceAddress;

use crate::context::TreeContext;
use crate::error::{TreeError, TreeResult};
use crate::file::NomadFile;
use crate::handler::{
    AdvanceOutcome, EventStreamHandler, Identifiable, MutableFolder, Navigable,
};
use crate::item::{KindFilter, StorableItem};
use crate::merge::{self, MergeOutcome};
use crate::node::{FolderNodeData, NodeKind};

/// A live folder materialized from the shared tree.
///
/// Built on demand and never cached: two calls that reach the same folder
/// return two objects viewing the same node data and sharing one cursor.
pub struct NomadFolder {
    ctx: Arc<TreeContext>,
    me: Weak<NomadFolder>,
    id: String,
    name: String,
    /// Folder ids from below the root down to this folder.
    path: Vec<String>,
    parent: Option<Arc<NomadFolder>>,
}

impl NomadFolder {
    pub(crate) fn materialize(
        ctx: Arc<TreeContext>,
        id: String,
        name: String,
        path: Vec<String>,
        parent: Option<Arc<NomadFolder>>,
    ) -> Arc<Self> {
        let folder = Arc::new_cyclic(|me| Self {
            ctx,
            me: me.clone(),
            id,
            name,
            path,
            parent,
        });
        let handler = Arc::downgrade(&folder);
        let handler: Weak<dyn EventStreamHandler> = handler;
        folder.ctx.registry().register(handler);
        folder
    }

    pub fn context(&self) -> &Arc<TreeContext> {
        &self.ctx
    }

    pub(crate) fn path(&self) -> &[String] {
        &self.path
    }

    /// A copy of this folder's node data.
    pub fn data(&self) -> TreeResult<FolderNodeData> {
        self.with_data(FolderNodeData::clone)
    }

    /// Add a source this folder listens to. Returns `false` if it was
    /// already known.
    pub fn add_source(&self, source: SourceAddress) -> TreeResult<bool> {
        self.ctx
            .write(|root| {
                root.descend_mut(&self.path).map(|folder| {
                    if folder.sources.contains(&source) {
                        false
                    } else {
                        folder.sources.push(source);
                        true
                    }
                })
            })
            .ok_or_else(|| self.detached())
    }

    /// Subscribe to changes of this folder's direct children.
    ///
    /// Every change to the folder's children is sent, whether it was
    /// committed locally or replayed from a peer. The channel
    /// closes when the folder is removed from the tree. A receiver that falls
    /// behind the configured capacity sees `Lagged`.
    pub fn watch(&self) -> broadcast::Receiver<MergeOutcome> {
        self.ctx.watch(&self.id)
    }

    // ---------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------

    /// Lazily enumerate children matching `filter`, files first.
    ///
    /// Each step reads the current node data, so the stream reflects
    /// concurrent changes. Cancelling ends the stream early without error.
    pub fn get_items(
        &self,
        filter: KindFilter,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StorableItem> + Send + 'static {
        let me = self.me.clone();
        stream::unfold(0usize, move |index| {
            let me = me.clone();
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let folder = me.upgrade()?;
                let (kind, id, name) = folder.child_at(filter, index)?;
                let item = folder.materialize_child(kind, id, name).ok()?;
                Some((item, index + 1))
            }
        })
    }

    /// The direct child with `id`, files checked first.
    pub fn get_item(&self, id: &str) -> TreeResult<StorableItem> {
        let found = self.with_data(|folder| {
            folder
                .file(id)
                .map(|f| (NodeKind::File, f.id.clone(), f.name.clone()))
                .or_else(|| {
                    folder
                        .folder(id)
                        .map(|f| (NodeKind::Folder, f.id.clone(), f.name.clone()))
                })
        })?;
        let (kind, id, name) = found.ok_or_else(|| self.not_found(id))?;
        self.materialize_child(kind, id, name)
    }

    /// The first file named `name`, else the first folder.
    pub fn get_first_by_name(&self, name: &str) -> TreeResult<StorableItem> {
        let found = self.with_data(|folder| {
            folder
                .files
                .iter()
                .find(|f| f.name == name)
                .map(|f| (NodeKind::File, f.id.clone(), f.name.clone()))
                .or_else(|| {
                    folder
                        .folders
                        .iter()
                        .find(|f| f.name == name)
                        .map(|f| (NodeKind::Folder, f.id.clone(), f.name.clone()))
                })
        })?;
        let (kind, id, name) = found.ok_or_else(|| self.not_found(name))?;
        self.materialize_child(kind, id, name)
    }

    /// The top-most ancestor. A folder without a parent has no root.
    pub fn get_root(&self) -> Option<Arc<NomadFolder>> {
        let mut current = self.parent.clone()?;
        while let Some(parent) = current.parent.clone() {
            current = parent;
        }
        Some(current)
    }

    // ---------------------------------------------------------------
    // Replay
    // ---------------------------------------------------------------

    /// Route `entry` to the handler of its target anywhere below this
    /// folder.
    ///
    /// Entries whose target is not in the tree are ignored.
    pub async fn dispatch(
        &self,
        entry: &EventStreamEntry,
        cancel: &CancellationToken,
    ) -> TreeResult<AdvanceOutcome> {
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        if entry.target_id == self.id {
            return self.try_advance(entry, cancel).await;
        }

        let Some(location) = self.with_data(|folder| folder.locate(&entry.target_id))? else {
            debug!(target = %entry.target_id, entry = %entry.id, "no handler for target");
            return Ok(AdvanceOutcome::Ignored);
        };

        let mut folder = self.this()?;
        for id in &location.parents {
            folder = match folder.get_item(id) {
                Ok(StorableItem::Folder(next)) => next,
                Ok(StorableItem::File(_)) | Err(TreeError::NotFound { .. }) => {
                    return Ok(AdvanceOutcome::Ignored)
                }
                Err(e) => return Err(e),
            };
        }
        match folder.get_item(&location.id) {
            Ok(StorableItem::File(file)) => file.try_advance(entry, cancel).await,
            Ok(StorableItem::Folder(target)) => target.try_advance(entry, cancel).await,
            Err(TreeError::NotFound { .. }) => Ok(AdvanceOutcome::Ignored),
            Err(e) => Err(e),
        }
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn this(&self) -> TreeResult<Arc<Self>> {
        self.me.upgrade().ok_or_else(|| self.detached())
    }

    fn detached(&self) -> TreeError {
        TreeError::Detached(self.id.clone())
    }

    fn not_found(&self, key: &str) -> TreeError {
        TreeError::NotFound {
            folder: self.id.clone(),
            key: key.to_string(),
        }
    }

    fn with_data<R>(&self, f: impl FnOnce(&FolderNodeData) -> R) -> TreeResult<R> {
        self.ctx
            .read(|root| root.descend(&self.path).map(f))
            .ok_or_else(|| self.detached())
    }

    fn child_at(&self, filter: KindFilter, index: usize) -> Option<(NodeKind, String, String)> {
        self.with_data(|folder| {
            let files = folder.files.iter().map(|f| (NodeKind::File, &f.id, &f.name));
            let folders = folder.folders.iter().map(|f| (NodeKind::Folder, &f.id, &f.name));
            files
                .chain(folders)
                .filter(|(kind, _, _)| filter.includes(*kind))
                .nth(index)
                .map(|(kind, id, name)| (kind, id.clone(), name.clone()))
        })
        .ok()
        .flatten()
    }

    fn materialize_child(
        &self,
        kind: NodeKind,
        id: String,
        name: String,
    ) -> TreeResult<StorableItem> {
        let me = self.this()?;
        let ctx = Arc::clone(&self.ctx);
        Ok(match kind {
            NodeKind::File => StorableItem::File(NomadFile::materialize(ctx, id, name, me)),
            NodeKind::Folder => {
                let mut path = self.path.clone();
                path.push(id.clone());
                StorableItem::Folder(NomadFolder::materialize(ctx, id, name, path, Some(me)))
            }
        })
    }

    /// Fail early if a child of the other kind already holds `id`.
    fn ensure_id_free(&self, kind: NodeKind, id: &str) -> TreeResult<()> {
        let taken = self.with_data(|folder| match kind {
            NodeKind::File => folder.folder(id).is_some(),
            NodeKind::Folder => folder.file(id).is_some(),
        })?;
        if taken {
            return Err(TreeError::IdTaken(id.to_string()));
        }
        Ok(())
    }

    fn child_from_merge(&self, merge: &MergeOutcome) -> TreeResult<StorableItem> {
        if let MergeOutcome::IdTaken { item_id, .. } = merge {
            return Err(TreeError::IdTaken(item_id.clone()));
        }
        self.get_item(merge.item_id())
    }
}

impl Identifiable for NomadFolder {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Navigable for NomadFolder {
    fn parent(&self) -> Option<Arc<NomadFolder>> {
        self.parent.clone()
    }
}

#[async_trait]
impl EventStreamHandler for NomadFolder {
    async fn position(&self) -> Option<EventStreamEntry> {
        self.ctx.position_of(&self.id).await
    }

    fn sources(&self) -> Vec<SourceAddress> {
        self.with_data(|folder| folder.sources.clone())
            .unwrap_or_default()
    }

    fn handles(&self, entry: &EventStreamEntry) -> bool {
        entry.target_id == self.id
            || (entry.event.kind().is_folder_event() && entry.event.item_id() == self.id)
    }

    async fn try_advance(
        &self,
        entry: &EventStreamEntry,
        cancel: &CancellationToken,
    ) -> TreeResult<AdvanceOutcome> {
        self.ctx.advance(self, entry, cancel).await
    }

    fn preview(&self, event: &StorageUpdateEvent) -> TreeResult<MergeOutcome> {
        self.with_data(|folder| merge::preview_event(folder, event))
    }

    fn apply(&self, event: &StorageUpdateEvent) -> TreeResult<MergeOutcome> {
        self.ctx
            .write(|root| {
                root.descend_mut(&self.path)
                    .map(|folder| merge::apply_event(folder, event))
            })
            .ok_or_else(|| self.detached())
    }

    async fn reset(&self, cancel: &CancellationToken) -> TreeResult<()> {
        let path = self.path.clone();
        self.ctx
            .reset(self, cancel, move |root| match root.descend_mut(&path) {
                Some(folder) => {
                    let dropped = folder.descendant_ids();
                    folder.files.clear();
                    folder.folders.clear();
                    dropped
                }
                None => Vec::new(),
            })
            .await
    }
}

#[async_trait]
impl MutableFolder for NomadFolder {
    async fn create_file(
        &self,
        name: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> TreeResult<Arc<NomadFile>> {
        self.ctx.config().validate_name(name)?;
        let item_id = self.ctx.config().child_id(&self.id, name);
        self.ensure_id_free(NodeKind::File, &item_id)?;

        let event = StorageUpdateEvent::create_file(self.id.as_str(), item_id, name, overwrite);
        let (merge, _) = self.ctx.commit(self, event, cancel).await?;
        match self.child_from_merge(&merge)? {
            StorableItem::File(file) => Ok(file),
            StorableItem::Folder(folder) => Err(TreeError::IdTaken(folder.id.clone())),
        }
    }

    async fn create_folder(
        &self,
        name: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> TreeResult<Arc<NomadFolder>> {
        self.ctx.config().validate_name(name)?;
        let item_id = self.ctx.config().child_id(&self.id, name);
        self.ensure_id_free(NodeKind::Folder, &item_id)?;

        let event = StorageUpdateEvent::create_folder(self.id.as_str(), item_id, name, overwrite);
        let (merge, _) = self.ctx.commit(self, event, cancel).await?;
        match self.child_from_merge(&merge)? {
            StorableItem::Folder(folder) => Ok(folder),
            StorableItem::File(file) => Err(TreeError::IdTaken(file.id().to_string())),
        }
    }

    async fn delete(&self, item: &StorableItem, cancel: &CancellationToken) -> TreeResult<()> {
        if !self.with_data(|folder| folder.contains_id(item.id()))? {
            return Err(self.not_found(item.id()));
        }
        let event = StorageUpdateEvent::delete(self.id.as_str(), item.id(), item.name());
        self.ctx.commit(self, event, cancel).await?;
        Ok(())
    }
}

impl fmt::Debug for NomadFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NomadFolder")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.id.as_str()))
            .finish()
    }
}
