use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use roam_event::StorageUpdateEvent;
use roam_store::ContentStore;
use roam_stream::{EventLog, EventStreamEntry};
use roam_types::SourceAddress;

use crate::config::TreeConfig;
use crate::error::{TreeError, TreeResult};
use crate::folder::NomadFolder;
use crate::handler::{AdvanceOutcome, EventStreamHandler, HandlerCursor};
use crate::merge::MergeOutcome;
use crate::node::{FolderNodeData, NodeKind};
use crate::registry::HandlerRegistry;

type SharedCursor = Arc<AsyncMutex<HandlerCursor>>;

/// Shared state behind every live object of one tree.
///
/// Owns the node data, the per-id replay cursors and change watchers, the
/// handler registry, the local log, and the content store. Live folders and
/// files are thin views that hold an `Arc<TreeContext>` and their position
/// in the tree.
///
/// Node data sits behind one synchronous lock, so a merge is atomic with
/// respect to other merges. Cursors are keyed by handler id and each sits
/// behind an async mutex, so advances on the same id are serialized while
/// different ids proceed concurrently. Cursors and watchers of a removed node
/// are dropped once the removal has been fanned out.
pub struct TreeContext {
    config: TreeConfig,
    root: RwLock<FolderNodeData>,
    cursors: Mutex<HashMap<String, SharedCursor>>,
    watchers: Mutex<HashMap<String, broadcast::Sender<MergeOutcome>>>,
    registry: HandlerRegistry,
    log: Arc<dyn EventLog>,
    store: Arc<dyn ContentStore>,
}

impl TreeContext {
    /// Create a tree whose root listens to the local log's source.
    pub fn new(
        config: TreeConfig,
        log: Arc<dyn EventLog>,
        store: Arc<dyn ContentStore>,
    ) -> TreeResult<Arc<Self>> {
        Self::with_sources(config, log, store, Vec::new())
    }

    /// Create a tree whose root listens to the local source plus `peers`.
    pub fn with_sources(
        config: TreeConfig,
        log: Arc<dyn EventLog>,
        store: Arc<dyn ContentStore>,
        peers: Vec<SourceAddress>,
    ) -> TreeResult<Arc<Self>> {
        config.validate()?;
        let mut sources = vec![log.source().clone()];
        for peer in peers {
            if !sources.contains(&peer) {
                sources.push(peer);
            }
        }
        let root = FolderNodeData::new(config.root_id.clone(), config.root_name.clone(), sources);
        Ok(Arc::new(Self {
            config,
            root: RwLock::new(root),
            cursors: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            registry: HandlerRegistry::new(),
            log,
            store,
        }))
    }

    /// Materialize the root folder.
    pub fn root(self: &Arc<Self>) -> Arc<NomadFolder> {
        let (id, name) = self.read(|root| (root.id.clone(), root.name.clone()));
        NomadFolder::materialize(Arc::clone(self), id, name, Vec::new(), None)
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// A copy of the whole materialized tree.
    pub fn snapshot(&self) -> FolderNodeData {
        self.read(FolderNodeData::clone)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&FolderNodeData) -> R) -> R {
        f(&*self.root.read().expect("lock poisoned"))
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut FolderNodeData) -> R) -> R {
        f(&mut *self.root.write().expect("lock poisoned"))
    }

    fn cursor(&self, id: &str) -> SharedCursor {
        let mut cursors = self.cursors.lock().expect("lock poisoned");
        Arc::clone(cursors.entry(id.to_string()).or_default())
    }

    fn existing_cursor(&self, id: &str) -> Option<SharedCursor> {
        self.cursors.lock().expect("lock poisoned").get(id).cloned()
    }

    /// The last entry accepted by handler `id`.
    pub async fn position_of(&self, id: &str) -> Option<EventStreamEntry> {
        let cursor = self.existing_cursor(id)?;
        let position = cursor.lock().await.position().cloned();
        position
    }

    /// Number of entries handler `id` has accepted since its last reset.
    pub async fn observed_count(&self, id: &str) -> usize {
        match self.existing_cursor(id) {
            Some(cursor) => cursor.lock().await.observed_len(),
            None => 0,
        }
    }

    /// Subscribe to the changes merged into the node `id`.
    pub fn watch(&self, id: &str) -> broadcast::Receiver<MergeOutcome> {
        let mut watchers = self.watchers.lock().expect("lock poisoned");
        watchers
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(self.config.watch_capacity).0)
            .subscribe()
    }

    fn notify(&self, id: &str, merge: &MergeOutcome) {
        if !merge.changed() {
            return;
        }
        let mut watchers = self.watchers.lock().expect("lock poisoned");
        let Some(sender) = watchers.get(id) else {
            return;
        };
        if sender.send(merge.clone()).is_err() {
            watchers.remove(id);
        }
    }

    /// Offer a remote or relayed entry to `handler`.
    pub(crate) async fn advance<H>(
        &self,
        handler: &H,
        entry: &EventStreamEntry,
        cancel: &CancellationToken,
    ) -> TreeResult<AdvanceOutcome>
    where
        H: EventStreamHandler + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        if !handler.handles(entry) {
            return Ok(AdvanceOutcome::Ignored);
        }
        let cursor = self.cursor(handler.id());
        let mut guard = cursor.lock().await;
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        if guard.has_observed(&entry.id) {
            return Ok(AdvanceOutcome::Duplicate);
        }

        let mut doomed = Vec::new();
        let outcome = if entry.target_id == handler.id() {
            if matches!(entry.event, StorageUpdateEvent::DeleteFromFolder { .. }) {
                doomed = self.subtree_of(&handler.preview(&entry.event)?);
            }
            AdvanceOutcome::Applied(handler.apply(&entry.event)?)
        } else {
            AdvanceOutcome::Seeded
        };
        guard.observe(entry);
        drop(guard);
        self.log.witness(&entry.timestamp);

        debug!(
            handler = handler.id(),
            entry = %entry.id,
            source = %entry.source,
            ?outcome,
            "advanced"
        );

        if let AdvanceOutcome::Applied(merge) = &outcome {
            self.notify(handler.id(), merge);
            self.seed_fresh_child(merge, entry).await;
        }
        self.registry.broadcast(entry, handler.id(), cancel).await;
        self.forget(&doomed);
        Ok(outcome)
    }

    /// Check a local event against `handler`, append it to the local log,
    /// apply it, move the handler's position to the new entry, then fan it
    /// out.
    ///
    /// Nothing is applied unless the append succeeded, and a create whose id
    /// is held by another child fails before anything is appended.
    pub(crate) async fn commit<H>(
        &self,
        handler: &H,
        event: StorageUpdateEvent,
        cancel: &CancellationToken,
    ) -> TreeResult<(MergeOutcome, EventStreamEntry)>
    where
        H: EventStreamHandler + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        let cursor = self.cursor(handler.id());
        let mut guard = cursor.lock().await;
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }

        let planned = handler.preview(&event)?;
        if let MergeOutcome::IdTaken { item_id, .. } = &planned {
            debug!(handler = handler.id(), item = %item_id, "refusing create, id taken");
            return Err(TreeError::IdTaken(item_id.clone()));
        }
        let doomed = self.subtree_of(&planned);

        let entry = self.log.append(handler.id(), event).await?;
        let merge = handler.apply(&entry.event)?;
        guard.observe(&entry);
        drop(guard);

        debug!(
            handler = handler.id(),
            entry = %entry.id,
            ?merge,
            "committed local event"
        );

        self.notify(handler.id(), &merge);
        self.seed_fresh_child(&merge, &entry).await;
        self.registry.broadcast(&entry, handler.id(), cancel).await;
        self.forget(&doomed);
        Ok((merge, entry))
    }

    /// Return `handler` to its baseline.
    ///
    /// `clear_node` resets the handler's node data and returns the ids of
    /// the nodes it dropped; their cursors are forgotten too.
    pub(crate) async fn reset<H>(
        &self,
        handler: &H,
        cancel: &CancellationToken,
        clear_node: impl FnOnce(&mut FolderNodeData) -> Vec<String> + Send,
    ) -> TreeResult<()>
    where
        H: EventStreamHandler + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        let cursor = self.cursor(handler.id());
        let mut guard = cursor.lock().await;
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        let dropped = self.write(clear_node);
        guard.clear();
        drop(guard);

        for cursor in self.forget(&dropped) {
            cursor.lock().await.clear();
        }

        info!(handler = handler.id(), dropped = dropped.len(), "reset");
        Ok(())
    }

    /// The removed node and every node below it, for a removal outcome.
    fn subtree_of(&self, merge: &MergeOutcome) -> Vec<String> {
        let MergeOutcome::Removed { kind, item_id } = merge else {
            return Vec::new();
        };
        let mut ids = vec![item_id.clone()];
        if *kind == NodeKind::Folder {
            self.read(|root| {
                let folder = root
                    .locate(item_id)
                    .filter(|found| found.kind == NodeKind::Folder)
                    .and_then(|found| root.descend(&found.parents)?.folder(item_id));
                if let Some(folder) = folder {
                    ids.extend(folder.descendant_ids());
                }
            });
        }
        ids
    }

    /// Drop the cursors and watchers of `ids`, returning the cursors.
    fn forget(&self, ids: &[String]) -> Vec<SharedCursor> {
        if ids.is_empty() {
            return Vec::new();
        }
        let mut watchers = self.watchers.lock().expect("lock poisoned");
        let mut cursors = self.cursors.lock().expect("lock poisoned");
        ids.iter()
            .filter_map(|id| {
                watchers.remove(id);
                cursors.remove(id)
            })
            .collect()
    }

    /// A freshly created child starts with the creating entry as its
    /// position.
    async fn seed_fresh_child(&self, merge: &MergeOutcome, entry: &EventStreamEntry) {
        if merge.is_fresh() {
            self.cursor(merge.item_id()).lock().await.observe(entry);
        }
    }
}
