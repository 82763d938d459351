use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use roam_event::StorageUpdateEvent;
use roam_store::{AccessMode, ContentReader};
use roam_stream::EventStreamEntry;
use roam_types::{ContentPointer, SourceAddress};

use crate::context::TreeContext;
use crate::error::{TreeError, TreeResult};
use crate::folder::NomadFolder;
use crate::handler::{AdvanceOutcome, EventStreamHandler, Identifiable, Navigable};
use crate::merge::{self, MergeOutcome};
use crate::node::FileNodeData;

/// A live file materialized from the shared tree.
///
/// The file itself only holds a content pointer; bytes live in the tree's
/// content store.
pub struct NomadFile {
    ctx: Arc<TreeContext>,
    id: String,
    name: String,
    parent: Arc<NomadFolder>,
}

impl NomadFile {
    pub(crate) fn materialize(
        ctx: Arc<TreeContext>,
        id: String,
        name: String,
        parent: Arc<NomadFolder>,
    ) -> Arc<Self> {
        let file = Arc::new(Self {
            ctx,
            id,
            name,
            parent,
        });
        let handler = Arc::downgrade(&file);
        let handler: Weak<dyn EventStreamHandler> = handler;
        file.ctx.registry().register(handler);
        file
    }

    /// The folder holding this file.
    pub fn folder(&self) -> &Arc<NomadFolder> {
        &self.parent
    }

    /// Where the current content lives, if any was written.
    pub fn content_pointer(&self) -> TreeResult<Option<ContentPointer>> {
        self.with_data(|file| file.content)
    }

    /// Open the current content.
    pub async fn open(&self, mode: AccessMode) -> TreeResult<ContentReader> {
        let pointer = self.require_content()?;
        Ok(self.ctx.store().open(&pointer, mode).await?)
    }

    /// Read the whole current content.
    pub async fn read_content(&self) -> TreeResult<Bytes> {
        let pointer = self.require_content()?;
        Ok(self.ctx.store().get(&pointer).await?)
    }

    /// Subscribe to content changes of this file.
    ///
    /// The channel closes when the file is removed from the tree.
    pub fn watch(&self) -> broadcast::Receiver<MergeOutcome> {
        self.ctx.watch(&self.id)
    }

    /// Store `data` and point this file at it.
    pub async fn write_content(
        &self,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> TreeResult<ContentPointer> {
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }
        self.with_data(|_| ())?;
        let pointer = self.ctx.store().put(data).await?;
        let event = StorageUpdateEvent::file_update(self.id.as_str(), pointer);
        self.ctx.commit(self, event, cancel).await?;
        Ok(pointer)
    }

    fn require_content(&self) -> TreeResult<ContentPointer> {
        self.content_pointer()?
            .ok_or_else(|| TreeError::NoContent(self.id.clone()))
    }

    fn with_data<R>(&self, f: impl FnOnce(&FileNodeData) -> R) -> TreeResult<R> {
        self.ctx
            .read(|root| {
                root.descend(self.parent.path())
                    .and_then(|folder| folder.file(&self.id))
                    .map(f)
            })
            .ok_or_else(|| TreeError::Detached(self.id.clone()))
    }
}

impl Identifiable for NomadFile {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Navigable for NomadFile {
    fn parent(&self) -> Option<Arc<NomadFolder>> {
        Some(Arc::clone(&self.parent))
    }
}

#[async_trait]
impl EventStreamHandler for NomadFile {
    async fn position(&self) -> Option<EventStreamEntry> {
        self.ctx.position_of(&self.id).await
    }

    fn sources(&self) -> Vec<SourceAddress> {
        self.parent.sources()
    }

    fn handles(&self, entry: &EventStreamEntry) -> bool {
        match &entry.event {
            StorageUpdateEvent::FileUpdate { item_id, .. } => *item_id == self.id,
            event => event.item_id() == self.id,
        }
    }

    async fn try_advance(
        &self,
        entry: &EventStreamEntry,
        cancel: &CancellationToken,
    ) -> TreeResult<AdvanceOutcome> {
        self.ctx.advance(self, entry, cancel).await
    }

    fn preview(&self, event: &StorageUpdateEvent) -> TreeResult<MergeOutcome> {
        let StorageUpdateEvent::FileUpdate { .. } = event else {
            return Ok(MergeOutcome::Absent {
                item_id: event.item_id().to_string(),
            });
        };
        self.with_data(|file| MergeOutcome::ContentUpdated {
            item_id: file.id.clone(),
            previous: file.content,
        })
    }

    fn apply(&self, event: &StorageUpdateEvent) -> TreeResult<MergeOutcome> {
        let StorageUpdateEvent::FileUpdate { new_content, .. } = event else {
            return Ok(MergeOutcome::Absent {
                item_id: event.item_id().to_string(),
            });
        };
        self.ctx
            .write(|root| {
                root.descend_mut(self.parent.path())
                    .and_then(|folder| folder.file_mut(&self.id))
                    .map(|file| merge::update_content(file, *new_content))
            })
            .ok_or_else(|| TreeError::Detached(self.id.clone()))
    }

    async fn reset(&self, cancel: &CancellationToken) -> TreeResult<()> {
        let path = self.parent.path().to_vec();
        let id = self.id.clone();
        self.ctx
            .reset(self, cancel, move |root| {
                if let Some(file) = root.descend_mut(&path).and_then(|f| f.file_mut(&id)) {
                    file.content = None;
                }
                Vec::new()
            })
            .await
    }
}

impl fmt::Debug for NomadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NomadFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent.id())
            .finish()
    }
}
