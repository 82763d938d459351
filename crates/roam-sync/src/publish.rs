use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use roam_stream::EntryId;
use roam_types::SourceAddress;

use crate::error::SyncResult;

/// Publication of each source's latest entry, so peers can tell whether a
/// stream moved without fetching it.
#[async_trait]
pub trait HeadPublisher: Send + Sync {
    async fn publish_head(&self, source: &SourceAddress, head: EntryId) -> SyncResult<()>;

    async fn resolve_head(&self, source: &SourceAddress) -> SyncResult<Option<EntryId>>;
}

/// In-memory head registry shared by peers in one process.
#[derive(Debug, Default)]
pub struct InMemoryHeadRegistry {
    heads: RwLock<HashMap<SourceAddress, EntryId>>,
}

impl InMemoryHeadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heads.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HeadPublisher for InMemoryHeadRegistry {
    async fn publish_head(&self, source: &SourceAddress, head: EntryId) -> SyncResult<()> {
        self.heads
            .write()
            .expect("lock poisoned")
            .insert(source.clone(), head);
        Ok(())
    }

    async fn resolve_head(&self, source: &SourceAddress) -> SyncResult<Option<EntryId>> {
        Ok(self.heads.read().expect("lock poisoned").get(source).copied())
    }
}
