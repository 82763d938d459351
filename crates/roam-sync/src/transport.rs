use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use roam_stream::{EntryId, EventLog, EventStreamEntry};
use roam_types::SourceAddress;

use crate::error::{SyncError, SyncResult};

/// Transport interface for fetching a remote source's event stream.
#[async_trait]
pub trait SourceTransport: Send + Sync {
    /// Entries of `source` in append order, starting after `since` when
    /// given. An unknown `since` yields the whole stream.
    async fn fetch_entries(
        &self,
        source: &SourceAddress,
        since: Option<&EntryId>,
    ) -> SyncResult<Vec<EventStreamEntry>>;
}

/// Serves the logs of peers running in the same process.
#[derive(Default)]
pub struct InMemoryTransport {
    logs: RwLock<HashMap<SourceAddress, Arc<dyn EventLog>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `log` under its own source address.
    pub fn serve(&self, log: Arc<dyn EventLog>) {
        let source = log.source().clone();
        self.logs.write().expect("lock poisoned").insert(source, log);
    }

    fn log(&self, source: &SourceAddress) -> Option<Arc<dyn EventLog>> {
        self.logs.read().expect("lock poisoned").get(source).cloned()
    }
}

#[async_trait]
impl SourceTransport for InMemoryTransport {
    async fn fetch_entries(
        &self,
        source: &SourceAddress,
        since: Option<&EntryId>,
    ) -> SyncResult<Vec<EventStreamEntry>> {
        let log = self
            .log(source)
            .ok_or_else(|| SyncError::UnknownSource(source.clone()))?;
        let stream = log.snapshot().await?;
        Ok(match since {
            Some(id) => stream.since(id).to_vec(),
            None => stream.entries().to_vec(),
        })
    }
}
