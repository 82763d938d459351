//! The local source's append-only log.
//!
//! An [`EventLog`] owns one source's stream: it stamps each new event with
//! the log's clock, wraps it in an [`EventStreamEntry`] and persists it.
//! [`InMemoryEventLog`] keeps everything in memory; see
//! [`crate::wal::WalEventLog`] for the file-backed variant.

use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use roam_event::StorageUpdateEvent;
use roam_types::SourceAddress;

use crate::clock::{HybridLogicalClock, Timestamp};
use crate::entry::EventStreamEntry;
use crate::error::StreamResult;
use crate::stream::EventStream;

/// Append-only log of the events published by the local source.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// The source every entry of this log is attributed to.
    fn source(&self) -> &SourceAddress;

    /// Stamp `event`, append it routed to `target_id`, and return the entry.
    async fn append(
        &self,
        target_id: &str,
        event: StorageUpdateEvent,
    ) -> StreamResult<EventStreamEntry>;

    /// Every entry, in append order.
    async fn entries(&self) -> StreamResult<Vec<EventStreamEntry>>;

    /// The most recent entry, if any.
    async fn head(&self) -> StreamResult<Option<EventStreamEntry>>;

    /// Move the log's clock past a timestamp seen on another source.
    fn witness(&self, timestamp: &Timestamp);

    /// A copy of the log as an [`EventStream`].
    async fn snapshot(&self) -> StreamResult<EventStream> {
        EventStream::from_entries(self.source().clone(), self.entries().await?)
    }
}

/// An [`EventLog`] that lives only in memory.
pub struct InMemoryEventLog {
    source: SourceAddress,
    clock: HybridLogicalClock,
    stream: RwLock<EventStream>,
}

impl InMemoryEventLog {
    pub fn new(source: SourceAddress) -> Self {
        Self {
            clock: HybridLogicalClock::new(),
            stream: RwLock::new(EventStream::new(source.clone())),
            source,
        }
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    fn source(&self) -> &SourceAddress {
        &self.source
    }

    async fn append(
        &self,
        target_id: &str,
        event: StorageUpdateEvent,
    ) -> StreamResult<EventStreamEntry> {
        let mut stream = self.stream.write().expect("lock poisoned");
        let entry = EventStreamEntry::new(target_id, event, self.clock.now(), self.source.clone());
        stream.append(entry.clone())?;
        debug!(
            entry = %entry.id,
            target = %entry.target_id,
            kind = %entry.event.kind(),
            len = stream.len(),
            "appended to local log"
        );
        Ok(entry)
    }

    async fn entries(&self) -> StreamResult<Vec<EventStreamEntry>> {
        Ok(self.stream.read().expect("lock poisoned").entries().to_vec())
    }

    async fn head(&self) -> StreamResult<Option<EventStreamEntry>> {
        Ok(self.stream.read().expect("lock poisoned").head().cloned())
    }

    fn witness(&self, timestamp: &Timestamp) {
        self.clock.witness(timestamp);
    }

    async fn snapshot(&self) -> StreamResult<EventStream> {
        Ok(self.stream.read().expect("lock poisoned").clone())
    }
}
