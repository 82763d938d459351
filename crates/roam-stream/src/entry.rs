use serde::{Deserialize, Serialize};

use roam_event::{EventCodec, StorageUpdateEvent};
use roam_types::{ContentHasher, SourceAddress};

use crate::clock::Timestamp;

/// Content-addressed identity of an event-stream entry.
///
/// Two deliveries of the same entry always carry the same id, which is what
/// handlers de-duplicate on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    hash: [u8; 32],
}

impl EntryId {
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Short hex representation (first 8 hex chars).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.hash[..4])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl std::fmt::Debug for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntryId({})", self.short_hex())
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry:{}", self.short_hex())
    }
}

/// One append to a source's event stream.
///
/// `target_id` is the id of the handler the entry is routed to. For entries
/// built with [`EventStreamEntry::for_event`] it equals the event's own
/// target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStreamEntry {
    /// Content hash over (target, event, timestamp, source).
    pub id: EntryId,
    /// Id of the handler this entry is addressed to.
    pub target_id: String,
    /// The update carried by this entry.
    pub event: StorageUpdateEvent,
    /// When the emitting source appended the entry.
    pub timestamp: Timestamp,
    /// The source that appended the entry.
    pub source: SourceAddress,
}

impl EventStreamEntry {
    /// Build an entry, computing its id.
    pub fn new(
        target_id: impl Into<String>,
        event: StorageUpdateEvent,
        timestamp: Timestamp,
        source: SourceAddress,
    ) -> Self {
        let target_id = target_id.into();
        let id = Self::compute_id(&target_id, &event, &timestamp, &source);
        Self {
            id,
            target_id,
            event,
            timestamp,
            source,
        }
    }

    /// Build an entry routed to the event's own target.
    pub fn for_event(event: StorageUpdateEvent, timestamp: Timestamp, source: SourceAddress) -> Self {
        let target = event.target_id().to_string();
        Self::new(target, event, timestamp, source)
    }

    /// Returns `true` if the id still matches the entry's content.
    pub fn verify_integrity(&self) -> bool {
        self.id == Self::compute_id(&self.target_id, &self.event, &self.timestamp, &self.source)
    }

    fn compute_id(
        target_id: &str,
        event: &StorageUpdateEvent,
        timestamp: &Timestamp,
        source: &SourceAddress,
    ) -> EntryId {
        // The wire encoding is the stable form of the event; object keys
        // serialize in sorted order.
        let event_bytes = EventCodec::to_json_string(event);
        let ts = timestamp.to_le_bytes();
        EntryId::from_hash(ContentHasher::ENTRY.hash_parts(&[
            target_id.as_bytes(),
            event_bytes.as_bytes(),
            ts.as_slice(),
            source.as_bytes().as_slice(),
        ]))
    }
}
