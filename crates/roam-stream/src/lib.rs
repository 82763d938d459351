//! Event streams for Roam.
//!
//! Each source owns one append-only [`EventStream`] of
//! [`EventStreamEntry`] values. An entry wraps a single
//! [`roam_event::StorageUpdateEvent`] with routing and ordering metadata, and
//! its [`EntryId`] is a content hash, so a duplicated delivery is recognisable
//! by identity alone.
//!
//! The local source appends through an [`EventLog`]: [`InMemoryEventLog`]
//! for tests and embedding, or [`WalEventLog`] for a length- and
//! CRC-framed file that survives a crash mid-write. Local entries are stamped
//! by a [`HybridLogicalClock`].

pub mod clock;
pub mod entry;
pub mod error;
pub mod log;
pub mod stream;
pub mod wal;

pub use clock::{HybridLogicalClock, Timestamp};
pub use entry::{EntryId, EventStreamEntry};
pub use error::{StreamError, StreamResult};
pub use log::{EventLog, InMemoryEventLog};
pub use stream::{merge_streams, EventStream};
pub use wal::{SyncMode, WalConfig, WalEventLog};
