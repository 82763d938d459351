//! Synchronization for Roam.
//!
//! Peers never exchange tree state, only event streams. A pull fetches the
//! stream of every source the root folder listens to, checks each entry's
//! integrity, merges the streams by timestamp, and dispatches the result
//! into the tree. Because merges are idempotent, pulling the same entries
//! again changes nothing, and two peers that have seen the same entries end
//! up with the same tree.
//!
//! Transport and head publication are boundaries: [`SourceTransport`] and
//! [`HeadPublisher`] have in-memory implementations for tests and embedding.

pub mod config;
pub mod engine;
pub mod error;
pub mod publish;
pub mod transport;

pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncReport};
pub use error::{SyncError, SyncResult};
pub use publish::{HeadPublisher, InMemoryHeadRegistry};
pub use transport::{InMemoryTransport, SourceTransport};
