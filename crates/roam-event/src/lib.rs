//! Storage update events for Roam.
//!
//! A replicated tree changes only through the four events in
//! [`StorageUpdateEvent`]. Every variant names the item it targets and carries
//! enough payload to be applied without consulting any other event.
//!
//! [`EventCodec`] converts events to and from the JSON wire shape exchanged
//! at the log boundary, where each object is discriminated by its `eventId`
//! kind tag.

pub mod codec;
pub mod error;
pub mod event;

pub use codec::EventCodec;
pub use error::{CodecError, CodecResult};
pub use event::{EventKind, StorageUpdateEvent};
