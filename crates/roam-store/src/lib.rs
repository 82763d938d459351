//! Content storage for Roam.
//!
//! File content never travels inside events. A file node only holds a
//! [`roam_types::ContentPointer`]; the bytes live in a [`ContentStore`]
//! keyed by that pointer. Content is immutable once stored, so the same
//! bytes always resolve to the same pointer and any pointer can be read
//! concurrently.
//!
//! - [`InMemoryContentStore`]: `HashMap`-based store for tests and embedding

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryContentStore;
pub use traits::{AccessMode, ContentReader, ContentStore};
