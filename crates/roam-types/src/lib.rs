//! Foundation types for Roam.
//!
//! Every other Roam crate depends on `roam-types`. It holds the two opaque
//! addressing primitives the replicated tree is built on, plus the hasher
//! that derives them.
//!
//! # Key Types
//!
//! - [`ContentPointer`]: Immutable, content-addressed reference to a blob (BLAKE3)
//! - [`SourceAddress`]: Stable address of a peer's mutable event-stream head
//! - [`ContentHasher`]: Domain-separated BLAKE3 hashing

pub mod error;
pub mod hasher;
pub mod pointer;
pub mod source;

pub use error::TypeError;
pub use hasher::{ContentHasher, HasherError};
pub use pointer::ContentPointer;
pub use source::{SourceAddress, SourceMaterial};
