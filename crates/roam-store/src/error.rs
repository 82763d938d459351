use roam_types::ContentPointer;

use crate::traits::AccessMode;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No content is stored behind the pointer.
    #[error("content not found: {0}")]
    NotFound(ContentPointer),

    /// Stored content is immutable and cannot be opened for writing.
    #[error("content {pointer} is read-only; cannot open with {mode:?}")]
    ReadOnly {
        pointer: ContentPointer,
        mode: AccessMode,
    },

    /// Stored bytes no longer hash to their pointer.
    #[error("hash mismatch for {0}")]
    HashMismatch(ContentPointer),

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
