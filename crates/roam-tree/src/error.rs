use roam_store::StoreError;
use roam_stream::StreamError;

/// Errors from tree navigation and mutation.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A lookup by id or name found nothing.
    #[error("{key} not found in folder {folder}")]
    NotFound { folder: String, key: String },

    /// An item name failed validation.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A create could not insert because another item holds the id.
    #[error("id {0} is already taken by another item")]
    IdTaken(String),

    /// The handler's node is no longer in the tree.
    #[error("{0} is no longer part of the tree")]
    Detached(String),

    /// A file has no content yet.
    #[error("file {0} has no content")]
    NoContent(String),

    /// The operation was cancelled before it mutated anything.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local log failure.
    #[error("event stream error: {0}")]
    Stream(#[from] StreamError),

    /// Content store failure.
    #[error("content store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
