use std::io;

use roam_types::SourceAddress;

use crate::entry::EntryId;

/// Errors produced by event streams and local logs.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// I/O error while reading or writing a log file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An entry was appended to a stream owned by another source.
    #[error("entry from {actual} cannot be appended to the stream of {expected}")]
    ForeignSource {
        expected: SourceAddress,
        actual: SourceAddress,
    },

    /// An entry's id does not match its content.
    #[error("integrity check failed for entry {0}")]
    IntegrityMismatch(EntryId),
}

/// Convenience alias used throughout the stream crate.
pub type StreamResult<T> = std::result::Result<T, StreamError>;
