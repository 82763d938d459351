use std::time::Duration;

use thiserror::Error;

use roam_stream::StreamError;
use roam_tree::TreeError;
use roam_types::SourceAddress;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync cancelled")]
    Cancelled,

    #[error("fetching {peer} timed out after {after:?}")]
    Timeout { peer: SourceAddress, after: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no stream known for {0}")]
    UnknownSource(SourceAddress),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("tree error: {0}")]
    Tree(TreeError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
}

impl From<TreeError> for SyncError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::Cancelled => Self::Cancelled,
            other => Self::Tree(other),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
