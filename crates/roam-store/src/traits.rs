use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use roam_types::ContentPointer;

use crate::error::StoreResult;

/// How a caller intends to use opened content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Returns `true` if the mode asks for write access.
    pub fn writes(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A readable handle onto stored content.
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Pointer-addressed, immutable content store.
///
/// Implementations must satisfy these invariants:
/// - Content is immutable once stored: the same bytes always yield the same
///   pointer, and `put` of existing content is a no-op.
/// - Opening content with a writing [`AccessMode`] fails with
///   [`crate::StoreError::ReadOnly`]; new content is written with `put`.
/// - Concurrent reads are always safe.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Open the content behind `pointer`.
    async fn open(&self, pointer: &ContentPointer, mode: AccessMode) -> StoreResult<ContentReader>;

    /// Store `data` and return its pointer.
    async fn put(&self, data: Bytes) -> StoreResult<ContentPointer>;

    /// Check whether content exists behind `pointer`.
    async fn exists(&self, pointer: &ContentPointer) -> StoreResult<bool>;

    /// Read the whole content behind `pointer`.
    ///
    /// Default implementation opens for reading and drains the reader.
    async fn get(&self, pointer: &ContentPointer) -> StoreResult<Bytes> {
        let mut reader = self.open(pointer, AccessMode::Read).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
