use std::collections::HashMap;
use std::io::Cursor;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use roam_types::{ContentHasher, ContentPointer};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AccessMode, ContentReader, ContentStore};

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. Content is held behind a `RwLock` and
/// handed out as cheap `Bytes` clones.
pub struct InMemoryContentStore {
    blobs: RwLock<HashMap<ContentPointer, Bytes>>,
    hasher: ContentHasher,
}

impl InMemoryContentStore {
    /// Create a new empty store using the blob hashing domain.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            hasher: ContentHasher::BLOB,
        }
    }

    /// Number of distinct contents stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored contents.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn open(&self, pointer: &ContentPointer, mode: AccessMode) -> StoreResult<ContentReader> {
        let data = self
            .blobs
            .read()
            .expect("lock poisoned")
            .get(pointer)
            .cloned()
            .ok_or(StoreError::NotFound(*pointer))?;
        if mode.writes() {
            return Err(StoreError::ReadOnly {
                pointer: *pointer,
                mode,
            });
        }
        if !self.hasher.verify(&data, pointer) {
            return Err(StoreError::HashMismatch(*pointer));
        }
        Ok(Box::new(Cursor::new(data)))
    }

    async fn put(&self, data: Bytes) -> StoreResult<ContentPointer> {
        let pointer = self.hasher.hash(&data);
        let len = data.len();
        let mut blobs = self.blobs.write().expect("lock poisoned");
        let fresh = !blobs.contains_key(&pointer);
        blobs.entry(pointer).or_insert(data);
        debug!(pointer = %pointer.short_hex(), len, fresh, "stored content");
        Ok(pointer)
    }

    async fn exists(&self, pointer: &ContentPointer) -> StoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(pointer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    // ---------------------------------------------------------------
    // put / get
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemoryContentStore::new();
        let ptr = store.put(Bytes::from_static(b"hello roam")).await.unwrap();
        assert_eq!(ptr, ContentHasher::BLOB.hash(b"hello roam"));
        assert!(store.exists(&ptr).await.unwrap());
        assert_eq!(store.get(&ptr).await.unwrap(), Bytes::from_static(b"hello roam"));
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = InMemoryContentStore::new();
        let a = store.put(Bytes::from_static(b"same")).await.unwrap();
        let b = store.put(Bytes::from_static(b"same")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_bytes(), 4);
    }

    #[tokio::test]
    async fn missing_content_is_not_found() {
        let store = InMemoryContentStore::new();
        let ptr = ContentHasher::BLOB.hash(b"never stored");
        assert!(!store.exists(&ptr).await.unwrap());
        assert!(matches!(
            store.open(&ptr, AccessMode::Read).await,
            Err(StoreError::NotFound(p)) if p == ptr
        ));
    }

    // ---------------------------------------------------------------
    // access modes
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn open_for_read_streams_content() {
        let store = InMemoryContentStore::new();
        let ptr = store.put(Bytes::from_static(b"stream me")).await.unwrap();
        let mut reader = store.open(&ptr, AccessMode::Read).await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "stream me");
    }

    #[tokio::test]
    async fn write_modes_are_read_only() {
        let store = InMemoryContentStore::new();
        let ptr = store.put(Bytes::from_static(b"immutable")).await.unwrap();
        for mode in [AccessMode::Write, AccessMode::ReadWrite] {
            assert!(matches!(
                store.open(&ptr, mode).await,
                Err(StoreError::ReadOnly { .. })
            ));
        }
    }
}
