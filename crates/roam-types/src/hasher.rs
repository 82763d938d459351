use crate::pointer::ContentPointer;

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag (e.g. `"roam-blob-v1"`) that is
/// prepended to every hash computation, so a blob and an event-stream entry
/// with identical bytes never share a pointer.
#[derive(Clone, Copy, Debug)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for blob content held by a content store.
    pub const BLOB: Self = Self {
        domain: "roam-blob-v1",
    };
    /// Hasher for event-stream entry identities.
    pub const ENTRY: Self = Self {
        domain: "roam-entry-v1",
    };
    /// Hasher for source addresses.
    pub const SOURCE: Self = Self {
        domain: "roam-source-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ContentPointer {
        ContentPointer::from_hash(self.hash_parts(&[data]))
    }

    /// Hash several byte slices as one domain-separated message.
    ///
    /// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` hash
    /// differently.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        *hasher.finalize().as_bytes()
    }

    /// Hash a serializable value as JSON with domain separation.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<ContentPointer, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected pointer.
    pub fn verify(&self, data: &[u8], expected: &ContentPointer) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
