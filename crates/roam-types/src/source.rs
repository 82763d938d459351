use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{decode_hash, TypeError};
use crate::hasher::ContentHasher;

/// Material used to derive a [`SourceAddress`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceMaterial {
    /// A publishing public key (32 bytes).
    PublicKey([u8; 32]),
    /// A named local publishing key, e.g. `"roam-home"`.
    KeyName(String),
}

/// Address of a source: where a peer's current event-stream head is found.
///
/// The address itself never changes; the head published behind it does.
/// Derived deterministically from [`SourceMaterial`] so every peer that
/// knows the material computes the same address.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceAddress {
    hash: [u8; 32],
}

impl SourceAddress {
    /// Derive an address from source material.
    pub fn derive(material: &SourceMaterial) -> Self {
        let hash = match material {
            SourceMaterial::PublicKey(pk) => {
                ContentHasher::SOURCE.hash_parts(&[b"pubkey".as_slice(), pk.as_slice()])
            }
            SourceMaterial::KeyName(name) => {
                ContentHasher::SOURCE.hash_parts(&[b"key".as_slice(), name.as_bytes()])
            }
        };
        Self { hash }
    }

    /// Shorthand for deriving from a named key.
    pub fn from_key_name(name: &str) -> Self {
        Self::derive(&SourceMaterial::KeyName(name.to_string()))
    }

    /// Create a random address for tests and demos.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self::derive(&SourceMaterial::PublicKey(bytes))
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Full hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Short identifier (`src:` + first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("src:{}", hex::encode(&self.hash[..4]))
    }

    /// Parse from a hex string, with or without the `src:` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        decode_hash(s, "src:").map(|hash| Self { hash })
    }
}

impl fmt::Debug for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceAddress({})", self.short_id())
    }
}

impl fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}

impl Serialize for SourceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SourceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = SourceAddress::from_key_name("laptop");
        let b = SourceAddress::from_key_name("laptop");
        assert_eq!(a, b);
    }

    #[test]
    fn material_kinds_do_not_collide() {
        let key = SourceAddress::derive(&SourceMaterial::PublicKey([7; 32]));
        let name = SourceAddress::from_key_name("laptop");
        assert_ne!(key, name);
    }

    #[test]
    fn ephemeral_addresses_are_unique() {
        assert_ne!(SourceAddress::ephemeral(), SourceAddress::ephemeral());
    }

    #[test]
    fn short_id_format() {
        let short = SourceAddress::from_key_name("x").short_id();
        assert!(short.starts_with("src:"));
        assert_eq!(short.len(), 12);
    }

    #[test]
    fn hex_roundtrip_with_prefix() {
        let addr = SourceAddress::from_key_name("phone");
        let prefixed = format!("src:{}", addr.to_hex());
        assert_eq!(SourceAddress::from_hex(&prefixed).unwrap(), addr);
    }

    #[test]
    fn serde_roundtrip() {
        let addr = SourceAddress::from_key_name("desktop");
        let json = serde_json::to_string(&addr).unwrap();
        let parsed: SourceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, parsed);
    }
}
