//! Content-based hashing for cache addressing

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// A SHA-256 content hash.
///
/// Used both for fingerprinting files (reference images) and as the
/// fixed-length digest behind cache keys. Hashes depend only on the bytes
/// fed in, so they are stable across processes and hosts.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute a hash from bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Compute a hash from a string
    pub fn from_str(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    /// Compute a hash from a file's contents
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(&data))
    }

    /// Start an incremental hash over a sequence of fields
    pub fn builder() -> FieldHasher {
        FieldHasher {
            inner: Sha256::new(),
        }
    }

    /// Get the hash as a hex string (64 chars)
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parse a 64-char lowercase or uppercase hex string
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Incremental hasher over length-prefixed fields.
///
/// Each field is framed by its byte length, so `["ab", "c"]` and
/// `["a", "bc"]` never collide.
pub struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    /// Append one field
    pub fn field(mut self, value: impl AsRef<[u8]>) -> Self {
        let bytes = value.as_ref();
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    /// Append an optional field; `None` and `Some("")` hash differently
    pub fn optional_field(self, value: Option<impl AsRef<[u8]>>) -> Self {
        match value {
            Some(v) => self.field([1u8]).field(v),
            None => self.field([0u8]),
        }
    }

    pub fn finish(self) -> ContentHash {
        ContentHash(self.inner.finalize().into())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistent_hashing() {
        let h1 = ContentHash::from_str("hello");
        let h2 = ContentHash::from_str("hello");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_different_content_different_hash() {
        let h1 = ContentHash::from_str("hello");
        let h2 = ContentHash::from_str("world");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = ContentHash::from_str("test data");
        let hex = h.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(ContentHash::from_hex(&hex), Some(h));
    }

    #[test]
    fn test_from_hex_invalid() {
        assert!(ContentHash::from_hex("abc").is_none());
        assert!(ContentHash::from_hex(&"zz".repeat(32)).is_none());
    }

    #[test]
    fn test_field_framing_prevents_collisions() {
        let a = ContentHash::builder().field("ab").field("c").finish();
        let b = ContentHash::builder().field("a").field("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_optional_field_none_vs_empty() {
        let none = ContentHash::builder().optional_field(None::<&str>).finish();
        let empty = ContentHash::builder().optional_field(Some("")).finish();
        assert_ne!(none, empty);
    }
}
