//! SHA-256 fingerprints for cache keys and cached content

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 checksum of some content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn of_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex characters, used where a shorter stable id is enough
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &str) -> bool {
        Self::of_str(content) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let url = "https://example.com/schemas/address.json";
        assert_eq!(Checksum::of_str(url), Checksum::of_str(url));
        assert_ne!(Checksum::of_str(url), Checksum::of_str("https://example.com/other.json"));
    }

    #[test]
    fn test_checksum_verification() {
        let content = r#"{"type": "string"}"#;
        let checksum = Checksum::of_str(content);
        assert!(checksum.verify(content));
        assert!(!checksum.verify(r#"{"type": "number"}"#));
    }

    #[test]
    fn test_short_prefix() {
        let checksum = Checksum::of_str("abc");
        assert_eq!(checksum.short(16).len(), 16);
        assert!(checksum.as_str().starts_with(checksum.short(16)));
        assert_eq!(checksum.short(1000), checksum.as_str());
    }
}
