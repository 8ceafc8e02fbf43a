//! Anonymized path keys.
//!
//! Archive directory and file names, as well as manifest lookup keys, are
//! derived from the original path components and must be stable across runs
//! and machines. A key is the first 16 bytes of the BLAKE3 digest of the
//! component's UTF-8 bytes, hex encoded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the key derivation scheme. Changing the derivation in any
/// way requires a new scheme identifier.
pub const KEY_SCHEME: &str = "blake3-128-hex/v1";

/// Number of digest bytes kept in a key
pub const KEY_BYTES: usize = 16;

/// A hash-derived stand-in for an original path component
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymizedKey(String);

impl AnonymizedKey {
    /// Derive the key for one path component
    pub fn derive(component: &str) -> Self {
        let digest = blake3::hash(component.as_bytes());
        Self(hex::encode(&digest.as_bytes()[..KEY_BYTES]))
    }

    /// Wrap an already-derived key, e.g. one read back from a manifest
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnonymizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AnonymizedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_published_blake3_vector() {
        // BLAKE3("") = af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262
        assert_eq!(
            AnonymizedKey::derive("").as_str(),
            "af1349b9f5f9a1a6a0404dea36dcc949"
        );
    }

    #[test]
    fn test_deterministic() {
        let a = AnonymizedKey::derive("E:\\photos\\2024");
        let b = AnonymizedKey::derive("E:\\photos\\2024");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), KEY_BYTES * 2);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_distinct_components() {
        assert_ne!(
            AnonymizedKey::derive("report.txt"),
            AnonymizedKey::derive("Report.txt")
        );
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let key = AnonymizedKey::from_raw("abc123");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc123\"");
    }
}
