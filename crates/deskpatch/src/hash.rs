//! Hex digest value shared by the archive header and the executable.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a SHA-256 digest rendered as hex text.
pub const HASH_HEX_LEN: usize = 64;

/// A 64-character lowercase hexadecimal SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashValue(String);

impl HashValue {
    /// Hash `bytes` with SHA-256.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Validate raw bytes as a lowercase hex digest.
    ///
    /// Uppercase digits are rejected: the executable stores the digest in
    /// lowercase, and matching is byte-exact.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let valid = bytes.len() == HASH_HEX_LEN
            && bytes
                .iter()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b));
        if !valid {
            return None;
        }
        std::str::from_utf8(bytes).ok().map(|s| Self(s.to_string()))
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::from_bytes(value.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HashValue {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not a lowercase sha256 hex digest: {value}"))
    }
}

impl From<HashValue> for String {
    fn from(value: HashValue) -> Self {
        value.0
    }
}
