//! SHA-1 object identifiers.

use crate::error::{GitHeightError, Result};

/// An immutable 20-byte SHA-1 object id.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Parse a 40-character hexadecimal object id.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 40 {
            return Err(GitHeightError::malformed(
                "object id",
                format!("expected 40 hex characters, got {}", s.len()),
            ));
        }
        let bytes = hex::decode(s)
            .map_err(|e| GitHeightError::malformed("object id", e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Construct from a raw 20-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 20] = bytes.try_into().map_err(|_| {
            GitHeightError::malformed(
                "object id",
                format!("expected 20 bytes, got {}", bytes.len()),
            )
        })?;
        Ok(ObjectId(raw))
    }

    /// The raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hexadecimal form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The first byte, used as the pack-index fanout key.
    pub(crate) fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Big-endian 16-bit truncation of the first two bytes. This is the
    /// authoritative encoding for emitting a commit id into a version's
    /// revision component.
    pub fn truncated_u16(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// Both accepted truncation encodings, big-endian first. Early releases
    /// emitted a little-endian truncation, so matching a version back to a
    /// commit must accept either.
    pub fn truncated_u16_candidates(&self) -> [u16; 2] {
        [
            u16::from_be_bytes([self.0[0], self.0[1]]),
            u16::from_le_bytes([self.0[0], self.0[1]]),
        ]
    }

    /// Whether this id's hex form starts with the given (possibly odd-length)
    /// hex prefix.
    pub fn matches_hex_prefix(&self, prefix: &str) -> bool {
        let hex = self.to_hex();
        hex.len() >= prefix.len() && hex[..prefix.len()].eq_ignore_ascii_case(prefix)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = GitHeightError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}
