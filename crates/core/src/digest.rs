//! Content digest types and utilities.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// A SHA-256 content digest represented as 32 bytes.
///
/// Digests are the content-addressable key for every binary: identical bytes
/// always map to the same digest, which is what makes deduplication work.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Create a new Digest from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute the SHA-256 digest of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher.
    pub fn hasher() -> DigestHasher {
        DigestHasher(Sha256::new())
    }

    /// Parse from a lowercase hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidDigest(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk)
                .map_err(|e| crate::Error::InvalidDigest(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidDigest(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Relative blob path for this digest.
    ///
    /// The first four hex characters shard blobs into two directory levels so
    /// that no single directory accumulates unbounded fan-out.
    pub fn blob_key(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}/{}", &hex[..2], &hex[2..4], hex)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental SHA-256 hasher for streamed writes.
pub struct DigestHasher(Sha256);

impl DigestHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Digest {
        Digest(self.0.finalize().into())
    }
}
