//! Blob Record Types
//!
//! A blob is an immutable, content-addressed byte object. Records are
//! never deleted or mutated once written.

use serde::{Deserialize, Serialize};

/// A stored blob, keyed by the SHA-256 of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// SHA-256 of the blob bytes (32 bytes).
    pub sha256: [u8; 32],
    pub size: u64,
    /// Path on disk, relative to the configured data directory.
    pub path: String,
    pub created_at: i64,
    /// Pubkey (hex) the charging token was locked to, if known.
    pub pubkey: String,
    pub content_type: String,
}

impl Blob {
    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}

/// Response body for a successful `PUT /upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobDescriptor {
    pub url: String,
    pub sha256: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub uploaded: i64,
}
