//! P2PK Secret Parsing (NUT-10 / NUT-11)
//!
//! A Cashu secret is a JSON 2-tuple `[kind, {nonce, data, tags}]`. For a
//! P2PK-locked proof, `data` is the locking pubkey (hex) and `tags` carries
//! optional `locktime`/`sigflag`/`pubkeys`/`n_sigs` entries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("malformed secret JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretData {
    pub nonce: String,
    pub data: String,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct WellKnownSecret {
    pub kind: String,
    pub data: SecretData,
}

impl WellKnownSecret {
    pub fn parse(secret: &str) -> Result<Self, SecretError> {
        let (kind, data): (String, SecretData) = serde_json::from_str(secret)?;
        Ok(Self { kind, data })
    }

    pub fn is_p2pk(&self) -> bool {
        self.kind == "P2PK"
    }

    /// The pubkey (hex, 33-byte compressed) this secret is locked to.
    pub fn locked_pubkey(&self) -> &str {
        &self.data.data
    }

    fn tag(&self, name: &str) -> Option<&str> {
        self.data
            .tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    pub fn locktime(&self) -> Option<i64> {
        self.tag("locktime").and_then(|v| v.parse().ok())
    }
}
