//! Hash and Codec Primitives
//!
//! The small, stateless building blocks the rest of the crate leans on:
//! content hashing for blob addressing and base64url JSON framing for the
//! `x-cashu` payment quote.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::PaymentQuote;

#[derive(Debug, Error)]
pub enum QuoteCodecError {
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// SHA-256 of arbitrary bytes, the content address for a blob.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// Encode a payment quote as the base64url JSON payload carried in the
/// `x-cashu` response header.
pub fn encode_quote(quote: &PaymentQuote) -> Result<String, QuoteCodecError> {
    let json = serde_json::to_vec(quote)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode_quote(encoded: &str) -> Result<PaymentQuote, QuoteCodecError> {
    let json = URL_SAFE_NO_PAD.decode(encoded)?;
    Ok(serde_json::from_slice(&json)?)
}
