//! Cashu V4 Token Encoding
//!
//! `cashuB<base64url(cbor)>`. The CBOR payload groups proofs by mint under
//! `t`, with the unit under `u`. This implementation keeps keyset id and
//! nullifier as hex strings rather than raw CBOR byte strings — a
//! deliberate subset of the full NUT-00 binary encoding, sufficient for a
//! server that only ever talks to its own configured mint.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DleqProof, Proof, Token};

const TOKEN_PREFIX: &str = "cashuB";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token missing the cashuB prefix")]
    MissingPrefix,
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cbor decode failed: {0}")]
    CborDecode(String),
    #[error("cbor encode failed: {0}")]
    CborEncode(String),
}

#[derive(Serialize, Deserialize)]
struct RawProof {
    a: u64,
    s: String,
    c: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    w: Option<String>,
    i: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    d_e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    d_s: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RawTokenV4 {
    m: String,
    u: String,
    t: Vec<RawProof>,
}

pub fn decode_token(encoded: &str) -> Result<Token, TokenError> {
    let body = encoded.strip_prefix(TOKEN_PREFIX).ok_or(TokenError::MissingPrefix)?;
    let cbor_bytes = URL_SAFE_NO_PAD.decode(body)?;
    let raw: RawTokenV4 = ciborium::de::from_reader(cbor_bytes.as_slice())
        .map_err(|e| TokenError::CborDecode(e.to_string()))?;

    let proofs = raw
        .t
        .into_iter()
        .map(|p| Proof {
            amount: p.a,
            keyset_id: p.i,
            secret: p.s,
            c: p.c,
            witness: p.w,
            dleq: match (p.d_e, p.d_s) {
                (Some(e), Some(s)) => Some(DleqProof { e, s }),
                _ => None,
            },
        })
        .collect();

    Ok(Token {
        mint: raw.m,
        unit: raw.u,
        proofs,
    })
}

pub fn encode_token(token: &Token) -> Result<String, TokenError> {
    let raw = RawTokenV4 {
        m: token.mint.clone(),
        u: token.unit.clone(),
        t: token
            .proofs
            .iter()
            .map(|p| RawProof {
                a: p.amount,
                s: p.secret.clone(),
                c: p.c.clone(),
                w: p.witness.clone(),
                i: p.keyset_id.clone(),
                d_e: p.dleq.as_ref().map(|d| d.e.clone()),
                d_s: p.dleq.as_ref().map(|d| d.s.clone()),
            })
            .collect(),
    };

    let mut cbor_bytes = Vec::new();
    ciborium::ser::into_writer(&raw, &mut cbor_bytes).map_err(|e| TokenError::CborEncode(e.to_string()))?;

    Ok(format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(cbor_bytes)))
}
