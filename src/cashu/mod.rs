//! Cashu Protocol Primitives
//!
//! Minimal wire types and crypto for the subset of the Cashu protocol this
//! server needs: decoding a V4 token, verifying a P2PK-locked proof, and
//! blinding/unblinding outputs across a mint swap. Field shapes follow the
//! data model: a [`Proof`] carries exactly `amount`/`keyset_id`/`secret`/
//! `c`/`witness`, matching `LockedProof`/`SwappedProof` minus bookkeeping
//! columns.

pub mod crypto;
pub mod secret;
pub mod split;
pub mod token;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One Cashu proof: a mint-signed `(amount, keyset_id, secret, C)` tuple,
/// plus an optional witness satisfying the secret's spending condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub amount: u64,
    #[serde(rename = "id")]
    pub keyset_id: String,
    pub secret: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dleq: Option<DleqProof>,
}

/// A blinded output offered to the mint in a swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindedMessage {
    pub amount: u64,
    #[serde(rename = "id")]
    pub keyset_id: String,
    #[serde(rename = "B_")]
    pub b: String,
}

/// The mint's blind signature over one [`BlindedMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindedSignature {
    pub amount: u64,
    #[serde(rename = "id")]
    pub keyset_id: String,
    #[serde(rename = "C_")]
    pub c: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dleq: Option<DleqProof>,
}

/// A NUT-12 DLEQ proof accompanying a blind signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DleqProof {
    pub e: String,
    pub s: String,
}

/// A mint keyset: its id plus the per-amount public keys used to sign
/// outputs of that amount. Unit is always `"sat"` in this deployment.
/// `input_fee_ppk` is the mint's NUT-02 fee rate, in parts-per-thousand of
/// an input's amount, charged when that keyset's proofs are spent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyset {
    pub id: String,
    pub unit: String,
    pub keys: BTreeMap<u64, String>,
    #[serde(default)]
    pub input_fee_ppk: u64,
}

/// `ceil(sum(input_fee_ppk for each input's keyset) / 1000)`, the NUT-02
/// swap fee owed to the mint for spending `inputs`. `fee_ppk_by_keyset`
/// maps keyset id to its `input_fee_ppk`; a keyset absent from the map
/// (the mint never advertised it) is treated as fee-free.
pub fn swap_fee(inputs: &[Proof], fee_ppk_by_keyset: &BTreeMap<String, u64>) -> u64 {
    let total_ppk: u64 = inputs
        .iter()
        .map(|p| fee_ppk_by_keyset.get(&p.keyset_id).copied().unwrap_or(0))
        .sum();
    (total_ppk + 999) / 1000
}

/// A decoded token: proofs from one mint, ready for verification.
#[derive(Debug, Clone)]
pub struct Token {
    pub mint: String,
    pub unit: String,
    pub proofs: Vec<Proof>,
}

impl Token {
    pub fn amount(&self) -> u64 {
        self.proofs.iter().map(|p| p.amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(amount: u64, keyset_id: &str) -> Proof {
        Proof {
            amount,
            keyset_id: keyset_id.to_string(),
            secret: "s".to_string(),
            c: "c".to_string(),
            witness: None,
            dleq: None,
        }
    }

    #[test]
    fn swap_fee_rounds_up_to_the_next_sat() {
        let inputs = vec![proof(100, "k1")];
        let mut fees = BTreeMap::new();
        fees.insert("k1".to_string(), 2_000u64);
        // 2000 ppk / 1000 = 2 sat exactly
        assert_eq!(swap_fee(&inputs, &fees), 2);

        let mut fees_rounding = BTreeMap::new();
        fees_rounding.insert("k1".to_string(), 1u64);
        assert_eq!(swap_fee(&inputs, &fees_rounding), 1);
    }

    #[test]
    fn swap_fee_sums_across_multiple_inputs_and_keysets() {
        let inputs = vec![proof(50, "k1"), proof(50, "k2")];
        let mut fees = BTreeMap::new();
        fees.insert("k1".to_string(), 500u64);
        fees.insert("k2".to_string(), 500u64);
        assert_eq!(swap_fee(&inputs, &fees), 1);
    }

    #[test]
    fn unknown_keyset_is_treated_as_fee_free() {
        let inputs = vec![proof(10, "unknown")];
        assert_eq!(swap_fee(&inputs, &BTreeMap::new()), 0);
    }
}
