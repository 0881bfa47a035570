//! Proof Verifier
//!
//! Checks an incoming [`Token`] is good payment: from a trusted mint,
//! structurally P2PK-locked to this server's active pubkey, not expired,
//! DLEQ-correct, and not a replay of an already-seen nullifier. Performs no
//! writes — the caller persists whatever this approves in its own
//! transaction.

use secp256k1::{PublicKey, Secp256k1};
use thiserror::Error;

use crate::cashu::crypto::{self, CryptoError};
use crate::cashu::secret::{SecretError, WellKnownSecret};
use crate::cashu::{Keyset, Proof, Token};
use crate::mint_client::{MintClient, MintClientError};
use crate::storage::sqlite::SqliteStore;
use crate::storage::StorageError;
use crate::wallet::Wallet;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("mint {0} is not trusted")]
    UntrustedMint(String),
    #[error("proof secret is not P2PK-locked: {0}")]
    NotP2pk(String),
    #[error("malformed secret: {0}")]
    Secret(#[from] SecretError),
    #[error("proof is locked to a different pubkey than the one advertised")]
    PubkeyMismatch,
    #[error("proof locktime leaves less than one rotation period before it becomes sender-refundable")]
    LocktimeTooShort,
    #[error("proof carries no DLEQ proof and DLEQ checking is required")]
    DleqMissing,
    #[error("DLEQ proof did not verify")]
    DleqInvalid,
    #[error("proof nullifier has already been redeemed")]
    DuplicateProof(String),
    #[error("unknown keyset {0} for amount {1}")]
    UnknownKeysetAmount(String, u64),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("mint error: {0}")]
    Mint(#[from] MintClientError),
    #[error("store error: {0}")]
    Store(#[from] StorageError),
    #[error("hex decode failed: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid public key encoding")]
    InvalidPubkey,
}

pub struct ProofVerifier<'a> {
    wallet: &'a Wallet,
    mint_client: &'a MintClient,
    store: &'a SqliteStore,
    enable_locktime_check: bool,
    enable_dleq_check: bool,
    rotation_period_secs: i64,
}

impl<'a> ProofVerifier<'a> {
    pub fn new(
        wallet: &'a Wallet,
        mint_client: &'a MintClient,
        store: &'a SqliteStore,
        enable_locktime_check: bool,
        enable_dleq_check: bool,
        rotation_period_secs: i64,
    ) -> Self {
        Self {
            wallet,
            mint_client,
            store,
            enable_locktime_check,
            enable_dleq_check,
            rotation_period_secs,
        }
    }

    /// Verify every proof in `token`. The token's total amount must already
    /// have been compared against the quote by the caller.
    pub async fn verify_token(
        &self,
        token: &Token,
        trusted_mints: &[String],
        now: i64,
    ) -> Result<(), VerifyError> {
        if !trusted_mints.iter().any(|m| m == &token.mint) {
            return Err(VerifyError::UntrustedMint(token.mint.clone()));
        }

        let active_pubkey = self.wallet.active_pubkey().await;
        let keysets = self.mint_client.active_keysets(&token.mint).await?;

        for proof in &token.proofs {
            self.verify_proof(proof, &active_pubkey, &keysets, now).await?;
        }
        Ok(())
    }

    async fn verify_proof(
        &self,
        proof: &Proof,
        active_pubkey: &str,
        keysets: &[Keyset],
        now: i64,
    ) -> Result<(), VerifyError> {
        let secret = WellKnownSecret::parse(&proof.secret)?;
        if !secret.is_p2pk() {
            return Err(VerifyError::NotP2pk(secret.kind.clone()));
        }
        if secret.locked_pubkey() != active_pubkey {
            return Err(VerifyError::PubkeyMismatch);
        }

        if self.enable_locktime_check {
            if let Some(locktime) = secret.locktime() {
                if locktime < now + self.rotation_period_secs {
                    return Err(VerifyError::LocktimeTooShort);
                }
            }
        }

        if self.enable_dleq_check {
            self.verify_dleq(proof, keysets)?;
        }

        if self.duplicate(&proof.c).await? {
            return Err(VerifyError::DuplicateProof(proof.c.clone()));
        }

        Ok(())
    }

    fn verify_dleq(&self, proof: &Proof, keysets: &[Keyset]) -> Result<(), VerifyError> {
        let dleq = proof.dleq.as_ref().ok_or(VerifyError::DleqMissing)?;

        let keyset = keysets
            .iter()
            .find(|k| k.id == proof.keyset_id)
            .ok_or_else(|| VerifyError::UnknownKeysetAmount(proof.keyset_id.clone(), proof.amount))?;
        let mint_pubkey_hex = keyset
            .keys
            .get(&proof.amount)
            .ok_or_else(|| VerifyError::UnknownKeysetAmount(proof.keyset_id.clone(), proof.amount))?;

        let secp = Secp256k1::new();
        let mint_pubkey_bytes = hex::decode(mint_pubkey_hex)?;
        let mint_pubkey =
            PublicKey::from_slice(&mint_pubkey_bytes).map_err(|_| VerifyError::InvalidPubkey)?;
        let c_bytes = hex::decode(&proof.c)?;
        let c = PublicKey::from_slice(&c_bytes).map_err(|_| VerifyError::InvalidPubkey)?;

        let ok = crypto::verify_proof_dleq(&secp, proof.secret.as_bytes(), &c, &mint_pubkey, dleq)?;
        if !ok {
            return Err(VerifyError::DleqInvalid);
        }
        Ok(())
    }

    /// Bloom-filter fast path, falling through to the store on a hit so a
    /// false positive never rejects a legitimate proof.
    async fn duplicate(&self, c: &str) -> Result<bool, VerifyError> {
        if !self.wallet.maybe_seen(c) {
            return Ok(false);
        }
        Ok(self.store.proof_c_exists(c).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cashu::DleqProof;

    fn sample_proof(pubkey_hex: &str) -> Proof {
        Proof {
            amount: 1,
            keyset_id: "00deadbeefcafe00".into(),
            secret: format!(r#"["P2PK",{{"nonce":"n","data":"{pubkey_hex}","tags":[]}}]"#),
            c: "02".to_string() + &"c".repeat(64),
            witness: None,
            dleq: None,
        }
    }

    #[tokio::test]
    async fn untrusted_mint_is_rejected_before_any_network_call() {
        let store = SqliteStore::in_memory().unwrap();
        let wallet = Wallet::init(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            &store,
            3600,
            1_700_000_000,
        )
        .await
        .unwrap();
        let mint_client = MintClient::new();
        let verifier = ProofVerifier::new(&wallet, &mint_client, &store, false, false, 3600);

        let token = Token {
            mint: "https://untrusted.example".into(),
            unit: "sat".into(),
            proofs: vec![sample_proof(&wallet.active_pubkey().await)],
        };

        let result = verifier
            .verify_token(&token, &["https://trusted.example".to_string()], 1_700_000_000)
            .await;
        assert!(matches!(result, Err(VerifyError::UntrustedMint(_))));
    }

    #[test]
    fn non_p2pk_secret_is_rejected_before_store_access() {
        let secret = r#"["HTLC",{"nonce":"n","data":"deadbeef","tags":[]}]"#;
        let parsed = WellKnownSecret::parse(secret).unwrap();
        assert!(!parsed.is_p2pk());
    }

    #[test]
    fn locktime_inside_the_rotation_window_is_too_short() {
        let secret = WellKnownSecret::parse(
            r#"["P2PK",{"nonce":"n","data":"02aa","tags":[["locktime","4000"]]}]"#,
        )
        .unwrap();
        let locktime = secret.locktime().unwrap();
        assert_eq!(locktime, 4000);
        // now=3000, rotation_period=3600: locktime (4000) < now + rotation_period (6600)
        assert!(locktime < 3000 + 3600);
    }

    #[test]
    fn locktime_past_the_rotation_window_is_accepted() {
        let secret = WellKnownSecret::parse(
            r#"["P2PK",{"nonce":"n","data":"02aa","tags":[["locktime","7000"]]}]"#,
        )
        .unwrap();
        let locktime = secret.locktime().unwrap();
        // now=3000, rotation_period=3600: locktime (7000) >= now + rotation_period (6600)
        assert!(locktime >= 3000 + 3600);
    }

    #[test]
    fn dleq_proof_round_trips_through_proof_struct() {
        let proof = Proof {
            dleq: Some(DleqProof {
                e: "ab".repeat(32),
                s: "cd".repeat(32),
            }),
            ..sample_proof("02aa")
        };
        assert!(proof.dleq.is_some());
    }
}
