//! Rotation / Swap Scheduler
//!
//! A background tick loop with three jobs, run in order every
//! `rotation_period`: rotate the active locking pubkey once its expiration
//! has passed, swap redeemed-but-locked proofs into plain swapped proofs at
//! the mint, and flush fully-swapped holdings out to a Cashu V4 token in the
//! token log (optionally DM'd to the owner over Nostr).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::cashu::split::amount_split;
use crate::cashu::{swap_fee, BlindedMessage, Proof, Token};
use crate::mint_client::{MintClient, MintClientError};
use crate::storage::sqlite::{self, SqliteStore};
use crate::storage::StorageError;
use crate::types::{LockedProof, SwappedProof};
use crate::wallet::{Wallet, WalletError};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("store error: {0}")]
    Store(#[from] StorageError),
    #[error("mint error: {0}")]
    Mint(#[from] MintClientError),
    #[error("crypto error: {0}")]
    Crypto(#[from] crate::cashu::crypto::CryptoError),
    #[error("no active keyset advertised by {0}")]
    NoActiveKeyset(String),
    #[error("token log io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("token encode error: {0}")]
    TokenEncode(#[from] crate::cashu::token::TokenError),
}

#[derive(Debug, Default)]
pub struct TickResult {
    pub rotated: bool,
    pub mints_swapped: usize,
    pub proofs_swapped: usize,
    pub mints_spent: usize,
}

impl std::fmt::Display for TickResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rotated: {}, mints swapped: {}, proofs swapped: {}, mints spent: {}",
            self.rotated, self.mints_swapped, self.proofs_swapped, self.mints_spent
        )
    }
}

pub struct RotationScheduler {
    wallet: Arc<Wallet>,
    store: Arc<SqliteStore>,
    mint_client: Arc<MintClient>,
    rotation_period_secs: i64,
    token_log_path: PathBuf,
    notifier: Option<Arc<dyn OwnerNotifier>>,
}

/// Notifies the vault owner that new spendable ecash has been flushed out.
/// Implemented by [`crate::nostr_dm::NostrNotifier`]; kept as a trait here
/// so the scheduler doesn't need to know about Nostr at all when disabled.
#[async_trait::async_trait]
pub trait OwnerNotifier: Send + Sync {
    async fn notify_token(&self, token: &str, amount: u64, mint: &str);
}

impl RotationScheduler {
    pub fn new(
        wallet: Arc<Wallet>,
        store: Arc<SqliteStore>,
        mint_client: Arc<MintClient>,
        rotation_period_secs: i64,
        token_log_path: PathBuf,
        notifier: Option<Arc<dyn OwnerNotifier>>,
    ) -> Self {
        Self {
            wallet,
            store,
            mint_client,
            rotation_period_secs,
            token_log_path,
            notifier,
        }
    }

    pub async fn run(&self, now_fn: impl Fn() -> i64) {
        let mut ticker = interval(Duration::from_secs(self.rotation_period_secs.max(1) as u64));
        loop {
            ticker.tick().await;
            match self.tick(now_fn()).await {
                Ok(result) => tracing::info!(%result, "scheduler tick complete"),
                Err(e) => tracing::error!(error = %e, "scheduler tick failed"),
            }
        }
    }

    pub async fn tick(&self, now: i64) -> Result<TickResult, SchedulerError> {
        let mut result = TickResult::default();
        result.rotated = self.maybe_rotate(now).await?;

        let (mints_swapped, proofs_swapped) = self.rotate_locked_proofs(now).await?;
        result.mints_swapped = mints_swapped;
        result.proofs_swapped = proofs_swapped;

        result.mints_spent = self.spend_swapped_proofs(now).await?;
        Ok(result)
    }

    /// Rotate the active pubkey if its expiration has passed. The DB write
    /// (flip + insert) happens first; only on a successful commit do we
    /// touch the in-memory cache, and on any failure the cache's prior
    /// snapshot is left untouched.
    async fn maybe_rotate(&self, now: i64) -> Result<bool, SchedulerError> {
        if now < self.wallet.active_expiration().await {
            return Ok(false);
        }

        let next_expiration = now + self.rotation_period_secs;
        let rotated = self
            .store
            .transaction(move |tx| sqlite::rotate_pubkey(tx, next_expiration))
            .await?;
        self.wallet.apply_rotation(&rotated).await?;
        Ok(true)
    }

    /// Swap every unredeemed locked proof into plain swapped proofs, one
    /// mint at a time. Each mint's swap is a single atomic transaction:
    /// redeem the inputs, store the outputs, advance the keyset counter.
    async fn rotate_locked_proofs(&self, now: i64) -> Result<(usize, usize), SchedulerError> {
        let unredeemed = self
            .store
            .transaction(sqlite::get_unredeemed_locked_proofs)
            .await?;
        if unredeemed.is_empty() {
            return Ok((0, 0));
        }

        let mut by_mint: std::collections::HashMap<String, Vec<LockedProof>> =
            std::collections::HashMap::new();
        for proof in unredeemed {
            by_mint.entry(proof.mint.clone()).or_default().push(proof);
        }

        let mut mints_swapped = 0;
        let mut proofs_swapped = 0;
        for (mint, proofs) in by_mint {
            let count = proofs.len();
            if self.swap_mint_proofs(&mint, proofs, now).await? {
                mints_swapped += 1;
                proofs_swapped += count;
            }
        }
        Ok((mints_swapped, proofs_swapped))
    }

    /// Swaps `locked`'s proofs into fresh swapped proofs at `mint`, net of
    /// the mint's NUT-02 fee. Returns `false` (no-op, nothing persisted)
    /// when the fee consumes the entire input amount.
    async fn swap_mint_proofs(
        &self,
        mint: &str,
        locked: Vec<LockedProof>,
        now: i64,
    ) -> Result<bool, SchedulerError> {
        let keysets = self.mint_client.active_keysets(mint).await?;
        let keyset = keysets
            .first()
            .ok_or_else(|| SchedulerError::NoActiveKeyset(mint.to_string()))?;

        let counter_start = self
            .store
            .transaction({
                let keyset_id = keyset.id.clone();
                move |tx| sqlite::get_keyset_counter(tx, &keyset_id)
            })
            .await?
            .counter;

        let inputs: Vec<Proof> = locked
            .iter()
            .map(|p| Proof {
                amount: p.amount,
                keyset_id: p.keyset_id.clone(),
                secret: p.secret.clone(),
                c: p.c.clone(),
                witness: p.witness.clone(),
                dleq: None,
            })
            .collect();

        let historical_keysets = self.mint_client.all_keysets(mint).await?;
        let fee_ppk_by_keyset: std::collections::BTreeMap<String, u64> = historical_keysets
            .into_iter()
            .map(|k| (k.id, k.input_fee_ppk))
            .collect();
        let fee = swap_fee(&inputs, &fee_ppk_by_keyset);

        let total: u64 = locked.iter().map(|p| p.amount).sum();
        let net = total.saturating_sub(fee);
        if net == 0 {
            tracing::info!(mint, total, fee, "swap net amount is zero after fees, skipping");
            return Ok(false);
        }
        let output_amounts = amount_split(net);

        let secp = secp256k1::Secp256k1::new();
        let mut outputs = Vec::with_capacity(output_amounts.len());
        let mut output_keys = Vec::with_capacity(output_amounts.len());
        for (i, amount) in output_amounts.iter().enumerate() {
            let (secret_key, r) = self.wallet.derive_output_keys(counter_start + i as u64)?;
            let secret_hex = hex::encode(secret_key.secret_bytes());
            let blinded = crate::cashu::crypto::blind_message(&secp, secret_hex.as_bytes(), &r)?;
            outputs.push(BlindedMessage {
                amount: *amount,
                keyset_id: keyset.id.clone(),
                b: hex::encode(blinded.serialize()),
            });
            output_keys.push((secret_hex, r));
        }

        let signatures = self.mint_client.post_swap(mint, &inputs, &outputs).await?;

        let mut swapped = Vec::with_capacity(signatures.len());
        for (sig, (secret_hex, r)) in signatures.iter().zip(output_keys.iter()) {
            let mint_pubkey_hex = keyset
                .keys
                .get(&sig.amount)
                .ok_or_else(|| SchedulerError::NoActiveKeyset(mint.to_string()))?;
            let mint_pubkey_bytes = hex::decode(mint_pubkey_hex)
                .map_err(|_| SchedulerError::NoActiveKeyset(mint.to_string()))?;
            let mint_pubkey = secp256k1::PublicKey::from_slice(&mint_pubkey_bytes)
                .map_err(|_| SchedulerError::NoActiveKeyset(mint.to_string()))?;
            let c_bytes = hex::decode(&sig.c).map_err(|_| SchedulerError::NoActiveKeyset(mint.to_string()))?;
            let c_blind = secp256k1::PublicKey::from_slice(&c_bytes)
                .map_err(|_| SchedulerError::NoActiveKeyset(mint.to_string()))?;

            let unblinded =
                crate::cashu::crypto::unblind_signature(&secp, &c_blind, r, &mint_pubkey)?;

            if let Some(dleq) = &sig.dleq {
                let ok = crate::cashu::crypto::verify_proof_dleq(
                    &secp,
                    secret_hex.as_bytes(),
                    &unblinded,
                    &mint_pubkey,
                    dleq,
                )?;
                if !ok {
                    tracing::warn!(mint, "mint returned an invalid DLEQ proof on swap output, skipping it");
                    continue;
                }
            }

            swapped.push(SwappedProof {
                amount: sig.amount,
                keyset_id: sig.keyset_id.clone(),
                secret: secret_hex.clone(),
                c: hex::encode(unblinded.serialize()),
                witness: None,
                spent: false,
                created_at: now,
                mint: mint.to_string(),
            });
        }

        let redeemed_cs: Vec<String> = locked.iter().map(|p| p.c.clone()).collect();
        let next_counter = counter_start + output_amounts.len() as u64;
        let keyset_id = keyset.id.clone();

        self.store
            .transaction(move |tx| {
                sqlite::insert_swapped_proofs(tx, &swapped)?;
                sqlite::mark_locked_proofs_redeemed(tx, &redeemed_cs)?;
                sqlite::set_keyset_counter(tx, &keyset_id, next_counter)?;
                Ok(())
            })
            .await?;

        for c in &redeemed_cs {
            self.wallet.mark_seen(c);
        }

        Ok(true)
    }

    /// Flush every unspent swapped proof, one mint at a time, into a Cashu
    /// V4 token appended to the token log — the server's actual cash-out.
    async fn spend_swapped_proofs(&self, now: i64) -> Result<usize, SchedulerError> {
        let trusted_mints = self.store.list_trusted_mints().await?;
        let mut mints_spent = 0;

        for mint in trusted_mints {
            let proofs = self
                .store
                .transaction({
                    let mint = mint.clone();
                    move |tx| sqlite::get_unspent_swapped_proofs_by_mint(tx, &mint)
                })
                .await?;
            if proofs.is_empty() {
                continue;
            }

            let amount: u64 = proofs.iter().map(|p| p.amount).sum();
            let token = Token {
                mint: mint.clone(),
                unit: "sat".to_string(),
                proofs: proofs
                    .iter()
                    .map(|p| Proof {
                        amount: p.amount,
                        keyset_id: p.keyset_id.clone(),
                        secret: p.secret.clone(),
                        c: p.c.clone(),
                        witness: p.witness.clone(),
                        dleq: None,
                    })
                    .collect(),
            };
            let encoded = crate::cashu::token::encode_token(&token)?;

            self.append_token_log(&encoded, amount, &mint, now).await?;

            if let Some(notifier) = &self.notifier {
                notifier.notify_token(&encoded, amount, &mint).await;
            }

            let cs: Vec<String> = proofs.iter().map(|p| p.c.clone()).collect();
            self.store
                .transaction(move |tx| sqlite::mark_swapped_proofs_spent(tx, &cs))
                .await?;

            mints_spent += 1;
        }

        Ok(mints_spent)
    }

    async fn append_token_log(
        &self,
        token: &str,
        amount: u64,
        mint: &str,
        now: i64,
    ) -> Result<(), SchedulerError> {
        if let Some(parent) = self.token_log_path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let line = format_token_log_line(token, amount, mint, now);

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.token_log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

fn format_token_log_line(token: &str, amount: u64, mint: &str, now: i64) -> String {
    let timestamp = chrono::DateTime::from_timestamp(now, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| now.to_string());
    format!("# {timestamp} amount={amount} mint={mint}\n{token}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_log_line_carries_a_readable_header() {
        let line = format_token_log_line("cashuBxyz", 42, "https://mint.example", 1_700_000_000);
        assert!(line.starts_with("# 2023-11-14"));
        assert!(line.contains("amount=42"));
        assert!(line.contains("mint=https://mint.example"));
        assert!(line.ends_with("cashuBxyz\n"));
    }

    #[test]
    fn tick_result_display_is_human_readable() {
        let result = TickResult {
            rotated: true,
            mints_swapped: 1,
            proofs_swapped: 3,
            mints_spent: 1,
        };
        assert_eq!(
            result.to_string(),
            "rotated: true, mints swapped: 1, proofs swapped: 3, mints spent: 1"
        );
    }
}
