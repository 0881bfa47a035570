//! HD Wallet / Key Manager
//!
//! Derives the server's locking pubkey along the fixed hardened path
//! `m/129372'/version'` from a BIP39 mnemonic, rotating to a new version on
//! a timer. Also owns the in-memory Bloom filter used as a fast-path
//! negative cache against replayed proof nullifiers.

use std::sync::RwLock as StdRwLock;

use bip39::Mnemonic;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::Network;
use bloomfilter::Bloom;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::storage::sqlite::{self, SqliteStore};
use crate::storage::StorageError;
use crate::types::PubkeyVersion;

/// Fixed BIP32 purpose index this server's locking keys are derived under.
const DERIVATION_PURPOSE: u32 = 129_372;

/// Pubkey versions occupy the low end of the purpose's child index space;
/// swap-output key material is derived from the high end so the two never
/// collide.
const OUTPUT_DERIVATION_BASE: u64 = 0x7000_0000;

/// Expected load for the duplicate-nullifier Bloom filter.
const BLOOM_CAPACITY: usize = 1_000_000;
const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("master key derivation failed: {0}")]
    MasterKey(String),
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("store error: {0}")]
    Store(#[from] StorageError),
    #[error("no active pubkey version cached yet")]
    NoActiveVersion,
}

struct WalletCache {
    version: u64,
    expiration: i64,
    pubkey_hex: String,
}

pub struct Wallet {
    secp: Secp256k1<All>,
    master: Xpriv,
    cache: RwLock<WalletCache>,
    duplicate_filter: StdRwLock<Bloom<str>>,
}

impl Wallet {
    /// Derive the master key from `mnemonic`, ensure an active pubkey
    /// version exists (rotating one into being if the store is empty), and
    /// warm the duplicate-nullifier Bloom filter from unredeemed proofs.
    pub async fn init(
        mnemonic: &str,
        store: &SqliteStore,
        rotation_period_secs: i64,
        now: i64,
    ) -> Result<Self, WalletError> {
        let mnemonic = Mnemonic::parse(mnemonic).map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        let seed = mnemonic.to_seed("");
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(Network::Bitcoin, &seed)
            .map_err(|e| WalletError::MasterKey(e.to_string()))?;

        let active = store
            .transaction(move |tx| {
                if let Some(active) = sqlite::get_active_pubkey_version(tx)? {
                    Ok(active)
                } else {
                    sqlite::rotate_pubkey(tx, now + rotation_period_secs)
                }
            })
            .await?;

        let privkey = derive_privkey(&secp, &master, active.version)?;
        let pubkey_hex = hex_pubkey(&secp, &privkey);

        let unredeemed = store
            .transaction(sqlite::get_unredeemed_locked_proofs)
            .await?;
        let mut filter = Bloom::new_for_fp_rate(BLOOM_CAPACITY, BLOOM_FALSE_POSITIVE_RATE);
        for proof in &unredeemed {
            filter.set(proof.c.as_str());
        }

        Ok(Self {
            secp,
            master,
            cache: RwLock::new(WalletCache {
                version: active.version,
                expiration: active.expiration,
                pubkey_hex,
            }),
            duplicate_filter: StdRwLock::new(filter),
        })
    }

    pub async fn active_pubkey(&self) -> String {
        self.cache.read().await.pubkey_hex.clone()
    }

    pub async fn active_version(&self) -> u64 {
        self.cache.read().await.version
    }

    pub async fn active_expiration(&self) -> i64 {
        self.cache.read().await.expiration
    }

    /// Pure derivation: the locking privkey for a given pubkey version.
    pub fn derive(&self, version: u64) -> Result<SecretKey, WalletError> {
        derive_privkey(&self.secp, &self.master, version)
    }

    /// Deterministic `(secret, blinding factor)` key material for the
    /// `counter`-th swap output this wallet has ever produced. Two
    /// independent hardened children so recovering one never leaks the
    /// other.
    pub fn derive_output_keys(&self, counter: u64) -> Result<(SecretKey, SecretKey), WalletError> {
        let secret_key = derive_privkey(&self.secp, &self.master, OUTPUT_DERIVATION_BASE + counter * 2)?;
        let blinding_key =
            derive_privkey(&self.secp, &self.master, OUTPUT_DERIVATION_BASE + counter * 2 + 1)?;
        Ok((secret_key, blinding_key))
    }

    /// Flip the active row and insert the next version inside the caller's
    /// transaction. Does not touch the in-memory cache — call
    /// [`Wallet::apply_rotation`] only after the caller's transaction
    /// commits.
    pub fn rotate(
        &self,
        tx: &rusqlite::Transaction<'_>,
        expiration: i64,
    ) -> Result<PubkeyVersion, WalletError> {
        Ok(sqlite::rotate_pubkey(tx, expiration)?)
    }

    /// Update the cached `(version, pubkey)` after a rotation's transaction
    /// has committed successfully.
    pub async fn apply_rotation(&self, version: &PubkeyVersion) -> Result<(), WalletError> {
        let privkey = self.derive(version.version)?;
        let pubkey_hex = hex_pubkey(&self.secp, &privkey);
        let mut cache = self.cache.write().await;
        cache.version = version.version;
        cache.expiration = version.expiration;
        cache.pubkey_hex = pubkey_hex;
        Ok(())
    }

    /// Snapshot of the current cache, to restore on a failed rotation.
    pub async fn snapshot(&self) -> (u64, i64, String) {
        let cache = self.cache.read().await;
        (cache.version, cache.expiration, cache.pubkey_hex.clone())
    }

    pub async fn restore(&self, version: u64, expiration: i64, pubkey_hex: String) {
        let mut cache = self.cache.write().await;
        cache.version = version;
        cache.expiration = expiration;
        cache.pubkey_hex = pubkey_hex;
    }

    /// Fast-path check: has this nullifier possibly been seen before? A
    /// `false` means definitely not; a `true` means "maybe", and the caller
    /// must confirm against the store.
    pub fn maybe_seen(&self, c: &str) -> bool {
        self.duplicate_filter.read().unwrap().check(c)
    }

    /// Record a nullifier in the filter. Never undone, even if the
    /// enclosing transaction rolls back (see SPEC_FULL.md §9).
    pub fn mark_seen(&self, c: &str) {
        self.duplicate_filter.write().unwrap().set(c);
    }
}

fn derive_privkey(
    secp: &Secp256k1<All>,
    master: &Xpriv,
    version: u64,
) -> Result<SecretKey, WalletError> {
    let version_index: u32 = version
        .try_into()
        .map_err(|_| WalletError::Derivation("pubkey version overflowed u32".into()))?;
    let path = DerivationPath::from(vec![
        ChildNumber::from_hardened_idx(DERIVATION_PURPOSE)
            .map_err(|e| WalletError::Derivation(e.to_string()))?,
        ChildNumber::from_hardened_idx(version_index)
            .map_err(|e| WalletError::Derivation(e.to_string()))?,
    ]);
    let derived = master
        .derive_priv(secp, &path)
        .map_err(|e| WalletError::Derivation(e.to_string()))?;
    Ok(derived.private_key)
}

fn hex_pubkey(secp: &Secp256k1<All>, privkey: &SecretKey) -> String {
    hex::encode(PublicKey::from_secret_key(secp, privkey).serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[tokio::test]
    async fn init_rotates_an_initial_version_when_store_is_empty() {
        let store = SqliteStore::in_memory().unwrap();
        let wallet = Wallet::init(TEST_MNEMONIC, &store, 3600, 1_700_000_000)
            .await
            .unwrap();

        assert_eq!(wallet.active_version().await, 1);
        assert_eq!(wallet.active_pubkey().await.len(), 66);
    }

    #[tokio::test]
    async fn derive_is_pure_and_deterministic() {
        let store = SqliteStore::in_memory().unwrap();
        let wallet = Wallet::init(TEST_MNEMONIC, &store, 3600, 1_700_000_000)
            .await
            .unwrap();

        let a = wallet.derive(1).unwrap();
        let b = wallet.derive(1).unwrap();
        assert_eq!(a.secret_bytes(), b.secret_bytes());

        let c = wallet.derive(2).unwrap();
        assert_ne!(a.secret_bytes(), c.secret_bytes());
    }

    #[tokio::test]
    async fn output_keys_are_deterministic_and_distinct_per_counter() {
        let store = SqliteStore::in_memory().unwrap();
        let wallet = Wallet::init(TEST_MNEMONIC, &store, 3600, 1_700_000_000)
            .await
            .unwrap();

        let (s1, r1) = wallet.derive_output_keys(0).unwrap();
        let (s1_again, r1_again) = wallet.derive_output_keys(0).unwrap();
        assert_eq!(s1.secret_bytes(), s1_again.secret_bytes());
        assert_eq!(r1.secret_bytes(), r1_again.secret_bytes());

        let (s2, r2) = wallet.derive_output_keys(1).unwrap();
        assert_ne!(s1.secret_bytes(), s2.secret_bytes());
        assert_ne!(r1.secret_bytes(), r2.secret_bytes());
    }

    #[tokio::test]
    async fn duplicate_filter_flags_previously_marked_nullifiers() {
        let store = SqliteStore::in_memory().unwrap();
        let wallet = Wallet::init(TEST_MNEMONIC, &store, 3600, 1_700_000_000)
            .await
            .unwrap();

        assert!(!wallet.maybe_seen("02aa"));
        wallet.mark_seen("02aa");
        assert!(wallet.maybe_seen("02aa"));
    }
}
