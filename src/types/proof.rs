//! Proof and Key-Rotation Record Types
//!
//! These mirror the tables described by the data model: pubkey versions
//! (the server's rotating locking key), locked proofs (tokens accepted but
//! not yet swapped), swapped proofs (owner-spendable, awaiting local
//! bookkeeping), and the per-keyset deterministic-derivation counter.

/// One version of the server's locking pubkey.
///
/// Invariant: exactly one row has `active = true` at any time. Versions are
/// strictly monotonically increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubkeyVersion {
    pub version: u64,
    pub expiration: i64,
    pub active: bool,
}

/// A proof accepted from a client and not yet swapped through the mint.
///
/// `secret` must deserialize to a P2PK spending condition; `c` is the
/// nullifier and must be unique across both this table and `SwappedProof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedProof {
    pub amount: u64,
    pub keyset_id: String,
    pub secret: String,
    pub c: String,
    pub witness: Option<String>,
    pub redeemed: bool,
    pub created_at: i64,
    pub pubkey_version: u64,
    pub mint: String,
}

/// A proof produced by swapping locked proofs through the mint. Spendable
/// by the operator once logged and marked `spent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwappedProof {
    pub amount: u64,
    pub keyset_id: String,
    pub secret: String,
    pub c: String,
    pub witness: Option<String>,
    pub spent: bool,
    pub created_at: i64,
    pub mint: String,
}

/// Deterministic-derivation counter for a single mint keyset. Advances only
/// when a swap against that keyset commits, and advances by exactly the
/// number of outputs produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeysetCounter {
    pub counter: u64,
}

/// A mint this server will accept tokens from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedMint {
    pub url: String,
    pub created_at: i64,
}
