//! Blossom-Cashu — A Paid, Content-Addressed Blob Server
//!
//! Serves immutable, SHA-256-addressed blobs over a Blossom-compatible HTTP
//! API, charging per upload and download in Cashu ecash. Payment is a
//! single HTTP round trip: a client attaches an `x-cashu` token, the server
//! verifies it against its own rotating P2PK locking key and a trusted
//! mint, then serves the request. A background scheduler periodically
//! rotates that locking key, swaps the redeemed tokens into fresh
//! operator-spendable ecash at the mint, and flushes fully-swapped holdings
//! to a local token log (optionally DM'd to the owner over Nostr).

pub mod api;
pub mod blobstore;
pub mod cashu;
pub mod common;
pub mod config;
pub mod hashkit;
pub mod logging;
pub mod mint_client;
pub mod nostr_dm;
pub mod pricing;
pub mod scheduler;
pub mod storage;
pub mod types;
pub mod verifier;
pub mod wallet;

pub use common::{BlossomError, Result};
