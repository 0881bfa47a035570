//! Shared Types Module
//!
//! Data types shared across the blossom-cashu backend: the persisted
//! domain records (blobs, pubkey versions, proofs) and the wire types
//! exchanged with clients (blob descriptors, payment quotes).

pub mod blob;
pub mod proof;
pub mod quote;

pub use blob::{Blob, BlobDescriptor};
pub use proof::{KeysetCounter, LockedProof, PubkeyVersion, SwappedProof, TrustedMint};
pub use quote::{PaymentQuote, Unit};
