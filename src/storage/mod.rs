//! Storage Layer Module
//!
//! SQLite-backed persistence for blobs, pubkey versions, and the proof
//! lifecycle tables. `SqliteStore::in_memory()` doubles as the test
//! backend (see its use throughout this module's and the wallet/verifier/
//! scheduler test suites).

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::{StorageError, StorageResult};
