//! Storage Error Types
//!
//! Shared across the SQLite-backed store. There is a single production
//! backend (`SqliteStore`); its `in_memory()` constructor doubles as the
//! test backend, so there is no separate storage trait to implement here —
//! just the error vocabulary every store method returns.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("connection error: {0}")]
    Connection(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
