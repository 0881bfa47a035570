//! Root Error Type
//!
//! Every module's error enum eventually folds into [`BlossomError`] at the
//! API boundary, where `error_code()` becomes the JSON error body's `code`
//! field and `is_retryable()` decides whether a background job re-attempts
//! the operation instead of giving up.

use thiserror::Error;

use crate::blobstore::BlobStoreError;
use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::mint_client::MintClientError;
use crate::scheduler::SchedulerError;
use crate::storage::StorageError;
use crate::verifier::VerifyError;
use crate::wallet::WalletError;

#[derive(Debug, Error)]
pub enum BlossomError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("mint error: {0}")]
    Mint(#[from] MintClientError),

    #[error("proof verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),

    #[error("blob not found")]
    BlobNotFound,

    #[error("blob already exists")]
    BlobAlreadyExists,

    #[error("missing x-cashu payment header")]
    MissingPayment,

    #[error("malformed x-cashu payment header: {0}")]
    MalformedPayment(String),

    #[error("payment amount {paid} is below the required {required}")]
    InsufficientPayment { required: u64, paid: u64 },

    #[error("request body too large")]
    BodyTooLarge,

    #[error("invalid content-length header")]
    InvalidContentLength,

    #[error("cashu token decode failed: {0}")]
    TokenDecode(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl BlossomError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a background job should retry this error rather than give up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BlossomError::Mint(_)
                | BlossomError::Reqwest(_)
                | BlossomError::Io(_)
                | BlossomError::Scheduler(SchedulerError::Mint(_))
        )
    }

    /// Stable machine-readable code surfaced in API error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            BlossomError::Config(_) => "CONFIG_ERROR",
            BlossomError::Logging(_) => "LOGGING_ERROR",
            BlossomError::Storage(_) => "STORAGE_ERROR",
            BlossomError::Wallet(_) => "WALLET_ERROR",
            BlossomError::Mint(_) => "MINT_ERROR",
            BlossomError::Verify(_) => "PAYMENT_VERIFICATION_FAILED",
            BlossomError::Scheduler(_) => "SCHEDULER_ERROR",
            BlossomError::BlobStore(_) => "BLOB_STORE_ERROR",
            BlossomError::BlobNotFound => "BLOB_NOT_FOUND",
            BlossomError::BlobAlreadyExists => "BLOB_ALREADY_EXISTS",
            BlossomError::MissingPayment => "MISSING_PAYMENT",
            BlossomError::MalformedPayment(_) => "MALFORMED_PAYMENT",
            BlossomError::InsufficientPayment { .. } => "INSUFFICIENT_PAYMENT",
            BlossomError::BodyTooLarge => "BODY_TOO_LARGE",
            BlossomError::InvalidContentLength => "INVALID_CONTENT_LENGTH",
            BlossomError::TokenDecode(_) => "TOKEN_DECODE_ERROR",
            BlossomError::Validation(_) => "VALIDATION_ERROR",
            BlossomError::Internal(_) => "INTERNAL_ERROR",
            BlossomError::Io(_) => "IO_ERROR",
            BlossomError::Sqlite(_) => "DATABASE_ERROR",
            BlossomError::Reqwest(_) => "HTTP_CLIENT_ERROR",
        }
    }

    /// HTTP status this error maps to at the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            BlossomError::BlobNotFound => 404,
            BlossomError::BlobAlreadyExists => 409,
            BlossomError::MissingPayment => 402,
            BlossomError::MalformedPayment(_) => 400,
            BlossomError::InsufficientPayment { .. } => 402,
            BlossomError::Verify(_) => 402,
            BlossomError::BodyTooLarge => 413,
            BlossomError::InvalidContentLength | BlossomError::Validation(_) => 400,
            BlossomError::TokenDecode(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, BlossomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = BlossomError::validation("bad sha256");
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn insufficient_payment_maps_to_402() {
        let err = BlossomError::InsufficientPayment {
            required: 10,
            paid: 5,
        };
        assert_eq!(err.status_code(), 402);
        assert_eq!(err.error_code(), "INSUFFICIENT_PAYMENT");
    }
}
