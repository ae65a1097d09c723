//! Error types for the satchel-core crate

use thiserror::Error;

/// Result type alias using `TransferError`
pub type Result<T> = std::result::Result<T, TransferError>;

/// Errors that can occur during transfer operations
#[derive(Error, Debug)]
pub enum TransferError {
    /// File identifier or access code already in use by a live record
    #[error("identifier or access code already in use")]
    Conflict,

    /// Unknown or expired token
    #[error("file not found or expired")]
    NotFound,

    /// Token previously or concurrently consumed
    #[error("file already delivered")]
    AlreadyDelivered,

    /// Crypto error
    #[error("crypto error: {0}")]
    Crypto(#[from] satchel_crypto::CryptoError),

    /// Artifact read/write/delete failure
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}
