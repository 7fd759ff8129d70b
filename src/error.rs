//! Error types for the crate

use crate::query::error::QueryError;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Query error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Key or block encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a sample store
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Read was rejected by the store
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Invalid key range
    #[error("Invalid key range: {0}")]
    InvalidRange(String),
}

/// Errors raised while encoding or decoding storage keys and block values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Buffer ended before a complete value could be read
    #[error("Buffer too short for {what}: need {needed} bytes, have {available}")]
    Truncated {
        /// What was being decoded
        what: &'static str,
        /// Bytes required
        needed: usize,
        /// Bytes remaining
        available: usize,
    },

    /// Key does not follow the data key layout
    #[error("Invalid data key: {0}")]
    InvalidKey(String),

    /// Block value is malformed
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum stored with the value
        expected: u64,
        /// The checksum computed from the payload
        actual: u64,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
