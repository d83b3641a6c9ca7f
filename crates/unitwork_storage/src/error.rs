//! Error types for storage operations.

use crate::record::RecordKey;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An insert targeted a key that already has a row.
    #[error("duplicate key: {key}")]
    DuplicateKey {
        /// The conflicting key.
        key: RecordKey,
    },

    /// An update or delete targeted a key without a row.
    #[error("row not found: {key}")]
    RowNotFound {
        /// The missing key.
        key: RecordKey,
    },

    /// The backend refused the statement.
    #[error("statement rejected: {reason}")]
    Rejected {
        /// Why the statement was rejected.
        reason: String,
    },

    /// Rows could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Another process holds the store.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The storage file is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Creates a rejected-statement error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec(message.to_string())
    }
}
