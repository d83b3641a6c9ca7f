//! Error types for UnitWork core.

use crate::types::SessionId;
use thiserror::Error;
use unitwork_storage::{RecordKey, StorageError};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in UnitWork core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error outside of a drain or query
    /// (begin, commit, rollback).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A drained action failed against the backend.
    ///
    /// The queue is left partially drained and the session is poisoned;
    /// the only valid continuation is rollback.
    #[error("write failed for {action}: {source}")]
    StorageWrite {
        /// The action that failed, e.g. `update members#1`.
        action: String,
        /// The backend error.
        source: StorageError,
    },

    /// A read failed against the backend. No session state was changed.
    #[error("read failed for {query}: {source}")]
    StorageRead {
        /// The query that failed.
        query: String,
        /// The backend error.
        source: StorageError,
    },

    /// A key is already bound to a different instance in this session.
    #[error("identity conflict: {key} is already managed as a different instance")]
    IdentityConflict {
        /// The contested key.
        key: RecordKey,
    },

    /// A removed entity was handed to the dirty checker.
    #[error("dirty check requested for removed entity {key}")]
    StaleDirtyCheck {
        /// The removed entity.
        key: RecordKey,
    },

    /// An entity handle is mutably borrowed while the session needs it.
    #[error("entity of type {entity_type} is mutably borrowed")]
    EntityBorrowed {
        /// Entity type of the borrowed handle.
        entity_type: String,
    },

    /// The handle is not the instance managed by this session.
    #[error("entity {key} is not managed by this session")]
    NotManaged {
        /// Key of the handle.
        key: RecordKey,
    },

    /// The requested lifecycle transition is not allowed.
    #[error("invalid state for {key}: {message}")]
    InvalidState {
        /// Entity key.
        key: RecordKey,
        /// Why the transition was refused.
        message: String,
    },

    /// Entity not found.
    #[error("entity not found: {key}")]
    EntityNotFound {
        /// The key that was looked up.
        key: RecordKey,
    },

    /// An entity could not be converted to or from fields.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// A previous failure left the session unusable.
    #[error("{session} must be rolled back after a failed flush or identity conflict")]
    SessionPoisoned {
        /// The poisoned session.
        session: SessionId,
    },

    /// The session has already been committed or rolled back.
    #[error("session is closed")]
    SessionClosed,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a write failure for the given action.
    pub fn storage_write(action: impl ToString, source: StorageError) -> Self {
        Self::StorageWrite {
            action: action.to_string(),
            source,
        }
    }

    /// Creates a read failure for the given query.
    pub fn storage_read(query: impl ToString, source: StorageError) -> Self {
        Self::StorageRead {
            query: query.to_string(),
            source,
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(key: RecordKey, message: impl Into<String>) -> Self {
        Self::InvalidState {
            key,
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error leaves the session poisoned.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StorageWrite { .. } | Self::IdentityConflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_failures_are_fatal() {
        let err = CoreError::storage_write("update members#1", StorageError::rejected("nope"));
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "write failed for update members#1: statement rejected: nope"
        );
    }

    #[test]
    fn read_failures_are_not_fatal() {
        let err = CoreError::storage_read("select members", StorageError::rejected("nope"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn identity_conflict_is_fatal() {
        let err = CoreError::IdentityConflict {
            key: RecordKey::new("members", 1),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("members#1"));
    }
}
