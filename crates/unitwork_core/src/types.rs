//! Core type definitions for UnitWork.

use std::fmt;

/// Unique identifier for a session.
///
/// Session IDs are assigned by the owning unit, increase monotonically and
/// are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Creates a new session ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Lifecycle state of an entity with respect to one session.
///
/// ```text
/// transient -> (load | persist) -> managed -> (remove) -> removed -> (drain) -> absent
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    /// Not tracked by the session.
    Transient,
    /// Tracked in the identity map and dirty checked at flush.
    Managed,
    /// Still tracked, only to emit its delete. Never dirty checked.
    Removed,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Accepting operations.
    Active,
    /// A flush failed or an identity conflict occurred; only rollback is
    /// allowed.
    Poisoned,
    /// Committed and released.
    Committed,
    /// Rolled back and released.
    RolledBack,
}
