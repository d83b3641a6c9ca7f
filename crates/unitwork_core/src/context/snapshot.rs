//! Load-time snapshots and the dirty checker.

use super::EntityEntry;
use crate::error::{CoreError, CoreResult};
use crate::types::EntityStatus;
use unitwork_storage::{Fields, RecordKey};

/// Copy of an entity's fields as of its last load or flush.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Snapshot {
    fields: Fields,
}

impl Snapshot {
    pub(crate) fn capture(fields: Fields) -> Self {
        Self { fields }
    }

    pub(crate) fn fields(&self) -> &Fields {
        &self.fields
    }
}

/// Compares managed entities against their snapshots.
pub(crate) struct DirtyChecker;

impl DirtyChecker {
    /// Names of the fields whose value differs from the snapshot, in field
    /// name order. A field present on one side only counts as changed.
    pub(crate) fn diff(snapshot: &Snapshot, current: &Fields) -> Vec<String> {
        let mut changed: Vec<String> = snapshot
            .fields
            .iter()
            .filter(|(name, value)| current.get(*name) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            current
                .keys()
                .filter(|name| !snapshot.fields.contains_key(*name))
                .cloned(),
        );
        changed.sort();
        changed
    }

    pub(crate) fn is_dirty(snapshot: &Snapshot, current: &Fields) -> bool {
        snapshot.fields != *current
    }

    /// Diffs a tracked entity, refusing removed ones.
    pub(crate) fn check(
        key: &RecordKey,
        entry: &EntityEntry,
        current: &Fields,
    ) -> CoreResult<Vec<String>> {
        if entry.status == EntityStatus::Removed {
            return Err(CoreError::StaleDirtyCheck { key: key.clone() });
        }
        Ok(Self::diff(&entry.snapshot, current))
    }
}
