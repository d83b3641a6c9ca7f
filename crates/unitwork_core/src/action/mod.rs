//! Pending write actions.

mod queue;

pub use queue::ActionQueue;

use std::fmt;
use unitwork_storage::{Fields, RecordKey, WriteCommand};

/// Kind of a pending write.
///
/// The declaration order is the drain order: every insert is executed
/// before any update, and every update before any delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    /// Insert a persisted entity.
    Insert,
    /// Write the changed state of a managed entity.
    Update,
    /// Delete a removed entity.
    Delete,
}

impl ActionKind {
    /// All kinds in drain order.
    pub const DRAIN_ORDER: [ActionKind; 3] = [Self::Insert, Self::Update, Self::Delete];

    /// Returns the lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One deferred write against one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityAction {
    kind: ActionKind,
    key: RecordKey,
    payload: Fields,
    changed: Vec<String>,
    seq: u64,
}

impl EntityAction {
    pub(crate) fn insert(key: RecordKey, fields: Fields) -> Self {
        Self::with(ActionKind::Insert, key, fields, Vec::new())
    }

    pub(crate) fn update(key: RecordKey, fields: Fields, changed: Vec<String>) -> Self {
        Self::with(ActionKind::Update, key, fields, changed)
    }

    pub(crate) fn delete(key: RecordKey) -> Self {
        Self::with(ActionKind::Delete, key, Fields::new(), Vec::new())
    }

    fn with(kind: ActionKind, key: RecordKey, payload: Fields, changed: Vec<String>) -> Self {
        Self {
            kind,
            key,
            payload,
            changed,
            seq: 0,
        }
    }

    /// Returns the action kind.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Returns the target key.
    #[must_use]
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Returns the fields written by an insert or update. Empty for deletes.
    #[must_use]
    pub fn payload(&self) -> &Fields {
        &self.payload
    }

    /// Returns the fields an update changed, in field name order.
    #[must_use]
    pub fn changed_fields(&self) -> &[String] {
        &self.changed
    }

    /// Returns the enqueue sequence number.
    ///
    /// Sequence numbers grow across all kinds and break ties within a kind.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub(crate) fn to_command(&self) -> WriteCommand {
        match self.kind {
            ActionKind::Insert => WriteCommand::Insert {
                key: self.key.clone(),
                fields: self.payload.clone(),
            },
            ActionKind::Update => WriteCommand::Update {
                key: self.key.clone(),
                fields: self.payload.clone(),
            },
            ActionKind::Delete => WriteCommand::Delete {
                key: self.key.clone(),
            },
        }
    }
}

impl fmt::Display for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitwork_storage::Value;

    #[test]
    fn kinds_order_by_priority() {
        assert!(ActionKind::Insert < ActionKind::Update);
        assert!(ActionKind::Update < ActionKind::Delete);

        let mut sorted = ActionKind::DRAIN_ORDER;
        sorted.sort();
        assert_eq!(sorted, ActionKind::DRAIN_ORDER);
    }

    #[test]
    fn action_display_matches_statement() {
        let action = EntityAction::delete(RecordKey::new("members", 2));
        assert_eq!(action.to_string(), "delete members#2");
        assert_eq!(action.to_command().to_string(), "delete members#2");
    }

    #[test]
    fn update_carries_payload_and_changes() {
        let mut fields = Fields::new();
        fields.insert("age".into(), Value::from(40));
        let action = EntityAction::update(
            RecordKey::new("members", 1),
            fields.clone(),
            vec!["age".into()],
        );

        assert_eq!(action.changed_fields(), ["age".to_string()]);
        assert_eq!(
            action.to_command(),
            WriteCommand::Update {
                key: RecordKey::new("members", 1),
                fields,
            }
        );
    }
}
