//! Priority-ordered write-behind queue.

use super::{ActionKind, EntityAction};
use crate::error::{CoreError, CoreResult};
use std::collections::VecDeque;
use tracing::trace;
use unitwork_storage::{RecordKey, StorageTransaction};

/// Pending writes of one session, grouped by kind.
///
/// Draining executes every insert, then every update, then every delete.
/// Within a kind, actions run in enqueue order. Enqueue order across kinds
/// never matters.
#[derive(Debug, Default)]
pub struct ActionQueue {
    inserts: VecDeque<EntityAction>,
    updates: VecDeque<EntityAction>,
    deletes: VecDeque<EntityAction>,
    next_seq: u64,
}

impl ActionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action to the group of its kind.
    pub fn enqueue(&mut self, mut action: EntityAction) {
        self.next_seq += 1;
        action.set_seq(self.next_seq);
        trace!(action = %action, seq = action.seq(), "enqueued");
        self.group_mut(action.kind()).push_back(action);
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of pending actions of one kind.
    #[must_use]
    pub fn count(&self, kind: ActionKind) -> usize {
        self.group(kind).len()
    }

    /// Iterates pending actions in drain order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityAction> {
        self.inserts
            .iter()
            .chain(self.updates.iter())
            .chain(self.deletes.iter())
    }

    /// Returns true if an action of `kind` is pending for `key`.
    #[must_use]
    pub fn has_pending(&self, kind: ActionKind, key: &RecordKey) -> bool {
        self.group(kind).iter().any(|action| action.key() == key)
    }

    /// Drops every pending action for `key`, returning how many were dropped.
    pub fn discard_for(&mut self, key: &RecordKey) -> usize {
        let before = self.len();
        for kind in ActionKind::DRAIN_ORDER {
            self.group_mut(kind).retain(|action| action.key() != key);
        }
        before - self.len()
    }

    /// Drops every pending action.
    pub fn clear(&mut self) {
        self.inserts.clear();
        self.updates.clear();
        self.deletes.clear();
    }

    /// Executes pending actions against `storage` in drain order.
    ///
    /// Each action leaves the queue once the backend accepted it and is
    /// appended to `executed`. On the first failure the failing action and
    /// everything after it stay queued and the error is returned.
    pub(crate) fn drain(
        &mut self,
        storage: &mut dyn StorageTransaction,
        executed: &mut Vec<EntityAction>,
    ) -> CoreResult<()> {
        for kind in ActionKind::DRAIN_ORDER {
            let group = self.group_mut(kind);
            while let Some(action) = group.pop_front() {
                match storage.execute_write(&action.to_command()) {
                    Ok(()) => {
                        trace!(action = %action, "executed");
                        executed.push(action);
                    }
                    Err(source) => {
                        let err = CoreError::storage_write(&action, source);
                        group.push_front(action);
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    fn group(&self, kind: ActionKind) -> &VecDeque<EntityAction> {
        match kind {
            ActionKind::Insert => &self.inserts,
            ActionKind::Update => &self.updates,
            ActionKind::Delete => &self.deletes,
        }
    }

    fn group_mut(&mut self, kind: ActionKind) -> &mut VecDeque<EntityAction> {
        match kind {
            ActionKind::Insert => &mut self.inserts,
            ActionKind::Update => &mut self.updates,
            ActionKind::Delete => &mut self.deletes,
        }
    }
}
