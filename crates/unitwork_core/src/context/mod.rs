//! The persistence context: identity map plus per-entity tracking state.

mod identity_map;
mod snapshot;

pub(crate) use identity_map::IdentityMap;
pub(crate) use snapshot::{DirtyChecker, Snapshot};

use crate::entity::ManagedInstance;
use crate::error::CoreResult;
use crate::types::EntityStatus;
use std::collections::HashMap;
use std::rc::Rc;
use unitwork_storage::{Fields, RecordKey};

/// Tracking state of one entity.
#[derive(Debug, Clone)]
pub(crate) struct EntityEntry {
    pub(crate) status: EntityStatus,
    pub(crate) snapshot: Snapshot,
}

/// Everything a session knows about the entities it tracks.
///
/// Every key in the identity map has exactly one entry here and vice versa.
#[derive(Default)]
pub(crate) struct PersistenceContext {
    identity_map: IdentityMap,
    entries: HashMap<RecordKey, EntityEntry>,
}

impl PersistenceContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `instance` as managed with the given snapshot.
    ///
    /// Registering the already-tracked instance again leaves its entry
    /// untouched.
    pub(crate) fn manage(
        &mut self,
        key: RecordKey,
        instance: Rc<dyn ManagedInstance>,
        snapshot: Fields,
    ) -> CoreResult<()> {
        if self.identity_map.put(key.clone(), instance)? {
            self.entries.insert(
                key,
                EntityEntry {
                    status: EntityStatus::Managed,
                    snapshot: Snapshot::capture(snapshot),
                },
            );
        }
        Ok(())
    }

    pub(crate) fn instance(&self, key: &RecordKey) -> Option<Rc<dyn ManagedInstance>> {
        self.identity_map.get(key).cloned()
    }

    pub(crate) fn entry(&self, key: &RecordKey) -> Option<&EntityEntry> {
        self.entries.get(key)
    }

    pub(crate) fn status(&self, key: &RecordKey) -> EntityStatus {
        self.entries
            .get(key)
            .map_or(EntityStatus::Transient, |entry| entry.status)
    }

    pub(crate) fn mark_removed(&mut self, key: &RecordKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.status == EntityStatus::Managed => {
                entry.status = EntityStatus::Removed;
                true
            }
            _ => false,
        }
    }

    /// Replaces the snapshot after the entity's state was written.
    pub(crate) fn refresh_snapshot(&mut self, key: &RecordKey, fields: Fields) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.snapshot = Snapshot::capture(fields);
        }
    }

    /// Stops tracking `key` entirely.
    pub(crate) fn evict(&mut self, key: &RecordKey) -> Option<Rc<dyn ManagedInstance>> {
        self.entries.remove(key);
        self.identity_map.remove(key)
    }

    /// Keys of managed (not removed) entities in registration order.
    pub(crate) fn managed_keys(&self) -> Vec<RecordKey> {
        self.identity_map
            .keys()
            .filter(|key| self.status(key) == EntityStatus::Managed)
            .cloned()
            .collect()
    }

    pub(crate) fn contains(&self, key: &RecordKey) -> bool {
        self.identity_map.contains(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.identity_map.len()
    }

    pub(crate) fn clear(&mut self) {
        self.identity_map.clear();
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityRef};
    use crate::error::CoreError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Member {
        id: i64,
        age: i32,
    }

    impl Entity for Member {
        const ENTITY_TYPE: &'static str = "members";

        fn id(&self) -> i64 {
            self.id
        }
    }

    fn track(context: &mut PersistenceContext, id: i64) -> EntityRef<Member> {
        let handle = EntityRef::new(Member { id, age: 30 });
        let fields = handle.try_fields().unwrap();
        context.manage(handle.key(), handle.erase(), fields).unwrap();
        handle
    }

    #[test]
    fn managed_entity_has_entry() {
        let mut context = PersistenceContext::new();
        let alice = track(&mut context, 1);

        assert!(context.contains(&alice.key()));
        assert_eq!(context.status(&alice.key()), EntityStatus::Managed);
        assert_eq!(context.entry(&alice.key()).unwrap().snapshot.fields().len(), 2);
    }

    #[test]
    fn untracked_key_is_transient() {
        let context = PersistenceContext::new();
        assert_eq!(
            context.status(&RecordKey::new("members", 9)),
            EntityStatus::Transient
        );
    }

    #[test]
    fn removed_entities_leave_managed_keys() {
        let mut context = PersistenceContext::new();
        track(&mut context, 1);
        let bob = track(&mut context, 2);
        track(&mut context, 3);

        assert!(context.mark_removed(&bob.key()));
        assert!(!context.mark_removed(&bob.key()));
        assert_eq!(context.status(&bob.key()), EntityStatus::Removed);

        let ids: Vec<i64> = context.managed_keys().iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(context.len(), 3);
    }

    #[test]
    fn evict_forgets_entry_and_instance() {
        let mut context = PersistenceContext::new();
        let alice = track(&mut context, 1);
        assert!(context.evict(&alice.key()).is_some());
        assert!(context.entry(&alice.key()).is_none());
        assert!(!context.contains(&alice.key()));
    }

    #[test]
    fn conflicting_instance_leaves_entry_alone() {
        let mut context = PersistenceContext::new();
        let alice = track(&mut context, 1);
        let impostor = EntityRef::new(Member { id: 1, age: 99 });

        let err = context
            .manage(impostor.key(), impostor.erase(), Fields::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::IdentityConflict { .. }));
        assert_eq!(context.entry(&alice.key()).unwrap().snapshot.fields().len(), 2);
    }
}
