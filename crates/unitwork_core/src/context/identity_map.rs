//! Identity map: at most one in-memory instance per key per session.

use crate::entity::{same_instance, ManagedInstance};
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::rc::Rc;
use unitwork_storage::RecordKey;

/// Maps record keys to the single instance a session hands out for them.
///
/// Keys are remembered in registration order so that flush-time dirty
/// checking visits entities deterministically.
#[derive(Default)]
pub(crate) struct IdentityMap {
    instances: HashMap<RecordKey, Rc<dyn ManagedInstance>>,
    order: Vec<RecordKey>,
}

impl IdentityMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the instance registered under `key`.
    pub(crate) fn get(&self, key: &RecordKey) -> Option<&Rc<dyn ManagedInstance>> {
        self.instances.get(key)
    }

    /// Registers `instance` under `key`.
    ///
    /// Returns `Ok(false)` if the same instance is already registered, and
    /// [`CoreError::IdentityConflict`] if a different one is.
    pub(crate) fn put(
        &mut self,
        key: RecordKey,
        instance: Rc<dyn ManagedInstance>,
    ) -> CoreResult<bool> {
        if let Some(existing) = self.instances.get(&key) {
            if same_instance(existing, &instance) {
                return Ok(false);
            }
            return Err(CoreError::IdentityConflict { key });
        }
        self.order.push(key.clone());
        self.instances.insert(key, instance);
        Ok(true)
    }

    pub(crate) fn remove(&mut self, key: &RecordKey) -> Option<Rc<dyn ManagedInstance>> {
        let removed = self.instances.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    pub(crate) fn contains(&self, key: &RecordKey) -> bool {
        self.instances.contains_key(key)
    }

    /// Keys in registration order.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.order.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }

    pub(crate) fn clear(&mut self) {
        self.instances.clear();
        self.order.clear();
    }
}
