//! Sessions: the persistence context of one storage transaction.

use crate::action::{ActionKind, ActionQueue, EntityAction};
use crate::context::PersistenceContext;
use crate::entity::{Entity, EntityRef};
use crate::error::{CoreError, CoreResult};
use crate::flush::{FlushCoordinator, FlushReport, FlushTrigger};
use crate::query::Query;
use crate::stats::UnitStats;
use crate::types::{EntityStatus, SessionId, SessionState};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use unitwork_storage::{Filter, RecordKey, StorageTransaction};

/// A unit of work bound to one storage transaction.
///
/// A session owns an identity map, a snapshot per tracked entity and a
/// queue of pending writes. Writes reach storage only when the session
/// flushes: explicitly, before a direct query (in auto flush mode) and at
/// commit. Until commit, everything it wrote can still be rolled back.
///
/// A session that is dropped while active rolls back.
///
/// # Poisoning
///
/// A failed flush or an identity conflict poisons the session. Every
/// operation then fails with [`CoreError::SessionPoisoned`] except
/// [`Session::rollback`].
pub struct Session {
    id: SessionId,
    state: SessionState,
    storage: Option<Box<dyn StorageTransaction>>,
    context: PersistenceContext,
    actions: ActionQueue,
    coordinator: FlushCoordinator,
    stats: Arc<UnitStats>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        storage: Box<dyn StorageTransaction>,
        coordinator: FlushCoordinator,
        stats: Arc<UnitStats>,
    ) -> Self {
        Self {
            id,
            state: SessionState::Active,
            storage: Some(storage),
            context: PersistenceContext::new(),
            actions: ActionQueue::new(),
            coordinator,
            stats,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true if the session accepts operations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Loads an entity by identifier.
    ///
    /// Answered from the identity map when the key is tracked, without
    /// touching storage. Otherwise the row is read and the new instance
    /// becomes managed. Returns `None` for a missing row and for an entity
    /// removed in this session.
    pub fn find<T: Entity>(&mut self, id: i64) -> CoreResult<Option<EntityRef<T>>> {
        self.ensure_active()?;
        let key = RecordKey::new(T::ENTITY_TYPE, id);

        if let Some(instance) = self.context.instance(&key) {
            if self.context.status(&key) == EntityStatus::Removed {
                return Ok(None);
            }
            let handle = EntityRef::<T>::restore(&instance).ok_or_else(|| {
                CoreError::invalid_operation(format!("{key} is managed as a different entity type"))
            })?;
            self.stats.record_identity_hit();
            trace!(session = %self.id, key = %key, "identity map hit");
            return Ok(Some(handle));
        }

        let mut found = self.read::<T>(&Query::by_id(id))?;
        Ok(found.pop())
    }

    /// Runs a direct query.
    ///
    /// In auto flush mode pending changes are flushed first so the query
    /// observes them. Rows whose key is already tracked resolve to the
    /// tracked instance.
    pub fn query<T: Entity>(&mut self, query: &Query) -> CoreResult<Vec<EntityRef<T>>> {
        self.ensure_active()?;
        if self.coordinator.flushes_before_query() {
            self.flush_with(FlushTrigger::BeforeQuery)?;
        }
        let found = self.read::<T>(query)?;
        self.stats.record_query();
        Ok(found)
    }

    /// Makes a transient entity managed and schedules its insert.
    ///
    /// Persisting an instance that is already managed is a no-op.
    pub fn persist<T: Entity>(&mut self, entity: &EntityRef<T>) -> CoreResult<()> {
        self.ensure_active()?;
        let key = entity.try_key()?;

        if let Some(instance) = self.context.instance(&key) {
            if !entity.is_instance(&instance) {
                return self.poison(CoreError::IdentityConflict { key });
            }
            return match self.context.status(&key) {
                EntityStatus::Removed => Err(CoreError::invalid_state(
                    key,
                    "a removed entity cannot be persisted again before flush",
                )),
                _ => Ok(()),
            };
        }

        let fields = entity.try_fields()?;
        self.context
            .manage(key.clone(), entity.erase(), fields.clone())?;
        debug!(session = %self.id, key = %key, "persist");
        self.actions.enqueue(EntityAction::insert(key, fields));
        Ok(())
    }

    /// Marks a managed entity removed and schedules its delete.
    ///
    /// Removing an entity whose insert has not been flushed yet cancels the
    /// insert instead and forgets the entity. Removing an already removed
    /// entity is a no-op.
    pub fn remove<T: Entity>(&mut self, entity: &EntityRef<T>) -> CoreResult<()> {
        self.ensure_active()?;
        let key = self.managed_key(entity)?;

        match self.context.status(&key) {
            EntityStatus::Removed => return Ok(()),
            EntityStatus::Transient => return Err(CoreError::NotManaged { key }),
            EntityStatus::Managed => {}
        }

        if self.actions.has_pending(ActionKind::Insert, &key) {
            self.actions.discard_for(&key);
            self.context.evict(&key);
            debug!(session = %self.id, key = %key, "remove cancelled pending insert");
            return Ok(());
        }

        self.context.mark_removed(&key);
        debug!(session = %self.id, key = %key, "remove");
        self.actions.enqueue(EntityAction::delete(key));
        Ok(())
    }

    /// Copies the state of a detached instance onto the managed one.
    ///
    /// Returns the managed instance, loading it first if needed. If no row
    /// exists, a copy of the detached state is persisted and returned. The
    /// detached instance itself never becomes managed.
    pub fn merge<T: Entity>(&mut self, detached: &EntityRef<T>) -> CoreResult<EntityRef<T>> {
        self.ensure_active()?;
        let key = detached.try_key()?;

        if self.is_removed(&key) {
            return Err(CoreError::invalid_state(key, "cannot merge into a removed entity"));
        }
        if let Some(instance) = self.context.instance(&key) {
            if detached.is_instance(&instance) {
                return Ok(detached.clone());
            }
        }

        let state = detached.try_get()?;
        match self.find::<T>(key.id)? {
            Some(managed) => {
                managed.replace(state)?;
                debug!(session = %self.id, key = %key, "merged detached state");
                Ok(managed)
            }
            None => {
                let fresh = EntityRef::new(state);
                self.persist(&fresh)?;
                Ok(fresh)
            }
        }
    }

    /// Returns true if this exact instance is managed (and not removed).
    #[must_use]
    pub fn contains<T: Entity>(&self, entity: &EntityRef<T>) -> bool {
        self.status(entity) == EntityStatus::Managed
    }

    /// Returns the lifecycle status of this instance in this session.
    ///
    /// An instance equal to, but not identical with, a tracked one is
    /// transient.
    #[must_use]
    pub fn status<T: Entity>(&self, entity: &EntityRef<T>) -> EntityStatus {
        let Ok(key) = entity.try_key() else {
            return EntityStatus::Transient;
        };
        match self.context.instance(&key) {
            Some(instance) if entity.is_instance(&instance) => self.context.status(&key),
            _ => EntityStatus::Transient,
        }
    }

    /// Stops tracking an instance and drops its pending writes.
    ///
    /// Returns false if the instance was not tracked.
    pub fn detach<T: Entity>(&mut self, entity: &EntityRef<T>) -> CoreResult<bool> {
        self.ensure_active()?;
        if self.status(entity) == EntityStatus::Transient {
            return Ok(false);
        }
        let key = entity.try_key()?;
        self.actions.discard_for(&key);
        self.context.evict(&key);
        trace!(session = %self.id, key = %key, "detach");
        Ok(true)
    }

    /// Detaches every tracked instance and drops all pending writes.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        self.context.clear();
        self.actions.clear();
        trace!(session = %self.id, "clear");
        Ok(())
    }

    /// Writes every pending change to storage.
    ///
    /// The writes stay provisional until commit. Flushing with nothing
    /// pending performs no storage call.
    pub fn flush(&mut self) -> CoreResult<FlushReport> {
        self.ensure_active()?;
        self.flush_with(FlushTrigger::Explicit)
    }

    /// Flushes and commits the storage transaction.
    ///
    /// If the flush or the commit fails, the session is rolled back and the
    /// error is returned.
    pub fn commit(mut self) -> CoreResult<()> {
        if let Err(e) = self.ensure_active() {
            let _ = self.release();
            return Err(e);
        }
        if let Err(e) = self.flush_with(FlushTrigger::Commit) {
            let _ = self.release();
            return Err(e);
        }

        let Some(storage) = self.storage.take() else {
            return Err(CoreError::SessionClosed);
        };
        self.context.clear();
        self.actions.clear();
        match storage.commit() {
            Ok(()) => {
                self.state = SessionState::Committed;
                self.stats.record_commit();
                debug!(session = %self.id, "committed");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::RolledBack;
                self.stats.record_rollback();
                warn!(session = %self.id, error = %e, "commit failed");
                Err(e.into())
            }
        }
    }

    /// Discards every pending change and rolls back the storage
    /// transaction, including writes already flushed.
    ///
    /// Allowed in any state, including poisoned.
    pub fn rollback(mut self) -> CoreResult<()> {
        self.release()
    }

    /// Pending actions in drain order.
    #[must_use]
    pub fn pending_actions(&self) -> Vec<(ActionKind, RecordKey)> {
        self.actions
            .iter()
            .map(|action| (action.kind(), action.key().clone()))
            .collect()
    }

    /// Number of tracked entities, removed ones included.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.context.len()
    }

    /// Returns true if `key` is tracked.
    #[must_use]
    pub fn is_tracked(&self, key: &RecordKey) -> bool {
        self.context.contains(key)
    }

    /// Returns true if `key` is tracked and marked removed.
    pub(crate) fn is_removed(&self, key: &RecordKey) -> bool {
        self.context.status(key) == EntityStatus::Removed
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Poisoned => Err(CoreError::SessionPoisoned { session: self.id }),
            SessionState::Committed | SessionState::RolledBack => Err(CoreError::SessionClosed),
        }
    }

    fn flush_with(&mut self, trigger: FlushTrigger) -> CoreResult<FlushReport> {
        let storage = self
            .storage
            .as_deref_mut()
            .ok_or(CoreError::SessionClosed)?;
        match self.coordinator.flush(
            &mut self.context,
            &mut self.actions,
            storage,
            &self.stats,
            trigger,
        ) {
            Ok(report) => Ok(report),
            Err(e) => self.poison(e),
        }
    }

    fn read<T: Entity>(&mut self, query: &Query) -> CoreResult<Vec<EntityRef<T>>> {
        let read = query.to_read(T::ENTITY_TYPE);
        let storage = self
            .storage
            .as_deref_mut()
            .ok_or(CoreError::SessionClosed)?;
        let rows = storage
            .execute_read(&read)
            .map_err(|source| CoreError::storage_read(&read, source))?;
        if self.coordinator.shows_statements() {
            info!(session = %self.id, statement = %read, rows = rows.len(), "executed");
        } else {
            trace!(session = %self.id, query = %read, rows = rows.len(), "read");
        }

        if matches!(read.filter, Filter::Id(_)) && rows.len() > 1 {
            return Err(CoreError::invalid_operation(format!(
                "{read} returned {} rows",
                rows.len()
            )));
        }
        match self
            .coordinator
            .merge_rows(&mut self.context, rows, &self.stats)
        {
            Ok(merged) => Ok(merged),
            Err(e) => self.poison(e),
        }
    }

    /// Resolves the key of `entity`, requiring it to be the tracked instance.
    fn managed_key<T: Entity>(&self, entity: &EntityRef<T>) -> CoreResult<RecordKey> {
        let key = entity.try_key()?;
        match self.context.instance(&key) {
            Some(instance) if entity.is_instance(&instance) => Ok(key),
            _ => Err(CoreError::NotManaged { key }),
        }
    }

    /// Poisons the session if `error` is fatal and returns it.
    fn poison<R>(&mut self, error: CoreError) -> CoreResult<R> {
        if error.is_fatal() && self.state == SessionState::Active {
            self.state = SessionState::Poisoned;
            warn!(session = %self.id, error = %error, "session poisoned");
        }
        Err(error)
    }

    fn release(&mut self) -> CoreResult<()> {
        self.context.clear();
        self.actions.clear();
        let Some(storage) = self.storage.take() else {
            return Ok(());
        };
        self.state = SessionState::RolledBack;
        self.stats.record_rollback();
        debug!(session = %self.id, "rolled back");
        storage.rollback().map_err(CoreError::from)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("tracked", &self.context.len())
            .field("pending", &self.actions.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.storage.is_some() {
            warn!(session = %self.id, "session dropped without commit, rolling back");
            let _ = self.release();
        }
    }
}
