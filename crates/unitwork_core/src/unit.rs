//! Persistence units: session factory and transaction boundary.

use crate::config::Config;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::flush::FlushCoordinator;
use crate::repository::Repository;
use crate::session::Session;
use crate::stats::{StatsSnapshot, UnitStats};
use crate::types::SessionId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use unitwork_storage::{InMemoryBackend, StorageBackend};

/// Opens sessions against one storage backend.
///
/// Cloning a unit yields another handle to the same backend, configuration
/// and statistics. Units are `Send + Sync`; the sessions they open are not.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use unitwork_core::{Entity, EntityRef, PersistenceUnit};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Member {
///     id: i64,
///     age: i32,
/// }
///
/// impl Entity for Member {
///     const ENTITY_TYPE: &'static str = "members";
///     fn id(&self) -> i64 {
///         self.id
///     }
/// }
///
/// let unit = PersistenceUnit::open_in_memory();
/// unit.transaction(|session| session.persist(&EntityRef::new(Member { id: 1, age: 30 })))
///     .unwrap();
///
/// let age = unit
///     .transaction(|session| Ok(session.find::<Member>(1)?.map(|m| m.get().age)))
///     .unwrap();
/// assert_eq!(age, Some(30));
/// ```
#[derive(Clone)]
pub struct PersistenceUnit {
    inner: Arc<UnitInner>,
}

struct UnitInner {
    backend: Arc<dyn StorageBackend>,
    config: Config,
    stats: Arc<UnitStats>,
    next_session: AtomicU64,
}

impl PersistenceUnit {
    /// Creates a unit over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, config: Config) -> Self {
        Self {
            inner: Arc::new(UnitInner {
                backend,
                config,
                stats: Arc::new(UnitStats::new()),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a unit over a fresh in-memory backend.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), Config::default())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns a snapshot of the unit's statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Begins a session and its storage transaction.
    pub fn begin(&self) -> CoreResult<Session> {
        let storage = self.inner.backend.begin()?;
        let id = SessionId::new(self.inner.next_session.fetch_add(1, Ordering::Relaxed));
        self.inner.stats.record_session_open();
        debug!(session = %id, "begin");
        Ok(Session::new(
            id,
            storage,
            FlushCoordinator::new(&self.inner.config),
            Arc::clone(&self.inner.stats),
        ))
    }

    /// Executes a function within a new session.
    ///
    /// If the function returns `Ok`, the session is committed.
    /// If it returns `Err`, the session is rolled back.
    pub fn transaction<F, R>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Session) -> CoreResult<R>,
    {
        let mut session = self.begin()?;

        match f(&mut session) {
            Ok(result) => {
                session.commit()?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback) = session.rollback() {
                    warn!(error = %rollback, "rollback after failed transaction");
                }
                Err(e)
            }
        }
    }

    /// Runs `f` in the caller's session if there is one, otherwise in an
    /// ephemeral session that commits when `f` succeeds.
    ///
    /// Entities returned from an ephemeral session are detached: the
    /// session that loaded them is gone, so later changes to them are not
    /// tracked by anything.
    pub fn required<F, R>(&self, session: Option<&mut Session>, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Session) -> CoreResult<R>,
    {
        match session {
            Some(session) => f(session),
            None => self.transaction(f),
        }
    }

    /// Returns a repository for `T` bound to this unit.
    #[must_use]
    pub fn repository<T: Entity>(&self) -> Repository<T> {
        Repository::new(self.clone())
    }
}

impl fmt::Debug for PersistenceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceUnit")
            .field("config", &self.inner.config)
            .field("stats", &self.inner.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlushMode;
    use crate::entity::EntityRef;
    use crate::error::CoreError;
    use crate::query::Query;
    use crate::types::{EntityStatus, SessionState};
    use crate::ActionKind;
    use serde::{Deserialize, Serialize};
    use unitwork_storage::{Fields, RecordKey, Row, Value};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Member {
        id: i64,
        name: String,
        age: i32,
    }

    impl Entity for Member {
        const ENTITY_TYPE: &'static str = "members";

        fn id(&self) -> i64 {
            self.id
        }
    }

    fn member(id: i64, name: &str, age: i32) -> Member {
        Member {
            id,
            name: name.into(),
            age,
        }
    }

    fn row(id: i64, name: &str, age: i64) -> Row {
        let mut fields = Fields::new();
        fields.insert("id".into(), Value::from(id));
        fields.insert("name".into(), Value::from(name));
        fields.insert("age".into(), Value::from(age));
        Row::new(RecordKey::new("members", id), fields)
    }

    fn seeded(config: Config) -> (PersistenceUnit, InMemoryBackend) {
        let backend = InMemoryBackend::with_rows([row(1, "Alice", 30), row(2, "Bob", 25)])
            .with_journal();
        let unit = PersistenceUnit::new(Arc::new(backend.clone()), config);
        (unit, backend)
    }

    fn age_of(backend: &InMemoryBackend, id: i64) -> Option<Value> {
        backend
            .get(&RecordKey::new("members", id))
            .map(|fields| fields["age"].clone())
    }

    #[test]
    fn find_twice_returns_same_instance() {
        let (unit, backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();

        let a = session.find::<Member>(1).unwrap().unwrap();
        let b = session.find::<Member>(1).unwrap().unwrap();
        assert!(a.ptr_eq(&b));

        let selects = backend
            .journal()
            .rendered()
            .into_iter()
            .filter(|s| s.starts_with("select"))
            .count();
        assert_eq!(selects, 1);
    }

    #[test]
    fn query_returns_tracked_instance() {
        let (unit, _backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();

        let found = session.find::<Member>(1).unwrap().unwrap();
        let queried = session.query::<Member>(&Query::by_id(1)).unwrap();
        assert!(found.ptr_eq(&queried[0]));
    }

    #[test]
    fn managed_change_is_committed_without_save() {
        let (unit, backend) = seeded(Config::default());
        unit.transaction(|session| {
            let alice = session.find::<Member>(1)?.unwrap();
            alice.update(|m| m.age = 35);
            Ok(())
        })
        .unwrap();

        assert_eq!(age_of(&backend, 1), Some(Value::from(35)));
    }

    #[test]
    fn ephemeral_load_then_mutation_is_lost() {
        let (unit, backend) = seeded(Config::default());
        let alice = unit
            .required(None, |session| session.find::<Member>(1))
            .unwrap()
            .unwrap();
        alice.update(|m| m.age = 35);

        assert_eq!(age_of(&backend, 1), Some(Value::from(30)));
    }

    #[test]
    fn required_joins_outer_session() {
        let (unit, backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        let outer = session.find::<Member>(1).unwrap().unwrap();
        let inner = unit
            .required(Some(&mut session), |s| s.find::<Member>(1))
            .unwrap()
            .unwrap();
        assert!(outer.ptr_eq(&inner));

        inner.update(|m| m.age = 31);
        session.commit().unwrap();
        assert_eq!(age_of(&backend, 1), Some(Value::from(31)));
    }

    #[test]
    fn query_auto_flushes_update_before_delete() {
        let (unit, backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();

        let alice = session.find::<Member>(1).unwrap().unwrap();
        let bob = session.find::<Member>(2).unwrap().unwrap();
        alice.update(|m| m.age = 40);
        session.remove(&bob).unwrap();
        assert!(backend.journal().writes().is_empty());

        let all = session.query::<Member>(&Query::all()).unwrap();
        assert_eq!(
            backend.journal().writes(),
            vec!["update members#1", "delete members#2"]
        );
        assert_eq!(all.len(), 1);
        assert!(all[0].ptr_eq(&alice));
        assert!(!session.is_tracked(&RecordKey::new("members", 2)));
        session.commit().unwrap();
    }

    #[test]
    fn commit_mode_query_reads_unflushed_state() {
        let (unit, backend) =
            seeded(Config::new().flush_mode(FlushMode::Commit));
        let mut session = unit.begin().unwrap();

        let bob = session.find::<Member>(2).unwrap().unwrap();
        session.remove(&bob).unwrap();
        let all = session.query::<Member>(&Query::all()).unwrap();

        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|m| m.ptr_eq(&bob)));
        assert_eq!(session.status(&bob), EntityStatus::Removed);
        assert!(backend.journal().writes().is_empty());
    }

    #[test]
    fn persist_after_delete_of_same_key_flushed_first() {
        let (unit, backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();

        let bob = session.find::<Member>(2).unwrap().unwrap();
        session.remove(&bob).unwrap();
        session.flush().unwrap();

        let new_bob = EntityRef::new(member(2, "Bob", 99));
        session.persist(&new_bob).unwrap();
        assert_eq!(
            session.pending_actions(),
            vec![(ActionKind::Insert, RecordKey::new("members", 2))]
        );
        session.flush().unwrap();

        let queried = session.query::<Member>(&Query::by_id(2)).unwrap();
        assert!(queried[0].ptr_eq(&new_bob));
        session.commit().unwrap();
        assert_eq!(age_of(&backend, 2), Some(Value::from(99)));
    }

    #[test]
    fn rollback_after_flush_restores_storage() {
        let (unit, backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        let alice = session.find::<Member>(1).unwrap().unwrap();
        alice.update(|m| m.age = 40);
        session.flush().unwrap();

        session.rollback().unwrap();
        assert_eq!(age_of(&backend, 1), Some(Value::from(30)));
        assert_eq!(unit.stats().sessions_rolled_back, 1);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let (unit, backend) = seeded(Config::default());
        let result: CoreResult<()> = unit.transaction(|session| {
            let alice = session.find::<Member>(1)?.unwrap();
            alice.update(|m| m.age = 40);
            session.flush()?;
            Err(CoreError::invalid_operation("abort"))
        });

        assert!(result.is_err());
        assert_eq!(age_of(&backend, 1), Some(Value::from(30)));
    }

    #[test]
    fn dropped_session_rolls_back() {
        let (unit, backend) = seeded(Config::default());
        {
            let mut session = unit.begin().unwrap();
            let bob = session.find::<Member>(2).unwrap().unwrap();
            session.remove(&bob).unwrap();
            session.flush().unwrap();
        }
        assert!(age_of(&backend, 2).is_some());
        assert_eq!(unit.stats().sessions_rolled_back, 1);
    }

    #[test]
    fn failed_flush_poisons_session() {
        let (unit, backend) = seeded(Config::default());
        backend.fail_writes_on(RecordKey::new("members", 1));
        let mut session = unit.begin().unwrap();

        let alice = session.find::<Member>(1).unwrap().unwrap();
        alice.update(|m| m.age = 40);
        assert!(matches!(
            session.flush(),
            Err(CoreError::StorageWrite { .. })
        ));
        assert_eq!(session.state(), SessionState::Poisoned);
        assert!(matches!(
            session.find::<Member>(2),
            Err(CoreError::SessionPoisoned { .. })
        ));
        session.rollback().unwrap();
        assert_eq!(age_of(&backend, 1), Some(Value::from(30)));
    }

    #[test]
    fn failed_read_does_not_poison() {
        let (unit, backend) = seeded(Config::default());
        backend.fail_reads(true);
        let mut session = unit.begin().unwrap();

        assert!(matches!(
            session.find::<Member>(1),
            Err(CoreError::StorageRead { .. })
        ));
        assert!(session.is_active());
        assert_eq!(session.tracked_count(), 0);
    }

    #[test]
    fn persist_conflicting_instance_poisons() {
        let (unit, _backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        session.find::<Member>(1).unwrap().unwrap();

        let impostor = EntityRef::new(member(1, "Alice", 30));
        assert!(matches!(
            session.persist(&impostor),
            Err(CoreError::IdentityConflict { .. })
        ));
        assert_eq!(session.state(), SessionState::Poisoned);
    }

    #[test]
    fn remove_unflushed_insert_cancels_it() {
        let (unit, backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        let carol = EntityRef::new(member(3, "Carol", 41));
        session.persist(&carol).unwrap();
        session.remove(&carol).unwrap();

        assert!(session.pending_actions().is_empty());
        assert_eq!(session.status(&carol), EntityStatus::Transient);
        session.commit().unwrap();
        assert!(backend.journal().writes().is_empty());
    }

    #[test]
    fn remove_requires_managed_instance() {
        let (unit, _backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        let detached = EntityRef::new(member(1, "Alice", 30));
        assert!(matches!(
            session.remove(&detached),
            Err(CoreError::NotManaged { .. })
        ));
        assert!(session.is_active());
    }

    #[test]
    fn find_removed_returns_none() {
        let (unit, _backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        let bob = session.find::<Member>(2).unwrap().unwrap();
        session.remove(&bob).unwrap();
        assert!(session.find::<Member>(2).unwrap().is_none());
    }

    #[test]
    fn merge_copies_detached_state() {
        let (unit, backend) = seeded(Config::default());
        let detached = unit
            .required(None, |s| s.find::<Member>(1))
            .unwrap()
            .unwrap();
        detached.update(|m| m.age = 35);

        unit.transaction(|session| {
            let managed = session.merge(&detached)?;
            assert!(!managed.ptr_eq(&detached));
            assert!(!session.contains(&detached));
            assert!(session.contains(&managed));
            Ok(())
        })
        .unwrap();
        assert_eq!(age_of(&backend, 1), Some(Value::from(35)));
    }

    #[test]
    fn merge_of_missing_row_inserts_copy() {
        let (unit, backend) = seeded(Config::default());
        let carol = EntityRef::new(member(3, "Carol", 41));
        unit.transaction(|session| session.merge(&carol).map(|_| ()))
            .unwrap();
        assert_eq!(age_of(&backend, 3), Some(Value::from(41)));
    }

    #[test]
    fn merge_of_removed_instance_is_rejected() {
        let (unit, backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        let bob = session.find::<Member>(2).unwrap().unwrap();
        session.remove(&bob).unwrap();

        assert!(matches!(
            session.merge(&bob),
            Err(CoreError::InvalidState { .. })
        ));
        assert!(session.is_active());
        assert_eq!(session.status(&bob), EntityStatus::Removed);

        session.commit().unwrap();
        assert!(age_of(&backend, 2).is_none());
    }

    #[test]
    fn only_direct_queries_count_as_queries() {
        let (unit, _backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        session.find::<Member>(1).unwrap().unwrap();
        assert!(session.find::<Member>(9).unwrap().is_none());
        assert_eq!(unit.stats().queries, 0);
        assert_eq!(unit.stats().entities_loaded, 1);

        session.query::<Member>(&Query::all()).unwrap();
        session.query::<Member>(&Query::by_id(9)).unwrap();
        assert_eq!(unit.stats().queries, 2);
        session.rollback().unwrap();
    }

    #[test]
    fn detach_drops_tracking_and_changes() {
        let (unit, backend) = seeded(Config::default());
        let mut session = unit.begin().unwrap();
        let alice = session.find::<Member>(1).unwrap().unwrap();
        alice.update(|m| m.age = 50);
        assert!(session.detach(&alice).unwrap());
        assert!(!session.detach(&alice).unwrap());

        let reloaded = session.find::<Member>(1).unwrap().unwrap();
        assert!(!reloaded.ptr_eq(&alice));
        session.commit().unwrap();
        assert_eq!(age_of(&backend, 1), Some(Value::from(30)));
    }

    #[test]
    fn session_ids_increase() {
        let unit = PersistenceUnit::open_in_memory();
        let first = unit.begin().unwrap();
        let second = unit.begin().unwrap();
        assert!(first.id() < second.id());
    }
}
