//! Typed repositories.

use crate::entity::{Entity, EntityRef};
use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use crate::session::Session;
use crate::unit::PersistenceUnit;
use std::fmt;
use std::marker::PhantomData;
use unitwork_storage::{RecordKey, Value};

/// A typed data-access object for entities of type `T`.
///
/// Every method takes an optional session. With `Some`, the call joins that
/// session and its results stay managed by it. With `None`, the call runs in
/// its own ephemeral session that commits before returning, so entities
/// handed back are already detached.
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
/// let members = unit.repository::<Member>();
///
/// // Runs and commits in its own session.
/// members.save(None, &EntityRef::new(Member { id: 1, age: 30 })).unwrap();
///
/// // Joins the caller's session.
/// let mut session = unit.begin().unwrap();
/// let alice = members.get_by_id(Some(&mut session), 1).unwrap();
/// alice.update(|m| m.age = 31);
/// session.commit().unwrap();
/// ```
pub struct Repository<T: Entity> {
    unit: PersistenceUnit,
    _marker: PhantomData<T>,
}

impl<T: Entity> Repository<T> {
    /// Creates a repository bound to `unit`.
    #[must_use]
    pub fn new(unit: PersistenceUnit) -> Self {
        Self {
            unit,
            _marker: PhantomData,
        }
    }

    /// Finds an entity by identifier.
    pub fn find_by_id(
        &self,
        session: Option<&mut Session>,
        id: i64,
    ) -> CoreResult<Option<EntityRef<T>>> {
        self.unit.required(session, |s| s.find::<T>(id))
    }

    /// Finds an entity by identifier, failing if it does not exist.
    pub fn get_by_id(&self, session: Option<&mut Session>, id: i64) -> CoreResult<EntityRef<T>> {
        self.find_by_id(session, id)?
            .ok_or_else(|| CoreError::EntityNotFound {
                key: RecordKey::new(T::ENTITY_TYPE, id),
            })
    }

    /// Returns every entity of type `T`.
    pub fn find_all(&self, session: Option<&mut Session>) -> CoreResult<Vec<EntityRef<T>>> {
        self.query(session, &Query::all())
    }

    /// Returns entities whose field equals the value.
    pub fn find_by_field(
        &self,
        session: Option<&mut Session>,
        field: &str,
        value: impl Into<Value>,
    ) -> CoreResult<Vec<EntityRef<T>>> {
        self.query(session, &Query::field_eq(field, value))
    }

    /// Runs a direct query.
    pub fn query(
        &self,
        session: Option<&mut Session>,
        query: &Query,
    ) -> CoreResult<Vec<EntityRef<T>>> {
        self.unit.required(session, |s| s.query::<T>(query))
    }

    /// Returns true if an entity with this identifier exists.
    pub fn exists_by_id(&self, session: Option<&mut Session>, id: i64) -> CoreResult<bool> {
        Ok(self.find_by_id(session, id)?.is_some())
    }

    /// Counts entities of type `T`.
    pub fn count(&self, session: Option<&mut Session>) -> CoreResult<usize> {
        Ok(self.find_all(session)?.len())
    }

    /// Saves an entity and returns the instance the session now manages.
    ///
    /// An instance the session already manages is returned unchanged; its
    /// changes are written at flush without any call here. A new entity is
    /// persisted as is. A detached entity with an existing row is merged,
    /// and the returned managed copy is not the argument. Saving an entity
    /// whose key was removed in this session is rejected with
    /// [`CoreError::InvalidState`].
    pub fn save(
        &self,
        session: Option<&mut Session>,
        entity: &EntityRef<T>,
    ) -> CoreResult<EntityRef<T>> {
        self.unit.required(session, |s| {
            if s.contains(entity) {
                return Ok(entity.clone());
            }
            let key = entity.try_key()?;
            if s.is_removed(&key) {
                return Err(CoreError::invalid_state(
                    key,
                    "cannot save an entity removed in this session",
                ));
            }
            if s.find::<T>(key.id)?.is_some() {
                s.merge(entity)
            } else {
                s.persist(entity)?;
                Ok(entity.clone())
            }
        })
    }

    /// Deletes an entity.
    ///
    /// A detached instance is resolved to the managed one first. Deleting
    /// an entity that does not exist is a no-op.
    pub fn delete(&self, session: Option<&mut Session>, entity: &EntityRef<T>) -> CoreResult<()> {
        self.unit.required(session, |s| {
            if s.contains(entity) {
                return s.remove(entity);
            }
            let id = entity.try_key()?.id;
            match s.find::<T>(id)? {
                Some(managed) => s.remove(&managed),
                None => Ok(()),
            }
        })
    }

    /// Deletes the entity with this identifier, if it exists.
    pub fn delete_by_id(&self, session: Option<&mut Session>, id: i64) -> CoreResult<()> {
        self.unit.required(session, |s| match s.find::<T>(id)? {
            Some(managed) => s.remove(&managed),
            None => Ok(()),
        })
    }
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self::new(self.unit.clone())
    }
}

impl<T: Entity> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity_type", &T::ENTITY_TYPE)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;
    use unitwork_storage::InMemoryBackend;

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

    fn setup() -> (PersistenceUnit, Repository<Member>, InMemoryBackend) {
        let backend = InMemoryBackend::new().with_journal();
        let unit = PersistenceUnit::new(Arc::new(backend.clone()), Config::default());
        let repo = unit.repository::<Member>();
        for (id, name, age) in [(1, "Alice", 30), (2, "Bob", 25)] {
            repo.save(
                None,
                &EntityRef::new(Member {
                    id,
                    name: name.into(),
                    age,
                }),
            )
            .unwrap();
        }
        backend.journal().clear();
        (unit, repo, backend)
    }

    #[test]
    fn ephemeral_calls_commit_immediately() {
        let (_unit, repo, backend) = setup();
        assert_eq!(repo.count(None).unwrap(), 2);
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_unit, repo, _backend) = setup();
        assert!(matches!(
            repo.get_by_id(None, 9),
            Err(CoreError::EntityNotFound { .. })
        ));
        assert!(!repo.exists_by_id(None, 9).unwrap());
        assert!(repo.exists_by_id(None, 1).unwrap());
    }

    #[test]
    fn save_of_detached_entity_merges() {
        let (_unit, repo, _backend) = setup();
        let alice = repo.get_by_id(None, 1).unwrap();
        alice.update(|m| m.age = 35);

        let saved = repo.save(None, &alice).unwrap();
        assert!(!saved.ptr_eq(&alice));
        assert_eq!(repo.get_by_id(None, 1).unwrap().get().age, 35);
    }

    #[test]
    fn save_of_managed_entity_is_noop() {
        let (unit, repo, backend) = setup();
        let mut session = unit.begin().unwrap();
        let alice = repo.get_by_id(Some(&mut session), 1).unwrap();

        let saved = repo.save(Some(&mut session), &alice).unwrap();
        assert!(saved.ptr_eq(&alice));
        assert!(session.pending_actions().is_empty());
        session.commit().unwrap();
        assert!(backend.journal().writes().is_empty());
    }

    #[test]
    fn save_of_copy_of_removed_entity_is_rejected() {
        let (unit, repo, backend) = setup();
        let mut session = unit.begin().unwrap();
        let bob = repo.get_by_id(Some(&mut session), 2).unwrap();
        session.remove(&bob).unwrap();

        let copy = EntityRef::new(bob.get());
        let result = repo.save(Some(&mut session), &copy);
        assert!(matches!(result, Err(CoreError::InvalidState { .. })));
        assert!(session.is_active());

        session.commit().unwrap();
        assert_eq!(backend.journal().writes(), vec!["delete members#2"]);
        assert!(repo.find_by_id(None, 2).unwrap().is_none());
    }

    #[test]
    fn delete_detached_entity() {
        let (_unit, repo, backend) = setup();
        let bob = repo.get_by_id(None, 2).unwrap();
        repo.delete(None, &bob).unwrap();

        assert_eq!(backend.journal().writes(), vec!["delete members#2"]);
        assert!(repo.find_by_id(None, 2).unwrap().is_none());
        repo.delete_by_id(None, 2).unwrap();
    }

    #[test]
    fn find_by_field_filters() {
        let (_unit, repo, _backend) = setup();
        let bobs = repo.find_by_field(None, "name", "Bob").unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].get().id, 2);
    }
}
