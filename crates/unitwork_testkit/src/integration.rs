//! Cross-crate integration test helpers.
//!
//! Provides a model harness that drives a session with generated
//! operations while tracking what storage must contain afterwards, plus
//! reusable checks for the unit-of-work guarantees.

use crate::fixtures::{Person, TestUnit};
use crate::generators::SessionOp;
use std::collections::{BTreeMap, HashMap};
use unitwork_core::{CoreResult, Entity, EntityRef, Query, RecordKey, Session};

/// Replays [`SessionOp`]s against one session and a reference model.
///
/// The harness asserts identity as it goes: every handle the session
/// returns for a key must be the handle it returned before.
pub struct ModelHarness {
    committed: BTreeMap<i64, Person>,
    expected: BTreeMap<i64, Person>,
    handles: HashMap<i64, EntityRef<Person>>,
}

impl ModelHarness {
    /// Creates a harness for a unit whose committed people are `people`.
    pub fn new(people: impl IntoIterator<Item = Person>) -> Self {
        let committed: BTreeMap<i64, Person> = people.into_iter().map(|p| (p.id, p)).collect();
        Self {
            expected: committed.clone(),
            committed,
            handles: HashMap::new(),
        }
    }

    /// Applies one operation to the session and the model.
    pub fn apply(&mut self, session: &mut Session, op: &SessionOp) -> CoreResult<()> {
        match op {
            SessionOp::Find(id) => {
                self.find(session, *id)?;
            }
            SessionOp::SetAge(id, age) => {
                if let Some(handle) = self.find(session, *id)? {
                    handle.update(|p| p.age = *age);
                    if let Some(expected) = self.expected.get_mut(id) {
                        expected.age = *age;
                    }
                }
            }
            SessionOp::Remove(id) => {
                if let Some(handle) = self.find(session, *id)? {
                    session.remove(&handle)?;
                    self.expected.remove(id);
                    self.handles.remove(id);
                }
            }
            SessionOp::Persist(person) => {
                if !self.expected.contains_key(&person.id) {
                    if session.is_tracked(&person.key()) {
                        session.flush()?;
                    }
                    let handle = EntityRef::new(person.clone());
                    session.persist(&handle)?;
                    self.expected.insert(person.id, person.clone());
                    self.handles.insert(person.id, handle);
                }
            }
            SessionOp::Flush => {
                session.flush()?;
            }
            SessionOp::QueryAll => {
                let found = session.query::<Person>(&Query::all())?;
                let ids: Vec<i64> = found.iter().map(|p| p.get().id).collect();
                let expected: Vec<i64> = self.expected.keys().copied().collect();
                assert_eq!(ids, expected, "query after auto flush must see pending writes");
                for handle in found {
                    self.remember(handle.get().id, handle);
                }
            }
        }
        Ok(())
    }

    /// Applies every operation in order.
    pub fn apply_all(&mut self, session: &mut Session, ops: &[SessionOp]) -> CoreResult<()> {
        for op in ops {
            self.apply(session, op)?;
        }
        Ok(())
    }

    /// People storage must hold after the session commits.
    pub fn expected(&self) -> &BTreeMap<i64, Person> {
        &self.expected
    }

    /// People storage held before the session began.
    pub fn committed(&self) -> &BTreeMap<i64, Person> {
        &self.committed
    }

    /// Asserts that the committed people equal `expected`.
    pub fn verify_storage(test: &TestUnit, expected: &BTreeMap<i64, Person>) {
        let actual: BTreeMap<i64, Person> = test
            .rows()
            .iter()
            .filter(|row| row.key.entity_type == Person::ENTITY_TYPE)
            .filter_map(|row| test.committed_person(row.key.id))
            .map(|p| (p.id, p))
            .collect();
        assert_eq!(&actual, expected, "committed people mismatch");
    }

    fn find(&mut self, session: &mut Session, id: i64) -> CoreResult<Option<EntityRef<Person>>> {
        let found = session.find::<Person>(id)?;
        assert_eq!(
            found.is_some(),
            self.expected.contains_key(&id),
            "find({id}) disagrees with the model"
        );
        if let Some(handle) = &found {
            assert_eq!(Some(&handle.get()), self.expected.get(&id));
            self.remember(id, handle.clone());
        }
        Ok(found)
    }

    fn remember(&mut self, id: i64, handle: EntityRef<Person>) {
        if let Some(previous) = self.handles.get(&id) {
            assert!(
                previous.ptr_eq(&handle),
                "session returned a second instance for {}",
                RecordKey::new(Person::ENTITY_TYPE, id)
            );
        } else {
            self.handles.insert(id, handle);
        }
    }
}

/// Reusable checks of unit-of-work guarantees.
pub mod checks {
    use super::*;
    use crate::fixtures::{ALICE, BOB};

    /// Loads the same key twice, once by id and once through a direct query,
    /// and asserts a single instance is handed out.
    pub fn check_identity_within_session(test: &TestUnit) {
        let mut session = test.unit.begin().expect("Failed to begin session");
        let first = session.find::<Person>(ALICE).unwrap().unwrap();
        let second = session.find::<Person>(ALICE).unwrap().unwrap();
        let queried = session.query::<Person>(&Query::by_id(ALICE)).unwrap();
        assert!(first.ptr_eq(&second));
        assert!(first.ptr_eq(&queried[0]));
        session.rollback().unwrap();
    }

    /// Mutates, removes, persists and flushes, then rolls back and asserts
    /// storage is unchanged.
    pub fn check_rollback_leaves_storage_unchanged(test: &TestUnit) {
        let before = test.rows();
        let mut session = test.unit.begin().expect("Failed to begin session");

        let alice = session.find::<Person>(ALICE).unwrap().unwrap();
        alice.update(|p| p.age += 10);
        let bob = session.find::<Person>(BOB).unwrap().unwrap();
        session.remove(&bob).unwrap();
        session
            .persist(&EntityRef::new(Person::new(99, "Zed", 50)))
            .unwrap();
        session.flush().unwrap();
        session.rollback().unwrap();

        assert_eq!(test.rows(), before);
    }

    /// Issues a delete before an update and asserts the update is written
    /// first.
    pub fn check_update_before_delete(test: &TestUnit) {
        let mut session = test.unit.begin().expect("Failed to begin session");
        let alice = session.find::<Person>(ALICE).unwrap().unwrap();
        let bob = session.find::<Person>(BOB).unwrap().unwrap();
        test.journal().clear();

        session.remove(&bob).unwrap();
        alice.update(|p| p.age = 40);
        session.flush().unwrap();

        assert_eq!(
            test.journal().writes(),
            vec!["update persons#1", "delete persons#2"]
        );
        session.commit().unwrap();
    }

    /// Two calls without an enclosing session never share identity, and
    /// the first call's write is committed before the second call runs.
    pub fn check_ephemeral_sessions_are_independent(test: &TestUnit) {
        let first = test
            .unit
            .required(None, |session| {
                let alice = session.find::<Person>(ALICE)?.unwrap();
                alice.update(|p| p.age = 35);
                Ok(alice)
            })
            .unwrap();
        assert_eq!(test.committed_age(ALICE), Some(35));

        let second = test
            .unit
            .required(None, |session| session.find::<Person>(ALICE))
            .unwrap()
            .unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(second.get().age, 35);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::seed_people;

    #[test]
    fn test_model_harness() {
        let test = TestUnit::seeded();
        let mut harness = ModelHarness::new(seed_people());
        let mut session = test.unit.begin().unwrap();

        harness
            .apply_all(
                &mut session,
                &[
                    SessionOp::SetAge(1, 41),
                    SessionOp::Remove(2),
                    SessionOp::Persist(Person::new(2, "Bob", 99)),
                    SessionOp::QueryAll,
                    SessionOp::Find(2),
                ],
            )
            .unwrap();
        session.commit().unwrap();

        ModelHarness::verify_storage(&test, harness.expected());
        assert_eq!(test.committed_age(2), Some(99));
    }

    #[test]
    fn test_identity_within_session() {
        checks::check_identity_within_session(&TestUnit::seeded());
    }

    #[test]
    fn test_rollback_leaves_storage_unchanged() {
        checks::check_rollback_leaves_storage_unchanged(&TestUnit::seeded());
    }

    #[test]
    fn test_update_before_delete() {
        checks::check_update_before_delete(&TestUnit::seeded());
    }

    #[test]
    fn test_ephemeral_sessions_are_independent() {
        checks::check_ephemeral_sessions_are_independent(&TestUnit::seeded());
    }
}
