//! Property tests for the unit-of-work guarantees.

use proptest::prelude::*;
use unitwork_core::{ActionKind, EntityRef, Query};
use unitwork_testkit::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Committing a random workload leaves storage equal to the model, and
    /// the session never hands out two instances for one key.
    #[test]
    fn committed_workload_matches_model(
        people in people_strategy(4),
        ops in session_ops_strategy(6, 30),
    ) {
        let test = TestUnit::memory();
        seed(&test, &people);
        let mut harness = ModelHarness::new(people);

        let mut session = test.unit.begin().unwrap();
        harness.apply_all(&mut session, &ops).unwrap();
        session.commit().unwrap();

        ModelHarness::verify_storage(&test, harness.expected());
    }

    /// Rolling back after any workload, flushes included, leaves storage
    /// exactly as it was.
    #[test]
    fn rollback_leaves_storage_unchanged(
        people in people_strategy(4),
        ops in session_ops_strategy(6, 30),
    ) {
        let test = TestUnit::memory();
        seed(&test, &people);
        let before = test.rows();
        let mut harness = ModelHarness::new(people);

        let mut session = test.unit.begin().unwrap();
        harness.apply_all(&mut session, &ops).unwrap();
        session.rollback().unwrap();

        prop_assert_eq!(test.rows(), before);
        ModelHarness::verify_storage(&test, harness.committed());
    }

    /// Mutations alone never reach storage or the queue before a flush.
    #[test]
    fn mutations_wait_for_a_flush(
        people in people_strategy(4),
        ages in prop::collection::vec(age_strategy(), 4),
    ) {
        let test = TestUnit::memory();
        seed(&test, &people);

        let mut session = test.unit.begin().unwrap();
        let handles: Vec<EntityRef<Person>> = (1..=4)
            .map(|id| session.find::<Person>(id).unwrap().unwrap())
            .collect();
        test.journal().clear();

        for (handle, age) in handles.iter().zip(&ages) {
            handle.update(|p| p.age = *age);
        }
        prop_assert!(session.pending_actions().is_empty());
        prop_assert!(test.journal().writes().is_empty());

        let report = session.flush().unwrap();
        let changed = people
            .iter()
            .zip(&ages)
            .filter(|(person, age)| person.age != **age)
            .count();
        prop_assert_eq!(report.count(ActionKind::Update), changed);
        prop_assert!(session.flush().unwrap().is_empty());
        session.commit().unwrap();
    }

    /// Writes always leave a flush as inserts, then updates, then deletes.
    #[test]
    fn writes_are_grouped_by_kind(ops in session_ops_strategy(6, 30)) {
        let test = TestUnit::seeded();
        let mut harness = ModelHarness::new(seed_people());
        let mut session = test.unit.begin().unwrap();

        harness.apply_all(&mut session, &ops).unwrap();
        test.journal().clear();
        session.flush().unwrap();

        let rank = |statement: &String| match statement.split(' ').next() {
            Some("insert") => 0,
            Some("update") => 1,
            _ => 2,
        };
        let ranks: Vec<u8> = test.journal().writes().iter().map(rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        prop_assert_eq!(ranks, sorted);
        session.commit().unwrap();
    }

    /// A direct query returns the already-managed instance for every key the
    /// session has loaded.
    #[test]
    fn direct_query_preserves_identity(ids in prop::collection::vec(1..=2i64, 1..6)) {
        let test = TestUnit::seeded();
        let mut session = test.unit.begin().unwrap();

        let loaded: Vec<EntityRef<Person>> = ids
            .iter()
            .map(|id| session.find::<Person>(*id).unwrap().unwrap())
            .collect();
        for (id, handle) in ids.iter().zip(&loaded) {
            let queried = session.query::<Person>(&Query::by_id(*id)).unwrap();
            prop_assert!(queried[0].ptr_eq(handle));
        }
        session.rollback().unwrap();
    }
}

fn seed(test: &TestUnit, people: &[Person]) {
    test.unit
        .transaction(|session| {
            for person in people {
                session.persist(&EntityRef::new(person.clone()))?;
            }
            Ok(())
        })
        .unwrap();
    test.journal().clear();
}
