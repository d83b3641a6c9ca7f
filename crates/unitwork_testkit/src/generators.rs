//! Property-based test generators using proptest.
//!
//! Provides strategies for generating entities and random sequences of
//! session operations.

use crate::fixtures::Person;
use proptest::prelude::*;

/// Strategy for generating person ages.
pub fn age_strategy() -> impl Strategy<Value = i32> {
    0..120i32
}

/// Strategy for generating person names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{1,11}").expect("Invalid regex")
}

/// Strategy for generating people with ids in `1..=max_id`.
pub fn person_strategy(max_id: i64) -> impl Strategy<Value = Person> {
    (1..=max_id, name_strategy(), age_strategy())
        .prop_map(|(id, name, age)| Person::new(id, name, age))
}

/// Strategy for generating a set of people with distinct ids `1..=count`.
pub fn people_strategy(count: i64) -> impl Strategy<Value = Vec<Person>> {
    prop::collection::vec((name_strategy(), age_strategy()), count as usize).prop_map(
        |pairs| {
            pairs
                .into_iter()
                .zip(1..)
                .map(|((name, age), id)| Person::new(id, name, age))
                .collect()
        },
    )
}

/// One step of a generated session workload.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOp {
    /// Load a person by id.
    Find(i64),
    /// Set the age of a person, loading it first if needed.
    SetAge(i64, i32),
    /// Remove a person if it exists.
    Remove(i64),
    /// Persist a new person if the id is free.
    Persist(Person),
    /// Flush explicitly.
    Flush,
    /// Run a direct query over all people.
    QueryAll,
}

/// Strategy for generating one session operation over ids `1..=max_id`.
pub fn session_op_strategy(max_id: i64) -> impl Strategy<Value = SessionOp> {
    prop_oneof![
        3 => (1..=max_id).prop_map(SessionOp::Find),
        4 => (1..=max_id, age_strategy()).prop_map(|(id, age)| SessionOp::SetAge(id, age)),
        2 => (1..=max_id).prop_map(SessionOp::Remove),
        2 => person_strategy(max_id).prop_map(SessionOp::Persist),
        1 => Just(SessionOp::Flush),
        1 => Just(SessionOp::QueryAll),
    ]
}

/// Strategy for generating a sequence of session operations.
pub fn session_ops_strategy(max_id: i64, max_len: usize) -> impl Strategy<Value = Vec<SessionOp>> {
    prop::collection::vec(session_op_strategy(max_id), 0..max_len)
}
