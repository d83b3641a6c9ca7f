//! Member-service scenarios.
//!
//! Each scenario replays one way of loading and changing members and
//! records what the caller observes: the age of the member it returns,
//! whether two lookups handed out the same instance, and which
//! statements reached storage.

use crate::error::CliResult;
use crate::member::{Member, Workbench, ALICE, BOB};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use tracing::info;
use unitwork_core::{
    CoreError, CoreResult, Entity, EntityRef, Query, RecordKey, ID_FIELD,
};

/// A replayable scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Load, change and save inside one transaction.
    IncludeTransaction,
    /// Load, change and save with no enclosing transaction.
    ExcludeTransaction,
    /// Load the same member twice by id.
    Identity,
    /// Load by id, then run a typed query for the same id.
    TypedQuery,
    /// Load by id, then run a raw field query for the same id.
    NativeQuery,
    /// Change a member and flush before the transaction ends.
    FlushInTheMiddle,
    /// Update, delete, query, re-insert and save in one transaction.
    Complex,
}

impl Scenario {
    /// Every scenario, in replay order.
    pub const ALL: [Self; 7] = [
        Self::IncludeTransaction,
        Self::ExcludeTransaction,
        Self::Identity,
        Self::TypedQuery,
        Self::NativeQuery,
        Self::FlushInTheMiddle,
        Self::Complex,
    ];

    /// Returns the command-line name.
    pub fn name(self) -> &'static str {
        match self {
            Self::IncludeTransaction => "include-transaction",
            Self::ExcludeTransaction => "exclude-transaction",
            Self::Identity => "identity",
            Self::TypedQuery => "typed-query",
            Self::NativeQuery => "native-query",
            Self::FlushInTheMiddle => "flush-in-the-middle",
            Self::Complex => "complex",
        }
    }

    /// Age the returned member is expected to have.
    pub fn expected_age(self) -> i32 {
        match self {
            Self::Identity | Self::TypedQuery | Self::NativeQuery => 30,
            Self::IncludeTransaction | Self::ExcludeTransaction | Self::FlushInTheMiddle => 35,
            Self::Complex => 40,
        }
    }

    /// Reseeds the store, replays the scenario and reports what happened.
    pub fn run(self, bench: &Workbench) -> CliResult<ScenarioReport> {
        bench.reseed()?;
        info!(scenario = self.name(), "replaying");

        let outcome = match self {
            Self::IncludeTransaction => include_transaction(bench)?,
            Self::ExcludeTransaction => exclude_transaction(bench)?,
            Self::Identity => identity(bench)?,
            Self::TypedQuery => typed_query(bench)?,
            Self::NativeQuery => native_query(bench)?,
            Self::FlushInTheMiddle => flush_in_the_middle(bench)?,
            Self::Complex => complex(bench)?,
        };
        let statements = bench.journal().rendered();

        let committed = bench.members()?;
        let committed_age = committed.iter().find(|m| m.id == ALICE).map(|m| m.age);

        Ok(ScenarioReport {
            scenario: self,
            returned_age: outcome.returned.age,
            expected_age: self.expected_age(),
            committed_age,
            observations: outcome.observations,
            statements,
            committed,
        })
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What one scenario run produced.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    /// The scenario.
    pub scenario: Scenario,
    /// Age of the member the scenario returned.
    pub returned_age: i32,
    /// Age the returned member should have.
    pub expected_age: i32,
    /// Alice's committed age once the scenario finished.
    pub committed_age: Option<i32>,
    /// Ages and identity checks seen along the way.
    pub observations: Vec<Observation>,
    /// Statements sent to storage, in order.
    pub statements: Vec<String>,
    /// Members stored once the scenario finished.
    pub committed: Vec<Member>,
}

impl ScenarioReport {
    /// Returns true if the returned member has the expected age.
    pub fn passed(&self) -> bool {
        self.returned_age == self.expected_age
    }
}

/// A labelled value observed during a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    /// What was looked at.
    pub label: String,
    /// What it showed.
    pub value: String,
}

struct Outcome {
    returned: Member,
    observations: Vec<Observation>,
}

impl Outcome {
    fn new(returned: &EntityRef<Member>) -> Self {
        Self {
            returned: returned.get(),
            observations: Vec::new(),
        }
    }

    fn note(mut self, label: &str, value: impl ToString) -> Self {
        self.observations.push(Observation {
            label: label.to_string(),
            value: value.to_string(),
        });
        self
    }

    fn same(self, label: &str, a: &EntityRef<Member>, b: &EntityRef<Member>) -> Self {
        self.note(label, a.ptr_eq(b))
    }

    fn age(self, label: &str, member: &EntityRef<Member>) -> Self {
        self.note(label, member.get().age)
    }
}

fn first(found: Vec<EntityRef<Member>>, id: i64) -> CoreResult<EntityRef<Member>> {
    found.into_iter().next().ok_or_else(|| CoreError::EntityNotFound {
        key: RecordKey::new(Member::ENTITY_TYPE, id),
    })
}

fn include_transaction(bench: &Workbench) -> CliResult<Outcome> {
    let members = bench.unit.repository::<Member>();
    let outcome = bench.unit.transaction(|session| {
        let member = members.get_by_id(Some(&mut *session), ALICE)?;
        member.update(|m| m.age = 35);

        let saved = members.save(Some(&mut *session), &member)?;
        let queued = session.pending_actions().len();
        Ok(Outcome::new(&member)
            .same("save returned the loaded instance", &saved, &member)
            .note("actions queued after save", queued))
    })?;
    Ok(outcome)
}

fn exclude_transaction(bench: &Workbench) -> CliResult<Outcome> {
    let members = bench.unit.repository::<Member>();

    // Both calls run in their own short session.
    let member = members.get_by_id(None, ALICE)?;
    member.update(|m| m.age = 35);
    let after_change = bench.journal().writes().len();

    let saved = members.save(None, &member)?;
    Ok(Outcome::new(&member)
        .note("writes after changing the detached member", after_change)
        .same("save returned the loaded instance", &saved, &member))
}

fn identity(bench: &Workbench) -> CliResult<Outcome> {
    let members = bench.unit.repository::<Member>();
    let outcome = bench.unit.transaction(|session| {
        let first = members.get_by_id(Some(&mut *session), ALICE)?;
        let second = members.get_by_id(Some(&mut *session), ALICE)?;
        Ok(Outcome::new(&first).same("member1 is member2", &first, &second))
    })?;
    Ok(outcome)
}

fn typed_query(bench: &Workbench) -> CliResult<Outcome> {
    let members = bench.unit.repository::<Member>();
    let outcome = bench.unit.transaction(|session| {
        let loaded = members.get_by_id(Some(&mut *session), ALICE)?;
        let queried = first(members.query(Some(&mut *session), &Query::by_id(ALICE))?, ALICE)?;
        Ok(Outcome::new(&loaded).same("member1 is member2", &loaded, &queried))
    })?;
    Ok(outcome)
}

fn native_query(bench: &Workbench) -> CliResult<Outcome> {
    let members = bench.unit.repository::<Member>();
    let outcome = bench.unit.transaction(|session| {
        let loaded = members.get_by_id(Some(&mut *session), ALICE)?;
        let queried = first(
            members.find_by_field(Some(&mut *session), ID_FIELD, ALICE)?,
            ALICE,
        )?;
        Ok(Outcome::new(&loaded).same("member1 is member2", &loaded, &queried))
    })?;
    Ok(outcome)
}

fn flush_in_the_middle(bench: &Workbench) -> CliResult<Outcome> {
    let members = bench.unit.repository::<Member>();
    let outcome = bench.unit.transaction(|session| {
        let member = members.get_by_id(Some(&mut *session), ALICE)?;
        member.update(|m| m.age = 35);

        let report = session.flush()?;
        let flushed = bench.journal().writes().join(", ");
        let saved = members.save(Some(&mut *session), &member)?;

        Ok(Outcome::new(&member)
            .note("actions executed by flush", report.len())
            .note("writes before commit", flushed)
            .same("save returned the loaded instance", &saved, &member))
    })?;
    Ok(outcome)
}

fn complex(bench: &Workbench) -> CliResult<Outcome> {
    let members = bench.unit.repository::<Member>();
    let outcome = bench.unit.transaction(|session| {
        let alice = members.get_by_id(Some(&mut *session), ALICE)?;
        let bob = members.get_by_id(Some(&mut *session), BOB)?;

        alice.update(|m| m.age = 40);
        members.delete(Some(&mut *session), &bob)?;

        // The query flushes the update and the delete first.
        let new_alice = first(members.query(Some(&mut *session), &Query::by_id(ALICE))?, ALICE)?;

        let new_bob = EntityRef::new(Member::new(BOB, "Bob", 99));
        session.persist(&new_bob)?;
        session.flush()?;

        let native_bob = first(
            members.find_by_field(Some(&mut *session), ID_FIELD, BOB)?,
            BOB,
        )?;

        members.save(Some(&mut *session), &new_alice)?;
        members.save(Some(&mut *session), &native_bob)?;

        Ok(Outcome::new(&alice)
            .age("alice", &alice)
            .age("new_alice", &new_alice)
            .age("bob", &bob)
            .age("new_bob", &new_bob)
            .age("native_bob", &native_bob)
            .same("alice is new_alice", &alice, &new_alice)
            .same("new_bob is native_bob", &new_bob, &native_bob)
            .same("bob is native_bob", &bob, &native_bob))
    })?;
    Ok(outcome)
}
