//! Test fixtures and unit helpers.
//!
//! Provides fixture entities and convenience functions for setting up
//! persistence units over in-memory or file-backed stores.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use unitwork_core::{Config, Entity, EntityRef, PersistenceUnit};
use unitwork_storage::{FileBackend, InMemoryBackend, Journal, Row};

/// Identifier of the seeded person "Alice" (age 30).
pub const ALICE: i64 = 1;
/// Identifier of the seeded person "Bob" (age 25).
pub const BOB: i64 = 2;

/// A person entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: i32,
}

impl Person {
    /// Creates a person.
    pub fn new(id: i64, name: impl Into<String>, age: i32) -> Self {
        Self {
            id,
            name: name.into(),
            age,
        }
    }
}

impl Entity for Person {
    const ENTITY_TYPE: &'static str = "persons";

    fn id(&self) -> i64 {
        self.id
    }
}

/// An account owned by a person. Used where a second entity type matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Identifier.
    pub id: i64,
    /// Identifier of the owning person.
    pub owner: i64,
    /// Balance in cents.
    pub balance: i64,
}

impl Account {
    /// Creates an account.
    pub fn new(id: i64, owner: i64, balance: i64) -> Self {
        Self { id, owner, balance }
    }
}

impl Entity for Account {
    const ENTITY_TYPE: &'static str = "accounts";

    fn id(&self) -> i64 {
        self.id
    }
}

enum Store {
    Memory(InMemoryBackend),
    File(Arc<FileBackend>),
}

/// A persistence unit with access to its backend.
pub struct TestUnit {
    /// The unit under test.
    pub unit: PersistenceUnit,
    store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestUnit {
    /// Creates a unit over an empty in-memory store.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates a unit over an empty in-memory store with `config`.
    pub fn memory_with(config: Config) -> Self {
        let backend = InMemoryBackend::new().with_journal();
        Self {
            unit: PersistenceUnit::new(Arc::new(backend.clone()), config),
            store: Store::Memory(backend),
            _temp_dir: None,
        }
    }

    /// Creates a unit over an empty file-backed store in a temporary
    /// directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = Arc::new(
            FileBackend::open(&temp_dir.path().join("store.cbor"))
                .expect("Failed to open file backend")
                .with_journal(),
        );
        Self {
            unit: PersistenceUnit::new(backend.clone(), Config::default()),
            store: Store::File(backend),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates an in-memory unit holding Alice (30) and Bob (25).
    pub fn seeded() -> Self {
        Self::seeded_with(Config::default())
    }

    /// Creates an in-memory unit holding Alice and Bob, with `config`.
    pub fn seeded_with(config: Config) -> Self {
        let test = Self::memory_with(config);
        test.seed_people();
        test
    }

    /// Persists Alice and Bob in their own session and clears the journal.
    pub fn seed_people(&self) {
        self.unit
            .transaction(|session| {
                for person in seed_people() {
                    session.persist(&EntityRef::new(person))?;
                }
                Ok(())
            })
            .expect("Failed to seed people");
        self.journal().clear();
    }

    /// Returns the backend's statement journal.
    pub fn journal(&self) -> Journal {
        match &self.store {
            Store::Memory(backend) => backend.journal(),
            Store::File(backend) => backend.journal(),
        }
    }

    /// Returns the committed rows.
    pub fn rows(&self) -> Vec<Row> {
        match &self.store {
            Store::Memory(backend) => backend.rows(),
            Store::File(backend) => backend.rows(),
        }
    }

    /// Returns the in-memory backend, if this unit uses one.
    pub fn memory_backend(&self) -> Option<&InMemoryBackend> {
        match &self.store {
            Store::Memory(backend) => Some(backend),
            Store::File(_) => None,
        }
    }

    /// Returns the store path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        match &self.store {
            Store::File(backend) => Some(backend.path().to_path_buf()),
            Store::Memory(_) => None,
        }
    }

    /// Reads a committed person outside of any session.
    pub fn committed_person(&self, id: i64) -> Option<Person> {
        self.rows()
            .into_iter()
            .find(|row| row.key.entity_type == Person::ENTITY_TYPE && row.key.id == id)
            .map(|row| {
                let value = unitwork_storage::Value::Map(
                    row.fields
                        .into_iter()
                        .map(|(k, v)| (unitwork_storage::Value::Text(k), v))
                        .collect(),
                );
                value.deserialized().expect("Failed to decode person row")
            })
    }

    /// Returns the committed age of a person.
    pub fn committed_age(&self, id: i64) -> Option<i32> {
        self.committed_person(id).map(|p| p.age)
    }
}

/// Alice (30) and Bob (25).
pub fn seed_people() -> Vec<Person> {
    vec![Person::new(ALICE, "Alice", 30), Person::new(BOB, "Bob", 25)]
}

/// Runs a test with an empty in-memory unit.
///
/// # Example
///
/// ```rust
/// use unitwork_testkit::with_temp_unit;
///
/// with_temp_unit(|test| {
///     assert!(test.rows().is_empty());
/// });
/// ```
pub fn with_temp_unit<F, R>(f: F) -> R
where
    F: FnOnce(&TestUnit) -> R,
{
    let test = TestUnit::memory();
    f(&test)
}

/// Runs a test with an in-memory unit holding Alice and Bob.
pub fn with_seeded_unit<F, R>(f: F) -> R
where
    F: FnOnce(&TestUnit) -> R,
{
    let test = TestUnit::seeded();
    f(&test)
}

/// Runs a test with an empty file-backed unit.
pub fn with_file_unit<F, R>(f: F) -> R
where
    F: FnOnce(&TestUnit) -> R,
{
    let test = TestUnit::file();
    f(&test)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a unit holding `count` people with ids `1..=count`.
    pub fn populated_unit(count: i64) -> TestUnit {
        let test = TestUnit::memory();
        test.unit
            .transaction(|session| {
                for id in 1..=count {
                    session.persist(&EntityRef::new(Person::new(
                        id,
                        format!("person-{id}"),
                        20 + (id % 50) as i32,
                    )))?;
                }
                Ok(())
            })
            .expect("Failed to populate unit");
        test.journal().clear();
        test
    }

    /// Creates a unit holding Alice and Bob plus one account each.
    pub fn people_with_accounts() -> TestUnit {
        let test = TestUnit::seeded();
        test.unit
            .transaction(|session| {
                session.persist(&EntityRef::new(Account::new(10, ALICE, 10_000)))?;
                session.persist(&EntityRef::new(Account::new(20, BOB, 2_500)))?;
                Ok(())
            })
            .expect("Failed to create accounts");
        test.journal().clear();
        test
    }
}
