//! The member entity and the store the CLI works against.

use crate::commands::Options;
use crate::error::CliResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use unitwork_core::{Config, Entity, EntityRef, PersistenceUnit};
use unitwork_storage::{FileBackend, InMemoryBackend, Journal, StorageBackend};

/// Identifier of the seeded member "Alice".
pub const ALICE: i64 = 1;
/// Identifier of the seeded member "Bob".
pub const BOB: i64 = 2;

/// A club member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: i32,
}

impl Member {
    /// Creates a member.
    pub fn new(id: i64, name: impl Into<String>, age: i32) -> Self {
        Self {
            id,
            name: name.into(),
            age,
        }
    }
}

impl Entity for Member {
    const ENTITY_TYPE: &'static str = "members";

    fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}  {:<12} {:>3}", self.id, self.name, self.age)
    }
}

/// Alice (30) and Bob (25).
pub fn seed_members() -> Vec<Member> {
    vec![Member::new(ALICE, "Alice", 30), Member::new(BOB, "Bob", 25)]
}

enum Backend {
    Memory(InMemoryBackend),
    File(Arc<FileBackend>),
}

/// A persistence unit plus direct access to its backend.
pub struct Workbench {
    /// The unit scenarios run against.
    pub unit: PersistenceUnit,
    backend: Backend,
}

impl Workbench {
    /// Opens the store named by `options`: a file store when a path is
    /// given, otherwise an empty in-memory store.
    pub fn open(options: &Options) -> CliResult<Self> {
        let config = Config::new().show_statements(options.show_statements);
        let (backend, shared) = match &options.path {
            Some(path) => {
                let file = Arc::new(FileBackend::open(path)?.with_journal());
                debug!(path = %path.display(), "using file store");
                let shared: Arc<dyn StorageBackend> = file.clone();
                (Backend::File(file), shared)
            }
            None => {
                let memory = InMemoryBackend::new().with_journal();
                let shared: Arc<dyn StorageBackend> = Arc::new(memory.clone());
                (Backend::Memory(memory), shared)
            }
        };

        Ok(Self {
            unit: PersistenceUnit::new(shared, config),
            backend,
        })
    }

    /// Empties the store and commits the seed members through the unit.
    ///
    /// The journal is cleared afterwards so it only shows what follows.
    pub fn reseed(&self) -> CliResult<()> {
        match &self.backend {
            Backend::Memory(memory) => memory.replace_rows(Vec::new()),
            Backend::File(file) => file.replace_rows(Vec::new())?,
        }

        self.unit.transaction(|session| {
            for member in seed_members() {
                session.persist(&EntityRef::new(member))?;
            }
            Ok(())
        })?;
        self.journal().clear();
        Ok(())
    }

    /// Returns the backend's statement journal.
    pub fn journal(&self) -> Journal {
        match &self.backend {
            Backend::Memory(memory) => memory.journal(),
            Backend::File(file) => file.journal(),
        }
    }

    /// Loads every stored member in its own short session.
    pub fn members(&self) -> CliResult<Vec<Member>> {
        let members = self.unit.repository::<Member>().find_all(None)?;
        Ok(members.iter().map(EntityRef::get).collect())
    }
}
