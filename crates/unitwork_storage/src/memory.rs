//! In-memory storage backend for testing.

use crate::backend::{StorageBackend, StorageTransaction};
use crate::command::{ReadQuery, WriteCommand};
use crate::error::{StorageError, StorageResult};
use crate::journal::{Journal, Statement};
use crate::record::{Fields, RecordKey, Row};
use crate::table::Table;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;

/// Injected failures.
#[derive(Debug, Default)]
struct Faults {
    writes: HashSet<RecordKey>,
    reads: bool,
}

/// An in-memory storage backend.
///
/// This backend keeps the committed rows in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// Each transaction works on a private copy of the committed table taken at
/// `begin`; its writes are replayed onto the shared table at `commit`.
///
/// Cloning the backend yields another handle to the same rows, journal and
/// fault plan, so a test can keep one handle while a unit of work owns
/// another.
///
/// Statements are only journaled after [`with_journal`](Self::with_journal);
/// a long-lived backend without it keeps no history.
///
/// # Example
///
/// ```rust
/// use unitwork_storage::{InMemoryBackend, RecordKey, StorageBackend, WriteCommand};
/// use std::collections::BTreeMap;
///
/// let backend = InMemoryBackend::new();
/// let mut txn = backend.begin().unwrap();
/// let key = RecordKey::new("members", 1);
/// txn.execute_write(&WriteCommand::Insert { key: key.clone(), fields: BTreeMap::new() })
///     .unwrap();
/// assert!(backend.get(&key).is_none());
/// txn.commit().unwrap();
/// assert!(backend.get(&key).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    table: Arc<RwLock<Table>>,
    journal: Journal,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend holding the given committed rows.
    #[must_use]
    pub fn with_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::from_rows(rows))),
            ..Self::default()
        }
    }

    /// Turns on statement journaling.
    ///
    /// Call this before cloning: handles cloned earlier keep the old,
    /// disabled journal.
    #[must_use]
    pub fn with_journal(mut self) -> Self {
        self.journal = Journal::new();
        self
    }

    /// Replaces every committed row.
    ///
    /// Bypasses transactions and the journal; meant for seeding.
    pub fn replace_rows(&self, rows: impl IntoIterator<Item = Row>) {
        *self.table.write() = Table::from_rows(rows);
    }

    /// Returns the committed fields for a key.
    #[must_use]
    pub fn get(&self, key: &RecordKey) -> Option<Fields> {
        self.table.read().get(key).cloned()
    }

    /// Returns all committed rows in key order.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.table.read().rows()
    }

    /// Returns the committed rows of one entity type.
    #[must_use]
    pub fn rows_of(&self, entity_type: &str) -> Vec<Row> {
        self.rows()
            .into_iter()
            .filter(|r| r.key.entity_type == entity_type)
            .collect()
    }

    /// Returns the number of committed rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if there are no committed rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a handle to the statement journal.
    ///
    /// The handle is inert unless [`with_journal`](Self::with_journal) was
    /// called.
    #[must_use]
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Makes every subsequent write targeting `key` fail.
    pub fn fail_writes_on(&self, key: RecordKey) {
        self.faults.lock().writes.insert(key);
    }

    /// Makes every subsequent read fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.faults.lock().reads = fail;
    }

    /// Removes every injected failure.
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.writes.clear();
        faults.reads = false;
    }

    pub(crate) fn open_transaction(&self) -> InMemoryTransaction {
        InMemoryTransaction {
            backend: self.clone(),
            working: self.table.read().clone(),
            writes: Vec::new(),
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>> {
        Ok(Box::new(self.open_transaction()))
    }
}

/// A transaction against an [`InMemoryBackend`].
#[derive(Debug)]
pub(crate) struct InMemoryTransaction {
    backend: InMemoryBackend,
    /// Private copy of the table including this transaction's writes.
    working: Table,
    /// Writes to replay on commit.
    writes: Vec<WriteCommand>,
}

impl InMemoryTransaction {
    /// Replays this transaction's writes onto the committed table.
    ///
    /// All-or-nothing: the writes are applied to a copy which replaces the
    /// committed table only if every write succeeds and `before_install`
    /// accepts the result. The table lock is held throughout, so no other
    /// commit can interleave.
    pub(crate) fn commit_with<F>(self, before_install: F) -> StorageResult<()>
    where
        F: FnOnce(&Table) -> StorageResult<()>,
    {
        {
            let mut table = self.backend.table.write();
            let mut next = table.clone();
            for command in &self.writes {
                next.apply(command)?;
            }
            before_install(&next)?;
            *table = next;
        }
        self.backend.journal.record(Statement::Commit);
        Ok(())
    }
}

impl StorageTransaction for InMemoryTransaction {
    fn execute_write(&mut self, command: &WriteCommand) -> StorageResult<()> {
        if self.backend.faults.lock().writes.contains(command.key()) {
            return Err(StorageError::rejected(format!(
                "injected failure on {}",
                command.key()
            )));
        }
        self.working.apply(command)?;
        self.writes.push(command.clone());
        self.backend.journal.record(Statement::Write(command.clone()));
        Ok(())
    }

    fn execute_read(&mut self, query: &ReadQuery) -> StorageResult<Vec<Row>> {
        if self.backend.faults.lock().reads {
            return Err(StorageError::rejected(format!("injected failure on {query}")));
        }
        let rows = self.working.select(query);
        self.backend.journal.record(Statement::Select {
            query: query.clone(),
            rows: rows.len(),
        });
        Ok(rows)
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        self.commit_with(|_| Ok(()))
    }

    fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.backend.journal.record(Statement::Rollback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Filter;
    use crate::record::Value;

    fn key(id: i64) -> RecordKey {
        RecordKey::new("members", id)
    }

    fn row(id: i64, age: i64) -> Row {
        let mut fields = Fields::new();
        fields.insert("age".into(), Value::from(age));
        Row::new(key(id), fields)
    }

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_empty());
        assert!(backend.journal().is_empty());
    }

    #[test]
    fn backend_without_journal_records_nothing() {
        let backend = InMemoryBackend::with_rows(vec![row(1, 30)]);
        for age in 31..40 {
            let mut txn = backend.begin().unwrap();
            txn.execute_read(&ReadQuery::new("members", Filter::Id(1))).unwrap();
            txn.execute_write(&WriteCommand::Update { key: key(1), fields: row(1, age).fields })
                .unwrap();
            txn.commit().unwrap();
        }

        assert_eq!(backend.get(&key(1)), Some(row(1, 39).fields));
        assert!(!backend.journal().is_enabled());
        assert_eq!(backend.journal().len(), 0);
    }

    #[test]
    fn journal_is_shared_by_later_clones() {
        let backend = InMemoryBackend::new().with_journal();
        let handle = backend.clone();
        let txn = handle.begin().unwrap();
        txn.commit().unwrap();
        assert_eq!(backend.journal().rendered(), vec!["commit"]);
    }

    #[test]
    fn writes_are_invisible_until_commit() {
        let backend = InMemoryBackend::new();
        let mut txn = backend.begin().unwrap();
        let r = row(1, 30);
        txn.execute_write(&WriteCommand::Insert {
            key: r.key.clone(),
            fields: r.fields.clone(),
        })
        .unwrap();

        let mut other = backend.begin().unwrap();
        assert!(other
            .execute_read(&ReadQuery::new("members", Filter::Id(1)))
            .unwrap()
            .is_empty());

        txn.commit().unwrap();
        assert_eq!(backend.rows(), vec![r]);
    }

    #[test]
    fn transaction_reads_its_own_writes() {
        let backend = InMemoryBackend::with_rows(vec![row(1, 30)]);
        let mut txn = backend.begin().unwrap();
        txn.execute_write(&WriteCommand::Update {
            key: key(1),
            fields: row(1, 40).fields,
        })
        .unwrap();

        let rows = txn.execute_read(&ReadQuery::new("members", Filter::Id(1))).unwrap();
        assert_eq!(rows[0].get("age"), Some(&Value::from(40)));
        assert_eq!(backend.get(&key(1)), Some(row(1, 30).fields));
    }

    #[test]
    fn rollback_discards_writes() {
        let backend = InMemoryBackend::with_rows(vec![row(1, 30)]).with_journal();
        let mut txn = backend.begin().unwrap();
        txn.execute_write(&WriteCommand::Delete { key: key(1) }).unwrap();
        txn.rollback().unwrap();

        assert_eq!(backend.rows(), vec![row(1, 30)]);
        assert_eq!(
            backend.journal().rendered(),
            vec!["delete members#1", "rollback"]
        );
    }

    #[test]
    fn failed_commit_applies_nothing() {
        let backend = InMemoryBackend::with_rows(vec![row(1, 30), row(2, 25)]);

        let mut first = backend.begin().unwrap();
        first
            .execute_write(&WriteCommand::Update { key: key(1), fields: row(1, 41).fields })
            .unwrap();
        first.execute_write(&WriteCommand::Delete { key: key(2) }).unwrap();

        // A concurrent transaction removes row 2 first.
        let mut second = backend.begin().unwrap();
        second.execute_write(&WriteCommand::Delete { key: key(2) }).unwrap();
        second.commit().unwrap();

        let result = first.commit();
        assert!(matches!(result, Err(StorageError::RowNotFound { .. })));
        assert_eq!(backend.get(&key(1)), Some(row(1, 30).fields));
    }

    #[test]
    fn injected_write_failure() {
        let backend = InMemoryBackend::with_rows(vec![row(1, 30)]).with_journal();
        backend.fail_writes_on(key(1));

        let mut txn = backend.begin().unwrap();
        let result = txn.execute_write(&WriteCommand::Delete { key: key(1) });
        assert!(matches!(result, Err(StorageError::Rejected { .. })));
        assert!(backend.journal().is_empty());

        backend.clear_faults();
        txn.execute_write(&WriteCommand::Delete { key: key(1) }).unwrap();
    }

    #[test]
    fn injected_read_failure() {
        let backend = InMemoryBackend::new();
        backend.fail_reads(true);
        let mut txn = backend.begin().unwrap();
        assert!(txn.execute_read(&ReadQuery::new("members", Filter::All)).is_err());
    }

    #[test]
    fn replace_rows_resets_table() {
        let backend = InMemoryBackend::with_rows(vec![row(1, 30)]);
        backend.replace_rows(vec![row(2, 25), row(3, 20)]);
        assert_eq!(backend.len(), 2);
        assert!(backend.get(&key(1)).is_none());
        assert_eq!(backend.rows_of("members").len(), 2);
    }
}
