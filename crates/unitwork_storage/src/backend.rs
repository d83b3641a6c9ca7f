//! Storage backend trait definitions.

use crate::command::{ReadQuery, WriteCommand};
use crate::error::StorageResult;
use crate::record::Row;

/// A storage backend for UnitWork.
///
/// A backend hands out [`StorageTransaction`]s. All reads and writes go
/// through one; the backend itself only owns the committed state and
/// whatever concurrency control it applies between transactions.
///
/// # Invariants
///
/// - Writes executed inside a transaction are invisible to other
///   transactions until `commit` succeeds
/// - `rollback` leaves the committed state exactly as it was at `begin`
///   (modulo commits by other transactions)
/// - Backends must be `Send + Sync` so several units of work can share one
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Starts a new storage transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a transaction
    /// (closed, locked, I/O failure).
    fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>>;
}

/// One storage-level transaction.
///
/// The session drives exactly one of these for its whole lifetime. Writes
/// are issued one command at a time by the action queue drain; reads are
/// issued by identity-map misses and direct queries.
pub trait StorageTransaction: Send {
    /// Executes a single write command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command violates a row-level constraint
    /// (duplicate key, missing row) or the backend rejects it.
    fn execute_write(&mut self, command: &WriteCommand) -> StorageResult<()>;

    /// Executes a read query and returns the matching rows in key order.
    ///
    /// Reads observe the transaction's own provisional writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to evaluate the query.
    fn execute_read(&mut self, query: &ReadQuery) -> StorageResult<Vec<Row>>;

    /// Makes every write of this transaction durable and visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the writes cannot be applied to the committed
    /// state; in that case nothing is applied.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails; the provisional
    /// writes are discarded regardless.
    fn rollback(self: Box<Self>) -> StorageResult<()>;
}
