//! # UnitWork Storage
//!
//! Storage backend contract and implementations for UnitWork.
//!
//! This crate is the lowest layer of UnitWork. A backend executes single
//! write commands and read queries against a table of rows. It knows nothing
//! about identity maps, snapshots or write-behind queues; those live in
//! `unitwork_core`.
//!
//! ## Design Principles
//!
//! - Work happens inside a [`StorageTransaction`]; writes stay provisional
//!   until `commit` and vanish on `rollback`
//! - Backends must be `Send + Sync` so several sessions can share one
//! - A backend built `with_journal` records every statement in its [`Journal`]
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral stores
//! - [`FileBackend`] - Committed rows persisted as a CBOR document
//!
//! ## Example
//!
//! ```rust
//! use unitwork_storage::{Filter, InMemoryBackend, ReadQuery, RecordKey, StorageBackend, WriteCommand};
//! use std::collections::BTreeMap;
//!
//! let backend = InMemoryBackend::new();
//! let mut txn = backend.begin().unwrap();
//! txn.execute_write(&WriteCommand::Insert {
//!     key: RecordKey::new("members", 1),
//!     fields: BTreeMap::new(),
//! })
//! .unwrap();
//! txn.commit().unwrap();
//!
//! let mut txn = backend.begin().unwrap();
//! let rows = txn.execute_read(&ReadQuery::new("members", Filter::Id(1))).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod command;
mod error;
mod file;
mod journal;
mod memory;
mod record;
mod table;

pub use backend::{StorageBackend, StorageTransaction};
pub use command::{Filter, ReadQuery, WriteCommand};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use journal::{Journal, Statement};
pub use memory::InMemoryBackend;
pub use record::{render_value, Fields, RecordKey, Row, Value};
