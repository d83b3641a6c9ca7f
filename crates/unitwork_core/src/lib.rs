//! # UnitWork Core
//!
//! Persistence context and unit-of-work engine.
//!
//! This crate provides:
//! - An identity map: within one session, one key resolves to one instance
//! - Snapshot-based dirty checking: changes to managed entities are written
//!   without any explicit save
//! - A write-behind action queue drained as inserts, then updates, then
//!   deletes
//! - Flush coordination: explicit, before direct queries, and at commit
//! - Sessions bound to storage transactions, and ephemeral one-shot
//!   sessions for calls made outside of one
//!
//! ## Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use unitwork_core::{Entity, EntityRef, PersistenceUnit, Query};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Member {
//!     id: i64,
//!     name: String,
//!     age: i32,
//! }
//!
//! impl Entity for Member {
//!     const ENTITY_TYPE: &'static str = "members";
//!     fn id(&self) -> i64 {
//!         self.id
//!     }
//! }
//!
//! let unit = PersistenceUnit::open_in_memory();
//! let mut session = unit.begin().unwrap();
//!
//! let alice = EntityRef::new(Member { id: 1, name: "Alice".into(), age: 30 });
//! session.persist(&alice).unwrap();
//!
//! // The direct query flushes the pending insert first.
//! let found = session.query::<Member>(&Query::by_id(1)).unwrap();
//! assert!(found[0].ptr_eq(&alice));
//!
//! alice.update(|m| m.age = 31);
//! session.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod config;
mod context;
mod entity;
mod error;
mod flush;
mod query;
mod repository;
mod session;
mod stats;
mod types;
mod unit;

pub use action::{ActionKind, ActionQueue, EntityAction};
pub use config::{Config, FlushMode};
pub use entity::{Entity, EntityRef, ID_FIELD};
pub use error::{CoreError, CoreResult};
pub use flush::{FlushReport, FlushTrigger};
pub use query::Query;
pub use repository::Repository;
pub use session::Session;
pub use stats::{StatsSnapshot, UnitStats};
pub use types::{EntityStatus, SessionId, SessionState};
pub use unit::PersistenceUnit;

pub use unitwork_storage::{Fields, RecordKey, Row, Value};

/// UnitWork version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
