//! Statement journal.
//!
//! When enabled, every statement that reaches a backend is appended here in
//! execution order. The journal is how tests (and the CLI) observe what a
//! unit of work actually sent to storage, and when. Backends leave it off
//! unless asked, so long-running stores keep no history.

use crate::command::{ReadQuery, WriteCommand};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// One executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// A read query and the number of rows it returned.
    Select {
        /// The query.
        query: ReadQuery,
        /// Rows returned.
        rows: usize,
    },
    /// A write command.
    Write(WriteCommand),
    /// A storage transaction committed.
    Commit,
    /// A storage transaction rolled back.
    Rollback,
}

impl Statement {
    /// Returns true for insert, update and delete statements.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select { query, .. } => write!(f, "{query}"),
            Self::Write(command) => write!(f, "{command}"),
            Self::Commit => f.write_str("commit"),
            Self::Rollback => f.write_str("rollback"),
        }
    }
}

/// A shareable, append-only statement log.
///
/// Cloning a journal yields another handle to the same log. The default
/// journal is disabled: it drops every statement and always reads empty.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Option<Arc<Mutex<Vec<Statement>>>>,
}

impl Journal {
    /// Creates an empty, enabled journal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Some(Arc::default()),
        }
    }

    /// Creates a journal that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns true if statements are being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Appends a statement.
    pub fn record(&self, statement: Statement) {
        if let Some(entries) = &self.entries {
            entries.lock().push(statement);
        }
    }

    /// Returns a copy of all statements.
    #[must_use]
    pub fn entries(&self) -> Vec<Statement> {
        self.entries
            .as_ref()
            .map_or_else(Vec::new, |entries| entries.lock().clone())
    }

    /// Returns every statement rendered as text.
    #[must_use]
    pub fn rendered(&self) -> Vec<String> {
        self.render_where(|_| true)
    }

    /// Returns only the write statements, rendered as text.
    #[must_use]
    pub fn writes(&self) -> Vec<String> {
        self.render_where(Statement::is_write)
    }

    /// Returns the number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every statement.
    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }

    fn render_where(&self, keep: impl Fn(&Statement) -> bool) -> Vec<String> {
        let Some(entries) = &self.entries else {
            return Vec::new();
        };
        entries
            .lock()
            .iter()
            .filter(|s| keep(s))
            .map(ToString::to_string)
            .collect()
    }
}
