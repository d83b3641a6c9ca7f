//! Row table shared by the bundled backends.

use crate::command::{ReadQuery, WriteCommand};
use crate::error::{StorageError, StorageResult};
use crate::record::{Fields, RecordKey, Row};
use std::collections::BTreeMap;

/// Rows keyed by record key.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Table {
    rows: BTreeMap<RecordKey, Fields>,
}

impl Table {
    pub(crate) fn from_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.key, r.fields)).collect(),
        }
    }

    /// Applies one write, enforcing row-level constraints.
    pub(crate) fn apply(&mut self, command: &WriteCommand) -> StorageResult<()> {
        match command {
            WriteCommand::Insert { key, fields } => {
                if self.rows.contains_key(key) {
                    return Err(StorageError::DuplicateKey { key: key.clone() });
                }
                self.rows.insert(key.clone(), fields.clone());
            }
            WriteCommand::Update { key, fields } => match self.rows.get_mut(key) {
                Some(existing) => *existing = fields.clone(),
                None => return Err(StorageError::RowNotFound { key: key.clone() }),
            },
            WriteCommand::Delete { key } => {
                if self.rows.remove(key).is_none() {
                    return Err(StorageError::RowNotFound { key: key.clone() });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn select(&self, query: &ReadQuery) -> Vec<Row> {
        self.rows
            .iter()
            .filter(|(key, _)| key.entity_type == query.entity_type)
            .map(|(key, fields)| Row::new(key.clone(), fields.clone()))
            .filter(|row| query.filter.matches(row))
            .collect()
    }

    pub(crate) fn get(&self, key: &RecordKey) -> Option<&Fields> {
        self.rows.get(key)
    }

    pub(crate) fn rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|(key, fields)| Row::new(key.clone(), fields.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}
