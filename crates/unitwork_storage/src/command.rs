//! Write commands and read queries.

use crate::record::{render_value, Fields, RecordKey, Row, Value};
use std::fmt;

/// A single write statement.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    /// Insert a new row.
    Insert {
        /// Key of the new row.
        key: RecordKey,
        /// Field values of the new row.
        fields: Fields,
    },
    /// Replace the field values of an existing row.
    Update {
        /// Key of the row.
        key: RecordKey,
        /// New field values.
        fields: Fields,
    },
    /// Delete an existing row.
    Delete {
        /// Key of the row.
        key: RecordKey,
    },
}

impl WriteCommand {
    /// Returns the key this command targets.
    #[must_use]
    pub fn key(&self) -> &RecordKey {
        match self {
            Self::Insert { key, .. } | Self::Update { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Returns the statement verb.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

impl fmt::Display for WriteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.key())
    }
}

/// Row filter of a read query.
///
/// There is no query language; filters are plain values.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every row of the entity type.
    All,
    /// The row with this identifier.
    Id(i64),
    /// Rows whose field equals the value.
    FieldEq {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
}

impl Filter {
    /// Returns true if the row passes the filter.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::All => true,
            Self::Id(id) => row.key.id == *id,
            Self::FieldEq { field, value } => row.fields.get(field) == Some(value),
        }
    }
}

/// A read query against one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadQuery {
    /// Entity type to read.
    pub entity_type: String,
    /// Row filter.
    pub filter: Filter,
}

impl ReadQuery {
    /// Creates a read query.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, filter: Filter) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter,
        }
    }
}

impl fmt::Display for ReadQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select {}", self.entity_type)?;
        match &self.filter {
            Filter::All => Ok(()),
            Filter::Id(id) => write!(f, " where id = {id}"),
            Filter::FieldEq { field, value } => {
                write!(f, " where {field} = {}", render_value(value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, age: i64) -> Row {
        let mut fields = Fields::new();
        fields.insert("age".into(), Value::from(age));
        Row::new(RecordKey::new("members", id), fields)
    }

    #[test]
    fn filter_matches() {
        assert!(Filter::All.matches(&row(1, 30)));
        assert!(Filter::Id(1).matches(&row(1, 30)));
        assert!(!Filter::Id(2).matches(&row(1, 30)));

        let by_age = Filter::FieldEq {
            field: "age".into(),
            value: Value::from(30),
        };
        assert!(by_age.matches(&row(1, 30)));
        assert!(!by_age.matches(&row(1, 31)));
    }

    #[test]
    fn missing_field_never_matches() {
        let filter = Filter::FieldEq {
            field: "name".into(),
            value: Value::Null,
        };
        assert!(!filter.matches(&row(1, 30)));
    }

    #[test]
    fn statement_rendering() {
        let key = RecordKey::new("members", 2);
        assert_eq!(WriteCommand::Delete { key }.to_string(), "delete members#2");

        let query = ReadQuery::new(
            "members",
            Filter::FieldEq {
                field: "name".into(),
                value: Value::from("Bob"),
            },
        );
        assert_eq!(query.to_string(), "select members where name = 'Bob'");
        assert_eq!(
            ReadQuery::new("members", Filter::Id(1)).to_string(),
            "select members where id = 1"
        );
    }
}
