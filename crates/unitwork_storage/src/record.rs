//! Record keys, rows and field values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single field value.
///
/// Rows use the CBOR data model so that any `serde` entity can be
/// flattened into fields without a schema.
pub use ciborium::Value;

/// Named field values of one record, ordered by field name.
pub type Fields = BTreeMap<String, Value>;

/// Identifies one record: its entity type tag plus its identifier.
///
/// Keys are unique within a store and within a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Entity type tag (usually the table name).
    pub entity_type: String,
    /// Identifier within the entity type.
    pub id: i64,
}

impl RecordKey {
    /// Creates a record key.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, id: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.id)
    }
}

/// A row as stored by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// The row's key.
    pub key: RecordKey,
    /// The row's field values.
    pub fields: Fields,
}

impl Row {
    /// Creates a row.
    #[must_use]
    pub fn new(key: RecordKey, fields: Fields) -> Self {
        Self { key, fields }
    }

    /// Returns the value of a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Renders a value the way statements print it.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(i) => i128::from(*i).to_string(),
        Value::Float(x) => x.to_string(),
        Value::Text(s) => format!("'{s}'"),
        other => format!("{other:?}"),
    }
}
