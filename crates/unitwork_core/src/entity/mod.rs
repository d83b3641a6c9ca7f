//! Entity trait and field conversion.
//!
//! An entity is any `serde` struct with a stable type tag and an `i64`
//! identifier. The session never inspects entity types directly: it converts
//! them to [`Fields`] for snapshots, dirty checks and write payloads.

mod handle;

pub use handle::EntityRef;
pub(crate) use handle::{same_instance, ManagedInstance};

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use unitwork_storage::{Fields, RecordKey, Row, Value};

/// Name of the identifier field in an entity's fields.
pub const ID_FIELD: &str = "id";

/// Trait for types that can be managed by a session.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use unitwork_core::Entity;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Member {
///     id: i64,
///     name: String,
///     age: i32,
/// }
///
/// impl Entity for Member {
///     const ENTITY_TYPE: &'static str = "members";
///
///     fn id(&self) -> i64 {
///         self.id
///     }
/// }
/// ```
pub trait Entity: Clone + Serialize + DeserializeOwned + 'static {
    /// Entity type tag. Rows of this entity live under this type.
    const ENTITY_TYPE: &'static str;

    /// Returns the identifier. Must not change while the entity is managed.
    fn id(&self) -> i64;

    /// Returns the record key of this entity.
    fn key(&self) -> RecordKey {
        RecordKey::new(Self::ENTITY_TYPE, self.id())
    }
}

/// Flattens an entity into named fields.
pub(crate) fn to_fields<T: Entity>(entity: &T) -> CoreResult<Fields> {
    let value = Value::serialized(entity)
        .map_err(|e| CoreError::codec(format!("cannot encode {}: {e}", T::ENTITY_TYPE)))?;
    let Value::Map(pairs) = value else {
        return Err(CoreError::codec(format!(
            "{} must serialize as a struct",
            T::ENTITY_TYPE
        )));
    };
    pairs
        .into_iter()
        .map(|(name, value)| match name {
            Value::Text(name) => Ok((name, value)),
            other => Err(CoreError::codec(format!(
                "{} has a non-text field name {other:?}",
                T::ENTITY_TYPE
            ))),
        })
        .collect()
}

/// Rebuilds an entity from a stored row.
///
/// The identifier is taken from the row key when the row does not carry an
/// `id` field of its own.
pub(crate) fn from_row<T: Entity>(row: &Row) -> CoreResult<T> {
    let mut pairs: Vec<(Value, Value)> = row
        .fields
        .iter()
        .map(|(name, value)| (Value::Text(name.clone()), value.clone()))
        .collect();
    if !row.fields.contains_key(ID_FIELD) {
        pairs.push((Value::Text(ID_FIELD.to_string()), Value::from(row.key.id)));
    }
    let entity: T = Value::Map(pairs)
        .deserialized()
        .map_err(|e| CoreError::codec(format!("cannot decode {}: {e}", row.key)))?;
    if entity.key() != row.key {
        return Err(CoreError::codec(format!(
            "row {} decoded as {}",
            row.key,
            entity.key()
        )));
    }
    Ok(entity)
}
