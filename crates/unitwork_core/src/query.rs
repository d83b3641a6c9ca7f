//! Direct queries.

use unitwork_storage::{Filter, ReadQuery, Value};

/// A query that bypasses the identity map and reads storage directly.
///
/// Direct queries see pending changes only after they have been flushed,
/// which is why a session in auto flush mode flushes before running one.
/// Their results are still resolved through the identity map.
///
/// # Example
///
/// ```rust
/// use unitwork_core::Query;
///
/// let adults = Query::field_eq("age", 30);
/// let everyone = Query::all();
/// assert_ne!(adults, everyone);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    filter: Filter,
}

impl Query {
    /// Every entity of the queried type.
    #[must_use]
    pub fn all() -> Self {
        Self {
            filter: Filter::All,
        }
    }

    /// The entity with this identifier.
    #[must_use]
    pub fn by_id(id: i64) -> Self {
        Self {
            filter: Filter::Id(id),
        }
    }

    /// Entities whose field equals the value.
    #[must_use]
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            filter: Filter::FieldEq {
                field: field.into(),
                value: value.into(),
            },
        }
    }

    /// Returns the row filter.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub(crate) fn to_read(&self, entity_type: &str) -> ReadQuery {
        ReadQuery::new(entity_type, self.filter.clone())
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_as_select() {
        assert_eq!(Query::all().to_read("members").to_string(), "select members");
        assert_eq!(
            Query::by_id(1).to_read("members").to_string(),
            "select members where id = 1"
        );
        assert_eq!(
            Query::field_eq("name", "Bob").to_read("members").to_string(),
            "select members where name = 'Bob'"
        );
    }
}
