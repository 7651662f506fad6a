//! The abstract query object.

use super::{truthy, ID_FIELD, RESERVED_MARKER};
use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An abstract entity query: field filters plus `$`-suffixed control keys.
///
/// # Example
///
/// ```rust
/// use mongostore_core::Query;
/// use serde_json::json;
///
/// let q = Query::new().eq("name", "x").sort("age", -1).limit(5);
/// assert_eq!(q.as_json(), json!({"name": "x", "sort$": {"age": -1}, "limit$": 5}).as_object().unwrap());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Map<String, Value>);

impl Query {
    /// Creates an empty query matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(CoreError::invalid_query(format!(
                "query must be an object, got {other}"
            ))),
        }
    }

    /// Creates a query selecting one identity.
    pub fn by_id(id: &EntityId) -> Self {
        Self::new().eq(ID_FIELD, id.as_str())
    }

    /// Returns true if `key` is a control key.
    pub fn is_reserved(key: &str) -> bool {
        key.ends_with(RESERVED_MARKER)
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Sets the sort field; negative `direction` sorts descending.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, direction: i32) -> Self {
        let mut spec = Map::new();
        spec.insert(field.into(), Value::from(direction));
        self.0.insert("sort$".into(), Value::Object(spec));
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.0.insert("limit$".into(), Value::from(n));
        self
    }

    /// Sets the number of results to skip.
    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.0.insert("skip$".into(), Value::from(n));
        self
    }

    /// Restricts the returned fields.
    #[must_use]
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(|s| Value::String(s.into())).collect();
        self.0.insert("fields$".into(), Value::Array(names));
        self
    }

    /// Sets whether `remove` returns the removed entity.
    #[must_use]
    pub fn load(mut self, load: bool) -> Self {
        self.0.insert("load$".into(), Value::Bool(load));
        self
    }

    /// Sets whether `remove` acts on every match.
    #[must_use]
    pub fn all(mut self, all: bool) -> Self {
        self.0.insert("all$".into(), Value::Bool(all));
        self
    }

    /// Passes a store-native filter, and optionally meta, through verbatim.
    #[must_use]
    pub fn native(mut self, filter: Value, meta: Option<Value>) -> Self {
        let payload = match meta {
            Some(meta) => Value::Array(vec![filter, meta]),
            None => filter,
        };
        self.0.insert("native$".into(), payload);
        self
    }

    /// Returns a raw entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a control entry if it is set to a truthy value.
    pub(crate) fn control(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| truthy(v))
    }

    /// Field filter entries, control keys excluded.
    pub fn filters(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0
            .iter()
            .filter(|(k, _)| !Self::is_reserved(k))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Whether `remove` acts on every match (`all$`, default false).
    pub fn acts_on_all(&self) -> bool {
        self.control("all$").is_some()
    }

    /// Whether `remove` returns the removed entity (`load$`, default true).
    pub fn loads_result(&self) -> bool {
        self.0.get("load$").map_or(true, truthy)
    }

    /// The native payload, if one is set.
    pub fn native_payload(&self) -> Option<&Value> {
        self.control("native$")
    }

    /// Returns the underlying JSON object.
    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Query {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Query {
    type Error = CoreError;

    fn try_from(value: Value) -> CoreResult<Self> {
        Self::from_value(value)
    }
}
