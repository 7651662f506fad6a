//! Query metadata: sort, limit, skip and projection.

use crate::convert::fields_to_document;
use crate::error::{CoreError, CoreResult};
use bson::Document;
use serde_json::{Map, Value};
use std::fmt;

/// Sort direction of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// Direction from a numeric sort value: negative means descending.
    pub fn from_number(n: f64) -> Self {
        if n < 0.0 {
            Self::Descending
        } else {
            Self::Ascending
        }
    }

    /// Parses a direction from a JSON value (`1`, `-1`, `"asc"`, `"descending"`, ...).
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Number(n) => Ok(Self::from_number(n.as_f64().unwrap_or(1.0))),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascending" => Ok(Self::Ascending),
                "desc" | "descending" => Ok(Self::Descending),
                _ => Err(CoreError::invalid_query(format!("unknown sort direction: {s}"))),
            },
            other => Err(CoreError::invalid_query(format!(
                "unknown sort direction: {other}"
            ))),
        }
    }

    /// Lowercase name of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }

    /// Numeric form used in store sort documents.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort on.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

impl SortSpec {
    /// Creates a sort key.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Metadata half of a translated query.
///
/// Unset members leave the corresponding driver option at its default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaDoc {
    /// Sort keys in priority order.
    pub sort: Option<Vec<SortSpec>>,
    /// Maximum number of results.
    pub limit: Option<i64>,
    /// Number of results to skip.
    pub skip: Option<u64>,
    /// Projection document.
    pub fields: Option<Document>,
}

impl MetaDoc {
    /// Returns true if no member is set.
    pub fn is_empty(&self) -> bool {
        self.sort.is_none() && self.limit.is_none() && self.skip.is_none() && self.fields.is_none()
    }

    /// Sort keys as a store sort document (`{field: 1|-1}`).
    pub fn sort_document(&self) -> Option<Document> {
        self.sort.as_ref().map(|keys| {
            keys.iter()
                .map(|k| (k.field.clone(), bson::Bson::Int32(k.direction.as_i32())))
                .collect()
        })
    }

    /// Parses store-native metadata, as passed through `native$`.
    ///
    /// Recognized keys: `sort` (an array of `[field, direction]` pairs or a
    /// `{field: n}` object), `limit`, `skip`, and `fields` or `projection`.
    pub fn from_native(value: &Value) -> CoreResult<Self> {
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(CoreError::invalid_query(format!(
                    "native meta must be an object, got {other}"
                )))
            }
        };

        let sort = match map.get("sort") {
            None | Some(Value::Null) => None,
            Some(Value::Array(pairs)) => Some(
                pairs
                    .iter()
                    .map(parse_sort_pair)
                    .collect::<CoreResult<Vec<_>>>()?,
            ),
            Some(Value::Object(keys)) => Some(
                keys.iter()
                    .map(|(f, d)| Ok(SortSpec::new(f.clone(), SortDirection::from_value(d)?)))
                    .collect::<CoreResult<Vec<_>>>()?,
            ),
            Some(other) => {
                return Err(CoreError::invalid_query(format!("invalid native sort: {other}")))
            }
        };

        let fields = match map.get("fields").or_else(|| map.get("projection")) {
            None | Some(Value::Null) => None,
            Some(v) => Some(projection(v)?),
        };

        Ok(Self {
            sort,
            limit: map.get("limit").map(|v| count_i64("limit", v)).transpose()?,
            skip: map.get("skip").map(|v| count_u64("skip", v)).transpose()?,
            fields,
        })
    }

    /// Renders the metadata as JSON, with sort as `[[field, direction]]`.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        if let Some(sort) = &self.sort {
            let pairs = sort
                .iter()
                .map(|k| Value::Array(vec![k.field.clone().into(), k.direction.as_str().into()]))
                .collect();
            out.insert("sort".into(), Value::Array(pairs));
        }
        if let Some(limit) = self.limit {
            out.insert("limit".into(), limit.into());
        }
        if let Some(skip) = self.skip {
            out.insert("skip".into(), skip.into());
        }
        if let Some(fields) = &self.fields {
            out.insert(
                "fields".into(),
                bson::Bson::Document(fields.clone()).into_relaxed_extjson(),
            );
        }
        Value::Object(out)
    }
}

fn parse_sort_pair(pair: &Value) -> CoreResult<SortSpec> {
    match pair {
        Value::Array(items) => match items.as_slice() {
            [Value::String(field)] => Ok(SortSpec::new(field.clone(), SortDirection::Ascending)),
            [Value::String(field), dir] => {
                Ok(SortSpec::new(field.clone(), SortDirection::from_value(dir)?))
            }
            _ => Err(CoreError::invalid_query(format!("invalid sort pair: {pair}"))),
        },
        Value::String(field) => Ok(SortSpec::new(field.clone(), SortDirection::Ascending)),
        other => Err(CoreError::invalid_query(format!("invalid sort pair: {other}"))),
    }
}

/// Builds a projection from an object or an array of field names.
pub(crate) fn projection(value: &Value) -> CoreResult<Document> {
    match value {
        Value::Object(map) => fields_to_document(map),
        Value::Array(names) => {
            let mut doc = Document::new();
            for name in names {
                match name {
                    Value::String(s) => {
                        doc.insert(s.clone(), 1_i32);
                    }
                    other => {
                        return Err(CoreError::invalid_query(format!(
                            "projection field must be a string, got {other}"
                        )))
                    }
                }
            }
            Ok(doc)
        }
        other => Err(CoreError::invalid_query(format!(
            "projection must be an object or array, got {other}"
        ))),
    }
}

pub(crate) fn count_i64(key: &str, value: &Value) -> CoreResult<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| CoreError::invalid_query(format!("{key} must be an integer, got {value}")))
}

pub(crate) fn count_u64(key: &str, value: &Value) -> CoreResult<u64> {
    let n = count_i64(key, value)?;
    u64::try_from(n)
        .map_err(|_| CoreError::invalid_query(format!("{key} must not be negative, got {n}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    #[test]
    fn direction_from_number() {
        assert_eq!(SortDirection::from_number(-1.0), SortDirection::Descending);
        assert_eq!(SortDirection::from_number(0.0), SortDirection::Ascending);
        assert_eq!(SortDirection::from_number(5.0), SortDirection::Ascending);
    }

    #[test]
    fn native_sort_pairs_and_objects() {
        let meta = MetaDoc::from_native(&json!({"sort": [["a", "desc"], ["b", 1]]})).unwrap();
        assert_eq!(
            meta.sort.unwrap(),
            vec![
                SortSpec::new("a", SortDirection::Descending),
                SortSpec::new("b", SortDirection::Ascending)
            ]
        );

        let meta = MetaDoc::from_native(&json!({"sort": {"c": -1}})).unwrap();
        assert_eq!(meta.sort_document(), Some(doc! {"c": -1}));
    }

    #[test]
    fn native_projection_aliases() {
        let meta = MetaDoc::from_native(&json!({"projection": {"name": 1}})).unwrap();
        assert_eq!(meta.fields, Some(doc! {"name": 1}));
    }

    #[test]
    fn native_rejects_bad_limit() {
        assert!(MetaDoc::from_native(&json!({"limit": "ten"})).is_err());
        assert!(MetaDoc::from_native(&json!({"skip": -1})).is_err());
    }

    #[test]
    fn projection_from_array() {
        assert_eq!(projection(&json!(["a", "b"])).unwrap(), doc! {"a": 1, "b": 1});
        assert!(projection(&json!([1])).is_err());
    }

    #[test]
    fn json_rendering() {
        let meta = MetaDoc {
            sort: Some(vec![SortSpec::new("age", SortDirection::Descending)]),
            limit: Some(5),
            ..MetaDoc::default()
        };
        assert_eq!(meta.to_json(), json!({"sort": [["age", "descending"]], "limit": 5}));
        assert!(MetaDoc::default().is_empty());
    }
}
