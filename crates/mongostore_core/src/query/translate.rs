//! Translation of abstract queries to filter and meta documents.

use super::meta::{count_i64, count_u64, projection};
use super::{MetaDoc, Query, SortDirection, SortSpec, ID_FIELD, STORE_ID_FIELD};
use crate::convert::{fields_to_document, value_to_bson};
use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use bson::{Bson, Document};
use serde_json::Value;

/// Builds the filter document for `query`.
///
/// Control keys are dropped and `id` becomes `_id` as an `ObjectId`. With
/// `native$` the filter is the payload itself, or its first element when the
/// payload is an array.
pub fn to_filter(query: &Query) -> CoreResult<Document> {
    if let Some(payload) = query.native_payload() {
        let filter = match payload {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        };
        return match filter {
            Value::Object(map) => fields_to_document(map),
            Value::Null => Ok(Document::new()),
            other => Err(CoreError::invalid_query(format!(
                "native filter must be an object, got {other}"
            ))),
        };
    }

    let mut filter = Document::new();
    for (field, value) in query.filters() {
        if field == ID_FIELD && super::truthy(value) {
            filter.insert(STORE_ID_FIELD, id_to_bson(value)?);
        } else {
            filter.insert(field, value_to_bson(field, value)?);
        }
    }
    Ok(filter)
}

/// Builds the metadata for `query`.
///
/// Falsy control values count as absent. With `native$` the metadata comes
/// from the payload's second element, and is empty when the payload is not
/// an array.
pub fn to_meta(query: &Query) -> CoreResult<MetaDoc> {
    if let Some(payload) = query.native_payload() {
        return match payload {
            Value::Array(items) => items
                .get(1)
                .map_or_else(|| Ok(MetaDoc::default()), MetaDoc::from_native),
            _ => Ok(MetaDoc::default()),
        };
    }

    let mut meta = MetaDoc::default();

    if let Some(sort) = query.control("sort$") {
        let Value::Object(keys) = sort else {
            return Err(CoreError::invalid_query(format!(
                "sort$ must be an object, got {sort}"
            )));
        };
        // Only the first declared field counts.
        if let Some((field, dir)) = keys.iter().next() {
            let direction = SortDirection::from_number(dir.as_f64().unwrap_or(1.0));
            meta.sort = Some(vec![SortSpec::new(field.clone(), direction)]);
        }
    }

    if let Some(limit) = query.control("limit$") {
        meta.limit = Some(count_i64("limit$", limit)?);
    }
    if let Some(skip) = query.control("skip$") {
        meta.skip = Some(count_u64("skip$", skip)?);
    }
    if let Some(fields) = query.control("fields$") {
        meta.fields = Some(projection(fields)?);
    }

    Ok(meta)
}

fn id_to_bson(value: &Value) -> CoreResult<Bson> {
    match value {
        Value::String(s) => Ok(Bson::ObjectId(EntityId::new(s.as_str()).to_object_id()?)),
        other => Err(CoreError::invalid_id(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use serde_json::json;

    fn q(value: Value) -> Query {
        Query::from_value(value).unwrap()
    }

    #[test]
    fn filter_and_meta_from_control_keys() {
        let query = q(json!({"name": "x", "sort$": {"age": -1}, "limit$": 5}));

        assert_eq!(to_filter(&query).unwrap(), doc! {"name": "x"});

        let meta = to_meta(&query).unwrap();
        assert_eq!(meta.sort, Some(vec![SortSpec::new("age", SortDirection::Descending)]));
        assert_eq!(meta.limit, Some(5));
        assert_eq!(meta.skip, None);
        assert_eq!(meta.to_json(), json!({"sort": [["age", "descending"]], "limit": 5}));
    }

    #[test]
    fn native_payload_pair() {
        let query = q(json!({"native$": [{"foo": 1}, {"limit": 2}]}));
        assert_eq!(to_filter(&query).unwrap(), doc! {"foo": 1});
        assert_eq!(to_meta(&query).unwrap().to_json(), json!({"limit": 2}));
    }

    #[test]
    fn native_payload_object_has_empty_meta() {
        let query = q(json!({"native$": {"foo": 1}, "limit$": 3}));
        assert_eq!(to_filter(&query).unwrap(), doc! {"foo": 1});
        assert!(to_meta(&query).unwrap().is_empty());
    }

    #[test]
    fn native_takes_precedence_over_fields() {
        let query = q(json!({"name": "ignored", "native$": [{"foo": 1}]}));
        assert_eq!(to_filter(&query).unwrap(), doc! {"foo": 1});
        assert!(to_meta(&query).unwrap().is_empty());
    }

    #[test]
    fn id_becomes_object_id() {
        let oid = ObjectId::new();
        let query = q(json!({"id": oid.to_hex(), "name": "x"}));
        assert_eq!(to_filter(&query).unwrap(), doc! {"_id": oid, "name": "x"});
    }

    #[test]
    fn malformed_id_is_rejected() {
        let err = to_filter(&q(json!({"id": "not-hex"}))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidId { .. }));

        let err = to_filter(&q(json!({"id": 42}))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidId { .. }));
    }

    #[test]
    fn falsy_controls_are_absent() {
        let query = q(json!({"limit$": 0, "skip$": null, "fields$": false, "sort$": 0}));
        assert!(to_meta(&query).unwrap().is_empty());
        assert_eq!(to_filter(&query).unwrap(), Document::new());
    }

    #[test]
    fn only_first_sort_field_used() {
        let query = q(json!({"sort$": {"b": 1, "a": -1}}));
        let meta = to_meta(&query).unwrap();
        assert_eq!(meta.sort, Some(vec![SortSpec::new("b", SortDirection::Ascending)]));
    }

    #[test]
    fn fields_shorthand() {
        let query = q(json!({"fields$": ["name", "age"], "skip$": 2}));
        let meta = to_meta(&query).unwrap();
        assert_eq!(meta.fields, Some(doc! {"name": 1, "age": 1}));
        assert_eq!(meta.skip, Some(2));
    }
}
