//! Conversion between entity fields and stored documents.
//!
//! Entities carry plain JSON values; the store holds BSON. Values cross the
//! boundary through extended JSON, so `{"$oid": ..}` and `{"$date": ..}` shapes
//! map to their native BSON types and back.

use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use crate::query::STORE_ID_FIELD;
use bson::{Bson, Document};
use serde_json::{Map, Value};

/// Converts one JSON value to BSON.
pub fn value_to_bson(field: &str, value: &Value) -> CoreResult<Bson> {
    Bson::try_from(value.clone()).map_err(|e| CoreError::conversion(field, e.to_string()))
}

/// Converts a field mapping to a document, preserving field order.
pub fn fields_to_document(fields: &Map<String, Value>) -> CoreResult<Document> {
    let mut doc = Document::new();
    for (name, value) in fields {
        doc.insert(name.clone(), value_to_bson(name, value)?);
    }
    Ok(doc)
}

/// Splits a stored document into its identity and plain fields.
///
/// `_id` is removed from the fields. An `ObjectId` identity is rendered as
/// hex; a string identity is kept as-is; anything else uses its relaxed
/// extended JSON text.
pub fn document_to_fields(mut doc: Document) -> (Option<EntityId>, Map<String, Value>) {
    let id = doc.remove(STORE_ID_FIELD).map(|raw| match raw {
        Bson::ObjectId(oid) => EntityId::from_object_id(oid),
        Bson::String(s) => EntityId::new(s),
        other => EntityId::new(other.into_relaxed_extjson().to_string()),
    });

    let fields = doc
        .into_iter()
        .map(|(k, v)| (k, v.into_relaxed_extjson()))
        .collect();

    (id, fields)
}
