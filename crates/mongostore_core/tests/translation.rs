//! Query translation and conversion properties.

use bson::{doc, oid::ObjectId, Bson};
use mongostore_core::{
    document_to_fields, fields_to_document, to_filter, to_meta, Entity, EntityKind, Query,
    SortDirection,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn field_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}".prop_filter("not the identity", |s| s != "id")
}

fn control_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("sort$".to_string()),
        Just("limit$".to_string()),
        Just("skip$".to_string()),
        Just("fields$".to_string()),
        Just("load$".to_string()),
        Just("all$".to_string()),
        "[a-z]{1,6}\\$",
    ]
}

proptest! {
    #[test]
    fn control_keys_never_reach_the_filter(
        filters in prop::collection::btree_map(field_name(), any::<i32>(), 0..5),
        controls in prop::collection::btree_set(control_key(), 0..4),
    ) {
        let mut map = Map::new();
        for (k, v) in &filters {
            map.insert(k.clone(), json!(v));
        }
        for key in &controls {
            // Falsy control values so no control takes effect.
            map.insert(key.clone(), Value::Bool(false));
        }

        let filter = to_filter(&Query::from(map)).unwrap();
        prop_assert_eq!(filter.len(), filters.len());
        for (k, v) in &filters {
            prop_assert_eq!(filter.get_i32(k).unwrap(), *v);
        }
    }

    #[test]
    fn falsy_controls_count_as_absent(limit in prop_oneof![Just(json!(0)), Just(json!(false)), Just(Value::Null)]) {
        let query = Query::from_value(json!({"limit$": limit, "skip$": 0, "sort$": null})).unwrap();
        prop_assert!(to_meta(&query).unwrap().is_empty());
    }

    #[test]
    fn sort_sign_picks_direction(n in -1000i32..1000) {
        let meta = to_meta(&Query::new().sort("f", n)).unwrap();
        let sort = meta.sort.unwrap();
        let expected = if n < 0 { SortDirection::Descending } else { SortDirection::Ascending };
        prop_assert_eq!(sort[0].direction, expected);
    }
}

#[test]
fn id_becomes_object_id() {
    let oid = ObjectId::new();
    let query = Query::new().eq("id", oid.to_hex()).eq("name", "x");
    assert_eq!(to_filter(&query).unwrap(), doc! {"_id": oid, "name": "x"});
}

#[test]
fn projection_shorthands_agree() {
    let from_list = to_meta(&Query::new().fields(["a", "b"])).unwrap();
    let from_object =
        to_meta(&Query::from_value(json!({"fields$": {"a": 1, "b": 1}})).unwrap()).unwrap();
    assert_eq!(from_list.fields, from_object.fields);
    assert_eq!(from_list.fields, Some(doc! {"a": 1, "b": 1}));
}

#[test]
fn stored_document_maps_back_to_entity() {
    let oid = ObjectId::new();
    let stored = doc! {"_id": oid, "name": "alice", "age": 30, "tags": ["x"]};

    let (id, fields) = document_to_fields(stored);
    let entity = Entity::from_fields(EntityKind::new("user"), fields)
        .unwrap()
        .with_id(id.unwrap());

    assert_eq!(entity.id().unwrap().as_str(), oid.to_hex());
    assert_eq!(
        entity.to_json(),
        json!({"id": oid.to_hex(), "name": "alice", "age": 30, "tags": ["x"]})
    );

    let back = fields_to_document(entity.fields()).unwrap();
    assert_eq!(back.get("age"), Some(&Bson::Int32(30)));
    assert!(back.get("_id").is_none());
}
