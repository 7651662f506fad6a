//! Property-based test generators using proptest.
//!
//! Provides strategies for identities, connection strings, entities and
//! queries that satisfy the store's input rules.

use mongostore_core::{Entity, EntityKind, Query};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for 24-character lowercase hex identities.
pub fn object_id_hex_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9a-f]{24}").expect("Invalid regex")
}

/// Strategy for identities that are not valid object ids.
pub fn invalid_id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[0-9a-f]{1,23}").expect("Invalid regex"),
        prop::string::string_regex("[0-9a-f]{25,30}").expect("Invalid regex"),
        prop::string::string_regex("[g-z]{24}").expect("Invalid regex"),
    ]
}

/// Strategy for host names.
pub fn host_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}(\\.[a-z]{2,6})?").expect("Invalid regex")
}

/// Strategy for `(host, port)` endpoints with valid ports.
pub fn endpoint_strategy() -> impl Strategy<Value = (String, u16)> {
    (host_strategy(), 1u16..=65535)
}

/// Strategy for connection strings with their expected endpoints.
///
/// Always names a database, `app`.
pub fn connection_string_strategy() -> impl Strategy<Value = (String, Vec<(String, u16)>)> {
    prop::collection::vec(endpoint_strategy(), 1..6).prop_map(|endpoints| {
        let hosts: Vec<String> = endpoints
            .iter()
            .map(|(host, port)| format!("{host}:{port}"))
            .collect();
        (format!("mongodb://{}/app", hosts.join(",")), endpoints)
    })
}

/// Strategy for entity field names: never `id`, never a control key.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}")
        .expect("Invalid regex")
        .prop_filter("Field name must not be the identity", |s| s != "id")
}

/// Strategy for scalar field values that survive a trip through the store.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Strategy for plain field maps.
pub fn fields_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(field_name_strategy(), scalar_value_strategy(), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for unsaved entities of `kind`.
pub fn entity_strategy(kind: EntityKind) -> impl Strategy<Value = Entity> {
    fields_strategy().prop_map(move |fields| {
        Entity::from_fields(kind.clone(), fields).expect("Generated fields are valid")
    })
}

/// Strategy for filter-only queries with optional sort, limit and skip.
pub fn query_strategy() -> impl Strategy<Value = Query> {
    (
        fields_strategy(),
        prop::option::of((field_name_strategy(), prop_oneof![Just(1), Just(-1)])),
        prop::option::of(1u64..100),
        prop::option::of(1u64..100),
    )
        .prop_map(|(filters, sort, limit, skip)| {
            let mut query = Query::from(filters);
            if let Some((field, direction)) = sort {
                query = query.sort(field, direction);
            }
            if let Some(n) = limit {
                query = query.limit(n);
            }
            if let Some(n) = skip {
                query = query.skip(n);
            }
            query
        })
}
