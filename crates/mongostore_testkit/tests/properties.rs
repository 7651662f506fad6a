//! Property tests across core and engine.

use mongostore_core::{to_filter, to_meta, EntityId, EntityKind, Query};
use mongostore_engine::{ConnectionMode, StoreOptions};
use mongostore_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn connection_string_endpoints((url, endpoints) in connection_string_strategy()) {
        let descriptor = StoreOptions::new().with_url(url).descriptor().unwrap();

        let mode = if endpoints.len() > 1 { ConnectionMode::ReplicaSet } else { ConnectionMode::Single };
        prop_assert_eq!(descriptor.mode, mode);
        prop_assert_eq!(descriptor.resolve_endpoints().unwrap(), endpoints);
        prop_assert_eq!(descriptor.database_name().unwrap(), "app");
    }

    #[test]
    fn hex_ids_convert(hex in object_id_hex_strategy()) {
        let id = EntityId::new(hex.clone());
        prop_assert_eq!(id.to_object_id().unwrap().to_hex(), hex);
    }

    #[test]
    fn invalid_ids_are_rejected(raw in invalid_id_strategy()) {
        prop_assert!(EntityId::new(raw.clone()).to_object_id().is_err());
        let query = Query::new().eq("id", raw);
        prop_assert!(to_filter(&query).is_err());
    }

    #[test]
    fn filters_pass_through(query in query_strategy()) {
        let filter = to_filter(&query).unwrap();
        let expected: Vec<&str> = query.filters().map(|(k, _)| k).collect();
        let keys: Vec<&str> = filter.keys().map(String::as_str).collect();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn meta_carries_limit_and_skip(query in query_strategy()) {
        let meta = to_meta(&query).unwrap();
        let limit = query.get("limit$").and_then(|v| v.as_i64());
        let skip = query.get("skip$").and_then(|v| v.as_u64());
        prop_assert_eq!(meta.limit, limit);
        prop_assert_eq!(meta.skip, skip);
        prop_assert_eq!(meta.sort.is_some(), query.get("sort$").is_some());
    }
}

#[tokio::test]
async fn generated_entities_round_trip() {
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    let store = TestStore::open().await;
    let strategy = entity_strategy(EntityKind::new("gen"));
    let mut runner = TestRunner::deterministic();

    for _ in 0..32 {
        let entity = strategy.new_tree(&mut runner).unwrap().current();
        let saved = store.save(&entity).await.unwrap();
        let loaded = store
            .load(&store.proto("gen"), &Query::by_id(saved.id().unwrap()))
            .await
            .unwrap();
        assert_eq!(loaded, Some(saved));
    }
    assert_eq!(store.stored("gen").len(), 32);
}
