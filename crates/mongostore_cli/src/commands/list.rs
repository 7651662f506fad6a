//! List command implementation.

use mongostore_core::Entity;
use mongostore_engine::StoreOptions;
use serde_json::Value;

/// Runs the list command.
pub async fn run(
    options: StoreOptions,
    kind: &str,
    query: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let proto = Entity::new(super::parse_kind(kind)?);
    let query = super::parse_query(query)?;

    let store = super::connect(options).await?;
    let entities = store.list(&proto, &query).await?;
    store.close().await?;

    let rendered: Vec<Value> = entities.iter().map(Entity::to_json).collect();
    super::print_json(&rendered)
}
