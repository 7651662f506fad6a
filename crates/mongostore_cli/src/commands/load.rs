//! Load command implementation.

use mongostore_core::Entity;
use mongostore_engine::StoreOptions;

/// Runs the load command.
pub async fn run(
    options: StoreOptions,
    kind: &str,
    query: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let proto = Entity::new(super::parse_kind(kind)?);
    let query = super::parse_query(query)?;

    let store = super::connect(options).await?;
    let found = store.load(&proto, &query).await?;
    store.close().await?;

    super::print_json(&super::entity_json(found.as_ref()))
}
