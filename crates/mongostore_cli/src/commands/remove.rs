//! Remove command implementation.

use mongostore_core::Entity;
use mongostore_engine::StoreOptions;

/// Runs the remove command.
pub async fn run(
    options: StoreOptions,
    kind: &str,
    query: Option<&str>,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let proto = Entity::new(super::parse_kind(kind)?);
    let mut query = super::parse_query(query)?;
    if all {
        query = query.all(true);
    }

    let store = super::connect(options).await?;
    let removed = store.remove(&proto, &query).await?;
    store.close().await?;

    if all {
        println!("removed all matches");
        Ok(())
    } else {
        super::print_json(&super::entity_json(removed.as_ref()))
    }
}
