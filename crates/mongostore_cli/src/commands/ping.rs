//! Ping command implementation.

use mongostore_engine::StoreOptions;
use std::time::Instant;

/// Runs the ping command.
pub async fn run(options: StoreOptions) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let store = super::connect(options).await?;
    let native = store.native().await?;
    println!(
        "ok: {} via {} (generation {}) in {:?}",
        store.name(),
        store.manager().driver().name(),
        native.generation(),
        started.elapsed()
    );
    store.close().await?;
    Ok(())
}
