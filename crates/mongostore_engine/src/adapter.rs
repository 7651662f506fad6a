//! Host adapter: the operation table and the init protocol.

use crate::config::StoreOptions;
use crate::driver::StoreDriver;
use crate::error::{StoreFailure, StoreResult};
use crate::store::{ErrorHandler, NativeHandle, Store, STORE_NAME};
use futures::future::BoxFuture;
use mongostore_core::{Entity, Query};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Future returned by table entries.
pub type OpFuture<'a, T> = BoxFuture<'a, Result<T, StoreFailure>>;

/// Entry points a host dispatches entity operations through.
#[derive(Clone, Copy)]
pub struct StoreOps {
    /// Saves an entity.
    pub save: for<'a> fn(&'a Store, &'a Entity) -> OpFuture<'a, Entity>,
    /// Loads the first match.
    pub load: for<'a> fn(&'a Store, &'a Entity, &'a Query) -> OpFuture<'a, Option<Entity>>,
    /// Lists every match.
    pub list: for<'a> fn(&'a Store, &'a Entity, &'a Query) -> OpFuture<'a, Vec<Entity>>,
    /// Removes one or every match.
    pub remove: for<'a> fn(&'a Store, &'a Entity, &'a Query) -> OpFuture<'a, Option<Entity>>,
    /// Exposes the driver connection.
    pub native: for<'a> fn(&'a Store) -> OpFuture<'a, NativeHandle>,
    /// Releases the connection.
    pub close: for<'a> fn(&'a Store) -> OpFuture<'a, ()>,
    /// Replaces the error handler.
    pub set_error_handler: fn(&Store, Arc<dyn ErrorHandler>),
    /// Sets the description used in logs.
    pub set_description: fn(&Store, String),
}

impl StoreOps {
    /// The table backed by [`Store`].
    pub fn table() -> Self {
        Self {
            save: save_entry,
            load: load_entry,
            list: list_entry,
            remove: remove_entry,
            native: native_entry,
            close: close_entry,
            set_error_handler: |store, handler| store.set_error_handler(handler),
            set_description: |store, description| store.set_description(description),
        }
    }
}

fn save_entry<'a>(store: &'a Store, entity: &'a Entity) -> OpFuture<'a, Entity> {
    Box::pin(store.save(entity))
}

fn load_entry<'a>(store: &'a Store, proto: &'a Entity, query: &'a Query) -> OpFuture<'a, Option<Entity>> {
    Box::pin(store.load(proto, query))
}

fn list_entry<'a>(store: &'a Store, proto: &'a Entity, query: &'a Query) -> OpFuture<'a, Vec<Entity>> {
    Box::pin(store.list(proto, query))
}

fn remove_entry<'a>(store: &'a Store, proto: &'a Entity, query: &'a Query) -> OpFuture<'a, Option<Entity>> {
    Box::pin(store.remove(proto, query))
}

fn native_entry(store: &Store) -> OpFuture<'_, NativeHandle> {
    Box::pin(store.native())
}

fn close_entry(store: &Store) -> OpFuture<'_, ()> {
    Box::pin(store.close())
}

impl fmt::Debug for StoreOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOps").finish_non_exhaustive()
    }
}

/// What the host reports after accepting a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Host-assigned tag identifying this store instance.
    pub tag: String,
    /// Human-readable description used in logs.
    pub description: String,
}

/// The host side of the init protocol.
pub trait EntityHost: Send + Sync {
    /// Accepts the operation table and options of a store.
    fn register(
        &self,
        store_name: &str,
        ops: StoreOps,
        options: &StoreOptions,
    ) -> StoreResult<Registration>;
}

/// A store that completed init.
#[derive(Debug, Clone)]
pub struct Initialized {
    /// Store name.
    pub name: String,
    /// Tag reported by the host.
    pub tag: String,
    /// The store.
    pub store: Store,
}

/// Configures and opens a store, then registers it with `host`.
///
/// Steps run in order: configure, open (and authenticate when credentials
/// are given), register. Any failure completes init with an
/// `entity/configure` failure and skips the remaining steps.
pub async fn init(
    host: &dyn EntityHost,
    driver: Arc<dyn StoreDriver>,
    options: StoreOptions,
) -> Result<Initialized, StoreFailure> {
    let store = Store::new(driver, options);
    let ops = StoreOps::table();

    let opened = store
        .open()
        .await
        .map_err(|e| StoreFailure::configure(STORE_NAME, "init", e))?;

    let registration = match host.register(store.name(), ops, store.options()) {
        Ok(registration) => registration,
        Err(e) => {
            // Registration failed: do not leak the connection.
            let _ = store.close().await;
            return Err(StoreFailure::configure(STORE_NAME, "init", e));
        }
    };
    (ops.set_description)(&store, registration.description.clone());

    info!(
        "{} initialized as {} (connected: {})",
        registration.description, registration.tag, opened
    );

    Ok(Initialized {
        name: store.name().to_string(),
        tag: registration.tag,
        store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use crate::error::{ErrorClass, FailureCode, StoreError};
    use mongostore_core::EntityKind;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Host {
        refuse: bool,
        tables: Mutex<Vec<(String, StoreOps)>>,
    }

    impl EntityHost for Host {
        fn register(
            &self,
            store_name: &str,
            ops: StoreOps,
            options: &StoreOptions,
        ) -> StoreResult<Registration> {
            if self.refuse {
                return Err(StoreError::configuration("store already registered"));
            }
            self.tables.lock().push((store_name.to_string(), ops));
            Ok(Registration {
                tag: "t1".into(),
                description: format!("{}~{}", store_name, options.name.as_deref().unwrap_or("-")),
            })
        }
    }

    #[tokio::test]
    async fn init_opens_then_registers() {
        let host = Host::default();
        let driver = MemoryDriver::new();
        let done = init(&host, Arc::new(driver.clone()), StoreOptions::new().with_name("app"))
            .await
            .unwrap();

        assert_eq!(done.name, "mongo-store");
        assert_eq!(done.tag, "t1");
        assert_eq!(done.store.description().as_deref(), Some("mongo-store~app"));
        assert!(done.store.manager().is_connected());
        assert_eq!(host.tables.lock().len(), 1);
    }

    #[tokio::test]
    async fn table_dispatches_to_store() {
        let host = Host::default();
        let driver = MemoryDriver::new();
        let done = init(&host, Arc::new(driver.clone()), StoreOptions::new().with_name("app"))
            .await
            .unwrap();
        let ops = host.tables.lock()[0].1;
        let proto = Entity::new(EntityKind::new("item"));

        let saved = (ops.save)(&done.store, &proto.clone().with_field("a", json!(1)))
            .await
            .unwrap();
        let query = Query::by_id(saved.id().unwrap());
        let loaded = (ops.load)(&done.store, &proto, &query).await.unwrap();
        assert_eq!(loaded, Some(saved));

        let listed = (ops.list)(&done.store, &proto, &Query::new()).await.unwrap();
        assert_eq!(listed.len(), 1);

        (ops.native)(&done.store).await.unwrap();
        (ops.remove)(&done.store, &proto, &query).await.unwrap();
        (ops.set_description)(&done.store, "renamed".into());
        assert_eq!(done.store.description().as_deref(), Some("renamed"));

        (ops.close)(&done.store).await.unwrap();
        assert!(!done.store.manager().is_connected());
    }

    #[tokio::test]
    async fn authentication_failure_is_configure_failure() {
        let host = Host::default();
        let driver = MemoryDriver::new();
        driver.reject_credentials(true);
        let options = StoreOptions::new().with_name("app").with_credentials("u", "p");

        let failure = init(&host, Arc::new(driver.clone()), options).await.unwrap_err();
        assert_eq!(failure.code, FailureCode::Configure);
        assert_eq!(failure.class(), ErrorClass::Authentication);
        assert!(host.tables.lock().is_empty());
        assert_eq!(driver.open_count(), 1);
    }

    #[tokio::test]
    async fn refused_registration_closes_connection() {
        let host = Host {
            refuse: true,
            ..Host::default()
        };
        let driver = MemoryDriver::new();

        let failure = init(&host, Arc::new(driver.clone()), StoreOptions::new().with_name("app"))
            .await
            .unwrap_err();
        assert_eq!(failure.code, FailureCode::Configure);
        assert_eq!(failure.to_string().split(' ').next(), Some("entity/configure"));
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn deferred_init_registers_without_connecting() {
        let host = Host::default();
        let driver = MemoryDriver::new();
        let options = StoreOptions::new().with_name("app").with_connect(false);

        let done = init(&host, Arc::new(driver.clone()), options).await.unwrap();
        assert!(!done.store.manager().is_connected());
        assert_eq!(driver.open_count(), 0);
    }
}
