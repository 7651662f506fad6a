//! Connection lifecycle.

use crate::config::StoreOptions;
use crate::driver::{DriverCollection, DriverConnection, StoreDriver};
use crate::error::{StoreError, StoreResult};
use crate::resolver::CollectionResolver;
use mongostore_core::EntityKind;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// An open connection tagged with its generation.
pub struct LiveConnection {
    generation: u64,
    handle: Arc<dyn DriverConnection>,
}

impl LiveConnection {
    /// Wraps a driver connection.
    pub fn new(generation: u64, handle: Arc<dyn DriverConnection>) -> Self {
        Self { generation, handle }
    }

    /// Generation number; increases with every (re)open.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The driver connection.
    pub fn handle(&self) -> &Arc<dyn DriverConnection> {
        &self.handle
    }
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Owns the store's single live connection.
///
/// Other components borrow the connection through [`live`](Self::live); it is
/// replaced as a unit by [`reopen`](Self::reopen), which also clears the
/// collection cache.
pub struct ConnectionManager {
    driver: Arc<dyn StoreDriver>,
    options: StoreOptions,
    live: RwLock<Option<Arc<LiveConnection>>>,
    generation: AtomicU64,
    // Set until the first connect and again by close.
    closed: AtomicBool,
    resolver: CollectionResolver,
}

impl ConnectionManager {
    /// Creates a manager holding no connection.
    pub fn new(driver: Arc<dyn StoreDriver>, options: StoreOptions) -> Self {
        Self {
            driver,
            options,
            live: RwLock::new(None),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(true),
            resolver: CollectionResolver::new(),
        }
    }

    /// The store options.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The driver in use.
    pub fn driver(&self) -> &Arc<dyn StoreDriver> {
        &self.driver
    }

    /// Opens the connection as configured.
    ///
    /// Returns `Ok(None)` without connecting when the options defer the
    /// connection.
    pub async fn open(&self) -> StoreResult<Option<Arc<LiveConnection>>> {
        if self.options.defers_connect() {
            debug!("connection deferred");
            return Ok(None);
        }
        self.connect().await.map(Some)
    }

    /// Opens the connection, replacing any current one.
    pub async fn connect(&self) -> StoreResult<Arc<LiveConnection>> {
        self.closed.store(false, Ordering::SeqCst);
        self.release().await;
        let handle = self.establish().await?;
        Ok(self.install(handle))
    }

    /// Closes the current connection, if any, and opens a new one.
    ///
    /// Fails with [`StoreError::NotConnected`] once the manager has been
    /// closed, including when [`close`](Self::close) runs while the new
    /// connection is being established.
    pub async fn reopen(&self) -> StoreResult<Arc<LiveConnection>> {
        if self.is_closed() {
            return Err(StoreError::NotConnected);
        }
        debug!("reopening connection");
        self.release().await;
        let handle = self.establish().await?;
        if self.is_closed() {
            let _ = handle.close().await;
            return Err(StoreError::NotConnected);
        }
        Ok(self.install(handle))
    }

    /// The live connection.
    pub fn live(&self) -> StoreResult<Arc<LiveConnection>> {
        self.live.read().clone().ok_or(StoreError::NotConnected)
    }

    /// Whether the connection was never opened or has been closed.
    ///
    /// A manager that lost its connection to a failed reopen is not closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether a connection is held.
    pub fn is_connected(&self) -> bool {
        self.live.read().is_some()
    }

    /// Generation of the most recently opened connection; zero before the first.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Resolves the collection for `kind` on the live connection.
    pub fn collection(&self, kind: &EntityKind) -> StoreResult<Arc<dyn DriverCollection>> {
        let live = self.live()?;
        Ok(self.resolver.resolve(&live, kind))
    }

    /// The collection cache.
    pub fn resolver(&self) -> &CollectionResolver {
        &self.resolver
    }

    /// Releases the connection. Idempotent.
    pub async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        let current = self.live.write().take();
        self.resolver.invalidate();
        if let Some(live) = current {
            live.handle().close().await?;
            info!("connection closed (generation {})", live.generation());
        }
        Ok(())
    }

    /// Opens and, when credentials are configured, authenticates.
    async fn establish(&self) -> StoreResult<Arc<dyn DriverConnection>> {
        let descriptor = self.options.descriptor()?;
        descriptor.resolve_endpoints()?;

        let handle = self.driver.open(&descriptor).await?;

        if let Some(credentials) = &descriptor.credentials {
            if let Err(err) = handle.authenticate(credentials).await {
                // Authentication is never retried.
                let _ = handle.close().await;
                return Err(err);
            }
            debug!("db open and authed for {}", credentials.username);
        }

        info!(
            "connection open: {} {:?} database {}",
            self.driver.name(),
            descriptor.mode,
            descriptor.database.as_deref().unwrap_or("-")
        );
        Ok(handle)
    }

    fn install(&self, handle: Arc<dyn DriverConnection>) -> Arc<LiveConnection> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let live = Arc::new(LiveConnection::new(generation, handle));
        *self.live.write() = Some(Arc::clone(&live));
        self.resolver.invalidate();
        live
    }

    async fn release(&self) {
        let previous = self.live.write().take();
        if let Some(previous) = previous {
            self.resolver.invalidate();
            if let Err(err) = previous.handle().close().await {
                debug!("closing generation {} failed: {}", previous.generation(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use crate::error::ErrorClass;

    fn manager(driver: &MemoryDriver, options: StoreOptions) -> ConnectionManager {
        ConnectionManager::new(Arc::new(driver.clone()), options)
    }

    #[tokio::test]
    async fn open_and_close() {
        let driver = MemoryDriver::new();
        let mgr = manager(&driver, StoreOptions::new().with_name("app"));

        let live = mgr.open().await.unwrap().unwrap();
        assert_eq!(live.generation(), 1);
        assert!(mgr.is_connected());

        mgr.close().await.unwrap();
        mgr.close().await.unwrap();
        assert!(!mgr.is_connected());
        assert_eq!(driver.close_count(), 1);
        assert!(matches!(mgr.live(), Err(StoreError::NotConnected)));
        assert!(mgr.is_closed());
    }

    #[tokio::test]
    async fn failed_reopen_is_not_a_close() {
        let driver = MemoryDriver::new();
        let mgr = manager(&driver, StoreOptions::new().with_name("app"));
        assert!(mgr.is_closed());
        mgr.open().await.unwrap();
        assert!(!mgr.is_closed());

        driver.disconnect();
        assert!(mgr.reopen().await.is_err());
        assert!(!mgr.is_connected());
        assert!(!mgr.is_closed());

        driver.restore();
        assert_eq!(mgr.reopen().await.unwrap().generation(), 2);
    }

    #[tokio::test]
    async fn closed_manager_refuses_reopen() {
        let driver = MemoryDriver::new();
        let mgr = manager(&driver, StoreOptions::new().with_name("app"));
        mgr.open().await.unwrap();
        mgr.close().await.unwrap();

        assert!(matches!(mgr.reopen().await, Err(StoreError::NotConnected)));
        assert_eq!(driver.open_count(), 1);

        mgr.connect().await.unwrap();
        assert!(!mgr.is_closed());
    }

    #[tokio::test]
    async fn deferred_open_connects_nothing() {
        let driver = MemoryDriver::new();
        let mgr = manager(&driver, StoreOptions::new().with_name("app").with_connect(false));

        assert!(mgr.open().await.unwrap().is_none());
        assert_eq!(driver.open_count(), 0);

        mgr.connect().await.unwrap();
        assert!(mgr.is_connected());
    }

    #[tokio::test]
    async fn reopen_bumps_generation_and_clears_cache() {
        let driver = MemoryDriver::new();
        let mgr = manager(&driver, StoreOptions::new().with_name("app"));
        mgr.open().await.unwrap();

        mgr.collection(&EntityKind::new("items")).unwrap();
        assert_eq!(mgr.resolver().len(), 1);

        let live = mgr.reopen().await.unwrap();
        assert_eq!(live.generation(), 2);
        assert!(mgr.resolver().is_empty());
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn authentication_failure_is_fatal() {
        let driver = MemoryDriver::new();
        driver.reject_credentials(true);
        let mgr = manager(
            &driver,
            StoreOptions::new().with_name("app").with_credentials("u", "p"),
        );

        let err = mgr.open().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Authentication);
        assert!(!mgr.is_connected());
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn no_authentication_without_credentials() {
        let driver = MemoryDriver::new();
        driver.reject_credentials(true);
        let mgr = manager(&driver, StoreOptions::new().with_name("app"));

        mgr.open().await.unwrap();
        assert_eq!(driver.auth_count(), 0);
    }

    #[tokio::test]
    async fn bad_port_fails_at_connect() {
        let driver = MemoryDriver::new();
        let options = StoreOptions::from_json_str(r#"{"name": "app", "port": "nope"}"#).unwrap();
        let mgr = manager(&driver, options);

        let err = mgr.open().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert_eq!(driver.open_count(), 0);
    }
}
