//! Store fixtures and host helpers.
//!
//! Everything here runs against [`MemoryDriver`], so tests need no server.

use mongostore_core::{Entity, EntityKind};
use mongostore_engine::{
    AutoReconnect, EntityHost, MemoryDriver, Registration, Store, StoreError, StoreOps,
    StoreOptions, StoreResult,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Database name used by fixtures.
pub const TEST_DATABASE: &str = "test";

/// A store over a fresh in-memory driver.
pub struct TestStore {
    /// The store.
    pub store: Store,
    /// The driver behind it, for failure injection and inspection.
    pub driver: MemoryDriver,
}

impl TestStore {
    /// Creates an unopened store on [`TEST_DATABASE`].
    pub fn new() -> Self {
        Self::with_options(StoreOptions::new().with_name(TEST_DATABASE))
    }

    /// Creates an unopened store with custom options.
    pub fn with_options(options: StoreOptions) -> Self {
        let driver = MemoryDriver::new();
        let store = Store::new(Arc::new(driver.clone()), options);
        Self { store, driver }
    }

    /// Creates and opens a store on [`TEST_DATABASE`].
    pub async fn open() -> Self {
        let fixture = Self::new();
        fixture
            .store
            .open()
            .await
            .expect("Failed to open test store");
        fixture
    }

    /// Creates and opens a store in custom reconnect mode with the given waits.
    pub async fn reconnecting(min_wait: Duration, max_wait: Duration) -> Self {
        let options = StoreOptions::new()
            .with_name(TEST_DATABASE)
            .with_autoreconnect(AutoReconnect::Custom)
            .with_waits(min_wait, max_wait);
        let fixture = Self::with_options(options);
        fixture
            .store
            .open()
            .await
            .expect("Failed to open test store");
        fixture
    }

    /// An empty entity of kind `name`, usable as a prototype.
    pub fn proto(&self, name: &str) -> Entity {
        Entity::new(EntityKind::new(name))
    }

    /// Documents stored in `collection` of the test database.
    pub fn stored(&self, collection: &str) -> Vec<bson::Document> {
        self.driver.documents(TEST_DATABASE, collection)
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A registration recorded by [`MemoryHost`].
#[derive(Debug, Clone)]
pub struct HostEntry {
    /// Tag handed back to the store.
    pub tag: String,
    /// Store name.
    pub store_name: String,
    /// The registered table.
    pub ops: StoreOps,
}

/// An [`EntityHost`] that keeps every table it is given.
#[derive(Default)]
pub struct MemoryHost {
    entries: Mutex<Vec<HostEntry>>,
    refuse: Mutex<Option<String>>,
}

impl MemoryHost {
    /// Creates a host accepting every store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses further registrations with `reason`.
    pub fn refuse(&self, reason: impl Into<String>) {
        *self.refuse.lock() = Some(reason.into());
    }

    /// Registrations so far, oldest first.
    pub fn entries(&self) -> Vec<HostEntry> {
        self.entries.lock().clone()
    }

    /// The table registered under `tag`.
    pub fn ops(&self, tag: &str) -> Option<StoreOps> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.tag == tag)
            .map(|entry| entry.ops)
    }
}

impl EntityHost for MemoryHost {
    fn register(
        &self,
        store_name: &str,
        ops: StoreOps,
        options: &StoreOptions,
    ) -> StoreResult<Registration> {
        if let Some(reason) = self.refuse.lock().clone() {
            return Err(StoreError::configuration(reason));
        }

        let tag = Uuid::new_v4().to_string();
        let description = format!(
            "{}/{}/{}",
            store_name,
            options.name.as_deref().unwrap_or("-"),
            &tag[..8]
        );
        self.entries.lock().push(HostEntry {
            tag: tag.clone(),
            store_name: store_name.to_string(),
            ops,
        });

        Ok(Registration { tag, description })
    }
}

/// A JSON options file in a temporary directory.
pub struct ConfigFile {
    /// Path of the file.
    pub path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl ConfigFile {
    /// Writes `options` to `store.json` in a fresh temporary directory.
    pub fn write(options: &Value) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("store.json");
        let text = serde_json::to_string_pretty(options).expect("Failed to render options");
        std::fs::write(&path, text).expect("Failed to write options file");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Loads the file back as store options.
    pub fn load(&self) -> StoreResult<StoreOptions> {
        StoreOptions::from_file(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongostore_engine::init;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_opens() {
        let store = TestStore::open().await;
        let saved = store.save(&store.proto("item")).await.unwrap();
        assert!(saved.id().is_some());
        assert_eq!(store.stored("item").len(), 1);
    }

    #[tokio::test]
    async fn host_records_registrations() {
        let host = MemoryHost::new();
        let driver = MemoryDriver::new();
        let done = init(
            &host,
            Arc::new(driver),
            StoreOptions::new().with_name("app"),
        )
        .await
        .unwrap();

        let entries = host.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].store_name, "mongo-store");
        assert!(host.ops(&done.tag).is_some());
        assert!(done.store.description().unwrap().starts_with("mongo-store/app/"));
    }

    #[tokio::test]
    async fn refusing_host_fails_init() {
        let host = MemoryHost::new();
        host.refuse("duplicate store");

        let failure = init(
            &host,
            Arc::new(MemoryDriver::new()),
            StoreOptions::new().with_name("app"),
        )
        .await
        .unwrap_err();
        assert!(failure.to_string().contains("duplicate store"));
    }

    #[test]
    fn config_file_round_trip() {
        let file = ConfigFile::write(&json!({"name": "app", "port": 27018, "minwait": 10}));
        let options = file.load().unwrap();
        assert_eq!(options.name.as_deref(), Some("app"));
        assert_eq!(options.minwait, Some(10));
    }
}
