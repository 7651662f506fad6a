//! The entity operation executor.

use crate::config::StoreOptions;
use crate::connection::{ConnectionManager, LiveConnection};
use crate::driver::{DriverConnection, StoreDriver};
use crate::error::{StoreError, StoreFailure, StoreResult};
use crate::reconnect::Reconnector;
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongostore_core::{
    document_to_fields, fields_to_document, to_filter, to_meta, Entity, EntityId, Query,
    STORE_ID_FIELD,
};
use parking_lot::RwLock;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name under which the store registers with its host.
pub const STORE_NAME: &str = "mongo-store";

/// Outcome of an [`ErrorHandler`].
#[derive(Debug)]
pub enum Decision {
    /// Re-issue the operation once.
    Retry,
    /// Report the failure to the caller.
    Fail(StoreFailure),
}

/// What an error handler knows about the failing call.
pub struct ErrorContext {
    /// Store name.
    pub store: String,
    /// Host-supplied description, if any.
    pub description: Option<String>,
    /// Operation name (`save`, `load`, ...).
    pub operation: &'static str,
    /// Whether this call is already the retry of an earlier failure.
    pub retried: bool,
    /// The store's connection manager.
    pub manager: Arc<ConnectionManager>,
    /// The store's reconnector.
    pub reconnector: Arc<Reconnector>,
}

impl ErrorContext {
    /// Wraps `error` as this call's `entity/error` failure.
    pub fn failure(&self, error: StoreError) -> StoreFailure {
        StoreFailure::error(&self.store, self.operation, error)
    }

    /// Shorthand for `Decision::Fail(self.failure(error))`.
    pub fn fail(&self, error: StoreError) -> Decision {
        Decision::Fail(self.failure(error))
    }
}

/// The single hook every operation error passes through.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Decides whether the failed call is retried.
    async fn handle(&self, context: &ErrorContext, error: StoreError) -> Decision;
}

/// Reports every error as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFastHandler;

#[async_trait]
impl ErrorHandler for FailFastHandler {
    async fn handle(&self, context: &ErrorContext, error: StoreError) -> Decision {
        context.fail(error)
    }
}

/// Reconnects on connectivity errors and retries the call once.
///
/// A store left without a connection by a failed chain reconnects like one
/// whose connection broke. A store that was never connected, or was closed,
/// fails with [`StoreError::NotConnected`] and is not retried.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconnectingHandler;

#[async_trait]
impl ErrorHandler for ReconnectingHandler {
    async fn handle(&self, context: &ErrorContext, error: StoreError) -> Decision {
        if !error.is_retryable() || context.manager.is_closed() {
            return context.fail(error);
        }

        if context.retried {
            // The retry failed too: report it, but keep trying to recover.
            let manager = Arc::clone(&context.manager);
            let reconnector = Arc::clone(&context.reconnector);
            tokio::spawn(async move {
                if let Err(err) = reconnector.recover(&manager).await {
                    debug!("background reconnect ended: {}", err);
                }
            });
            return context.fail(error);
        }

        warn!("{} failed on {}: {}; reconnecting", context.operation, context.store, error);
        match context.reconnector.recover(&context.manager).await {
            Ok(()) => Decision::Retry,
            Err(err) => context.fail(err),
        }
    }
}

/// Raw access to the live driver connection.
#[derive(Debug, Clone)]
pub struct NativeHandle {
    live: Arc<LiveConnection>,
}

impl NativeHandle {
    /// The driver connection.
    pub fn connection(&self) -> &Arc<dyn DriverConnection> {
        self.live.handle()
    }

    /// Generation of the connection.
    pub fn generation(&self) -> u64 {
        self.live.generation()
    }

    /// The concrete connection, e.g. [`MongoConnection`](crate::MongoConnection).
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.live.handle().as_any().downcast_ref::<T>()
    }
}

struct StoreInner {
    name: String,
    description: RwLock<Option<String>>,
    manager: Arc<ConnectionManager>,
    reconnector: Arc<Reconnector>,
    handler: RwLock<Arc<dyn ErrorHandler>>,
}

/// A document store bound to one database.
///
/// Cheap to clone; clones share the connection.
///
/// # Example
///
/// ```rust
/// use mongostore_core::{Entity, EntityKind, Query};
/// use mongostore_engine::{MemoryDriver, Store, StoreOptions};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Store::new(Arc::new(MemoryDriver::new()), StoreOptions::new().with_name("app"));
/// store.open().await?;
///
/// let proto = Entity::new(EntityKind::new("item"));
/// let saved = store.save(&proto.clone().with_field("n", json!(1))).await?;
///
/// let query = Query::by_id(saved.id().ok_or("no id")?);
/// let loaded = store.load(&proto, &query).await?;
/// assert_eq!(loaded, Some(saved));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Creates a store. Nothing is opened until [`open`](Self::open).
    ///
    /// The error handler follows the auto-reconnect mode: custom mode gets a
    /// [`ReconnectingHandler`], every other mode a [`FailFastHandler`].
    pub fn new(driver: Arc<dyn StoreDriver>, options: StoreOptions) -> Self {
        let handler: Arc<dyn ErrorHandler> = if options.auto_reconnect().is_custom() {
            Arc::new(ReconnectingHandler)
        } else {
            Arc::new(FailFastHandler)
        };
        let reconnector = Arc::new(Reconnector::new(options.reconnect_policy()));

        Self {
            inner: Arc::new(StoreInner {
                name: STORE_NAME.to_string(),
                description: RwLock::new(None),
                manager: Arc::new(ConnectionManager::new(driver, options)),
                reconnector,
                handler: RwLock::new(handler),
            }),
        }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Host-supplied description.
    pub fn description(&self) -> Option<String> {
        self.inner.description.read().clone()
    }

    /// Sets the description attached to log lines.
    pub fn set_description(&self, description: impl Into<String>) {
        *self.inner.description.write() = Some(description.into());
    }

    /// Replaces the error handler.
    pub fn set_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        *self.inner.handler.write() = handler;
    }

    /// The options the store was created with.
    pub fn options(&self) -> &StoreOptions {
        self.inner.manager.options()
    }

    /// The connection manager.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.inner.manager
    }

    /// The reconnector.
    pub fn reconnector(&self) -> &Arc<Reconnector> {
        &self.inner.reconnector
    }

    /// Opens the connection unless the options defer it.
    ///
    /// Returns whether a connection was opened.
    pub async fn open(&self) -> StoreResult<bool> {
        let opened = self.inner.manager.open().await?.is_some();
        if opened {
            self.inner.reconnector.mark_connected();
        }
        Ok(opened)
    }

    /// Opens the connection now, replacing any current one.
    pub async fn connect(&self) -> Result<(), StoreFailure> {
        self.inner
            .manager
            .connect()
            .await
            .map_err(|e| StoreFailure::configure(self.name(), "connect", e))?;
        self.inner.reconnector.mark_connected();
        Ok(())
    }

    /// Releases the connection. Idempotent.
    pub async fn close(&self) -> Result<(), StoreFailure> {
        self.inner
            .manager
            .close()
            .await
            .map_err(|e| StoreFailure::error(self.name(), "close", e))
    }

    /// Saves an entity.
    ///
    /// An entity with identity is upserted by `_id`; one without is inserted
    /// and returned with its generated identity.
    pub async fn save(&self, entity: &Entity) -> Result<Entity, StoreFailure> {
        self.run("save", move || self.save_once(entity)).await
    }

    /// Loads the first match of `query`, built with `proto`'s kind.
    pub async fn load(&self, proto: &Entity, query: &Query) -> Result<Option<Entity>, StoreFailure> {
        self.run("load", move || self.load_once(proto, query)).await
    }

    /// Lists every match of `query`.
    pub async fn list(&self, proto: &Entity, query: &Query) -> Result<Vec<Entity>, StoreFailure> {
        self.run("list", move || self.list_once(proto, query)).await
    }

    /// Removes matches of `query`.
    ///
    /// With `all$` every match is deleted and `None` is returned. Otherwise the
    /// first match is deleted and returned unless `load$` is false.
    pub async fn remove(&self, proto: &Entity, query: &Query) -> Result<Option<Entity>, StoreFailure> {
        self.run("remove", move || self.remove_once(proto, query)).await
    }

    /// Verifies the connection and hands out the raw driver connection.
    pub async fn native(&self) -> Result<NativeHandle, StoreFailure> {
        self.run("native", move || self.native_once()).await
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, StoreFailure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut retried = false;
        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let handler = Arc::clone(&*self.inner.handler.read());
            let context = self.context(operation, retried);
            match handler.handle(&context, error.clone()).await {
                Decision::Retry if !retried => {
                    debug!("{} retry after reconnect {}", operation, self.label());
                    retried = true;
                }
                Decision::Retry => return Err(context.failure(error)),
                Decision::Fail(failure) => return Err(failure),
            }
        }
    }

    fn context(&self, operation: &'static str, retried: bool) -> ErrorContext {
        ErrorContext {
            store: self.inner.name.clone(),
            description: self.description(),
            operation,
            retried,
            manager: Arc::clone(&self.inner.manager),
            reconnector: Arc::clone(&self.inner.reconnector),
        }
    }

    fn label(&self) -> String {
        self.description().unwrap_or_else(|| self.inner.name.clone())
    }

    async fn save_once(&self, entity: &Entity) -> StoreResult<Entity> {
        let collection = self.inner.manager.collection(entity.kind())?;
        let doc = fields_to_document(entity.fields())?;

        match entity.id() {
            Some(id) => {
                let oid = id.to_object_id()?;
                collection.replace_upsert(doc! { "_id": oid }, doc).await?;
                debug!("save/update {} {} {}", self.label(), entity.kind(), id);
                Ok(entity.clone())
            }
            None => {
                let id = match collection.insert_one(doc).await? {
                    Bson::ObjectId(oid) => EntityId::from_object_id(oid),
                    Bson::String(s) => EntityId::new(s),
                    other => {
                        return Err(StoreError::operation(format!(
                            "unexpected generated id {other}"
                        )))
                    }
                };
                debug!("save/insert {} {} {}", self.label(), entity.kind(), id);
                Ok(entity.clone().with_id(id))
            }
        }
    }

    async fn load_once(&self, proto: &Entity, query: &Query) -> StoreResult<Option<Entity>> {
        let collection = self.inner.manager.collection(proto.kind())?;
        let filter = to_filter(query)?;
        let meta = to_meta(query)?;

        let found = collection.find_one(filter, &meta).await?;
        debug!("load {} {} found={}", self.label(), proto.kind(), found.is_some());
        found.map(|doc| to_entity(proto, doc)).transpose()
    }

    async fn list_once(&self, proto: &Entity, query: &Query) -> StoreResult<Vec<Entity>> {
        let collection = self.inner.manager.collection(proto.kind())?;
        let filter = to_filter(query)?;
        let meta = to_meta(query)?;

        let mut cursor = collection.find(filter, &meta).await?;
        let mut entities = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            entities.push(to_entity(proto, doc)?);
        }
        debug!("list {} {} count={}", self.label(), proto.kind(), entities.len());
        Ok(entities)
    }

    async fn remove_once(&self, proto: &Entity, query: &Query) -> StoreResult<Option<Entity>> {
        let collection = self.inner.manager.collection(proto.kind())?;
        let filter = to_filter(query)?;

        if query.acts_on_all() {
            let deleted = collection.delete_many(filter).await?;
            debug!("remove/all {} {} deleted={}", self.label(), proto.kind(), deleted);
            return Ok(None);
        }

        let meta = to_meta(query)?;
        let Some(doc) = collection.find_one(filter, &meta).await? else {
            debug!("remove/one {} {} no match", self.label(), proto.kind());
            return Ok(None);
        };
        let id = doc
            .get(STORE_ID_FIELD)
            .cloned()
            .ok_or_else(|| StoreError::operation("matched document has no _id"))?;

        collection.delete_one(doc! { "_id": id }).await?;
        debug!("remove/one {} {}", self.label(), proto.kind());

        if query.loads_result() {
            to_entity(proto, doc).map(Some)
        } else {
            Ok(None)
        }
    }

    async fn native_once(&self) -> StoreResult<NativeHandle> {
        let live = self.inner.manager.live()?;
        live.handle().ping().await?;
        debug!("native {} generation={}", self.label(), live.generation());
        Ok(NativeHandle { live })
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("description", &self.description())
            .field("generation", &self.inner.manager.generation())
            .finish_non_exhaustive()
    }
}

fn to_entity(proto: &Entity, doc: Document) -> StoreResult<Entity> {
    let (id, fields) = document_to_fields(doc);
    let mut entity = proto.make(fields)?;
    if let Some(id) = id {
        entity.set_id(id)?;
    }
    Ok(entity)
}
