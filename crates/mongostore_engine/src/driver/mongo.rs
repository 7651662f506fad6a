//! Driver over the official `mongodb` crate.

use super::{DocumentStream, DriverCollection, DriverConnection, StoreDriver};
use crate::config::{option, ConnectionDescriptor, Credentials};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{
    Acknowledgment, ClientOptions, Credential, FindOneOptions, FindOptions, ReplaceOptions,
    ServerAddress, Tls, TlsOptions, WriteConcern,
};
use mongodb::{Client, Collection, Database};
use mongostore_core::MetaDoc;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Opens connections with the official `mongodb` driver.
///
/// # Example
///
/// ```rust,no_run
/// use mongostore_engine::{MongoDriver, Store, StoreOptions};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = StoreOptions::new().with_url("mongodb://localhost:27017/app");
/// let store = Store::new(Arc::new(MongoDriver::new()), options);
/// store.connect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MongoDriver {
    app_name: Option<String>,
}

impl MongoDriver {
    /// Creates the driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application name reported to the server.
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Maps a descriptor to client options, without credentials.
    pub fn client_options(&self, descriptor: &ConnectionDescriptor) -> StoreResult<ClientOptions> {
        let mut options = ClientOptions::default();

        options.hosts = descriptor
            .resolve_endpoints()?
            .into_iter()
            .map(|(host, port)| {
                let address = if host.contains(':') {
                    format!("[{host}]:{port}")
                } else {
                    format!("{host}:{port}")
                };
                ServerAddress::parse(address).map_err(StoreError::from)
            })
            .collect::<StoreResult<Vec<_>>>()?;

        options.repl_set_name = descriptor.replica_set_name().map(str::to_string);

        let server = &descriptor.server_options;
        options.connect_timeout = millis(option(server, "connectTimeoutMS"));
        options.server_selection_timeout = millis(option(server, "serverSelectionTimeoutMS"));
        options.max_pool_size = option(server, "maxPoolSize")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());
        options.min_pool_size = option(server, "minPoolSize")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());
        options.app_name = option(server, "appName")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.app_name.clone());

        if let Some(tls) = option(server, "tls")
            .or_else(|| option(server, "ssl"))
            .and_then(Value::as_bool)
        {
            options.tls = Some(if tls {
                Tls::Enabled(TlsOptions::default())
            } else {
                Tls::Disabled
            });
        }

        let retry = descriptor.driver_auto_reconnect();
        options.retry_reads = Some(retry);
        options.retry_writes = Some(retry);

        let db = &descriptor.db_options;
        let mut write_concern = WriteConcern::default();
        write_concern.w = option(db, "w").and_then(acknowledgment);
        write_concern.journal = option(db, "journal")
            .or_else(|| option(db, "j"))
            .and_then(Value::as_bool);
        write_concern.w_timeout = millis(option(db, "wtimeoutMS"));
        options.write_concern = Some(write_concern);

        Ok(options)
    }
}

fn millis(value: Option<&Value>) -> Option<Duration> {
    value.and_then(Value::as_u64).map(Duration::from_millis)
}

fn acknowledgment(value: &Value) -> Option<Acknowledgment> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Acknowledgment::Nodes),
        Value::String(s) if s == "majority" => Some(Acknowledgment::Majority),
        Value::String(s) => Some(Acknowledgment::Custom(s.clone())),
        _ => None,
    }
}

fn credential(credentials: &Credentials, source: Option<String>) -> Credential {
    let mut credential = Credential::default();
    credential.username = Some(credentials.username.clone());
    credential.password = credentials.password.clone();
    credential.source = source;
    credential
}

#[async_trait]
impl StoreDriver for MongoDriver {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> StoreResult<Arc<dyn DriverConnection>> {
        let database = descriptor.database_name()?.to_string();
        let options = self.client_options(descriptor)?;
        let client = Client::with_options(options.clone())?;

        let connection = MongoConnection {
            client: RwLock::new(client),
            options,
            auth_source: option(&descriptor.db_options, "authSource")
                .and_then(Value::as_str)
                .map(str::to_string),
            database,
        };
        // The client connects lazily; force a round trip.
        connection.ping().await?;

        Ok(Arc::new(connection))
    }
}

/// A connection held by [`MongoDriver`].
///
/// Reach it through [`NativeHandle::downcast_ref`](crate::NativeHandle::downcast_ref)
/// to issue commands the store does not expose.
pub struct MongoConnection {
    client: RwLock<Client>,
    options: ClientOptions,
    auth_source: Option<String>,
    database: String,
}

impl MongoConnection {
    /// The underlying client.
    pub fn client(&self) -> Client {
        self.client.read().clone()
    }

    /// The configured database.
    pub fn database(&self) -> Database {
        self.client().database(&self.database)
    }
}

#[async_trait]
impl DriverConnection for MongoConnection {
    async fn authenticate(&self, credentials: &Credentials) -> StoreResult<()> {
        let mut options = self.options.clone();
        options.credential = Some(credential(credentials, self.auth_source.clone()));

        let client = Client::with_options(options)?;
        // Authentication happens during the connection handshake.
        client.database(&self.database).run_command(doc! { "ping": 1 }).await?;

        let previous = std::mem::replace(&mut *self.client.write(), client);
        previous.shutdown().immediate(true).await;
        debug!("authenticated as {}", credentials.username);
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database().run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn collection(&self, name: &str) -> Arc<dyn DriverCollection> {
        Arc::new(MongoCollection {
            name: name.to_string(),
            inner: self.database().collection::<Document>(name),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        self.client().shutdown().immediate(true).await;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MongoCollection {
    name: String,
    inner: Collection<Document>,
}

#[async_trait]
impl DriverCollection for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<Bson> {
        Ok(self.inner.insert_one(doc).await?.inserted_id)
    }

    async fn replace_upsert(&self, filter: Document, doc: Document) -> StoreResult<()> {
        let mut options = ReplaceOptions::default();
        options.upsert = Some(true);
        self.inner
            .replace_one(filter, doc)
            .with_options(options)
            .await?;
        Ok(())
    }

    async fn find_one(&self, filter: Document, meta: &MetaDoc) -> StoreResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.sort = meta.sort_document();
        options.skip = meta.skip;
        options.projection = meta.fields.clone();

        Ok(self.inner.find_one(filter).with_options(options).await?)
    }

    async fn find(&self, filter: Document, meta: &MetaDoc) -> StoreResult<DocumentStream> {
        let mut options = FindOptions::default();
        options.sort = meta.sort_document();
        options.limit = meta.limit;
        options.skip = meta.skip;
        options.projection = meta.fields.clone();

        let cursor = self.inner.find(filter).with_options(options).await?;
        Ok(cursor.map_err(StoreError::from).boxed())
    }

    async fn delete_one(&self, filter: Document) -> StoreResult<u64> {
        Ok(self.inner.delete_one(filter).await?.deleted_count)
    }

    async fn delete_many(&self, filter: Document) -> StoreResult<u64> {
        Ok(self.inner.delete_many(filter).await?.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use serde_json::json;

    fn descriptor(value: Value) -> ConnectionDescriptor {
        StoreOptions::from_value(value).unwrap().descriptor().unwrap()
    }

    #[test]
    fn maps_hosts_and_replica_set() {
        let d = descriptor(json!({"url": "mongodb://a:1,b:2/app?replicaSet=rs0"}));
        let options = MongoDriver::new().client_options(&d).unwrap();

        assert_eq!(options.hosts.len(), 2);
        assert_eq!(options.hosts[0].to_string(), "a:1");
        assert_eq!(options.repl_set_name.as_deref(), Some("rs0"));
    }

    #[test]
    fn maps_write_concern_and_pool() {
        let d = descriptor(json!({
            "url": "mongodb://h/app?maxPoolSize=7&connectTimeoutMS=250&wtimeoutMS=100",
            "options": {"w": "majority", "journal": true}
        }));
        let options = MongoDriver::new().client_options(&d).unwrap();

        let wc = options.write_concern.unwrap();
        assert_eq!(wc.w, Some(Acknowledgment::Majority));
        assert_eq!(wc.journal, Some(true));
        assert_eq!(wc.w_timeout, Some(Duration::from_millis(100)));
        assert_eq!(options.max_pool_size, Some(7));
        assert_eq!(options.connect_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn default_write_concern_is_one_node() {
        let d = descriptor(json!({"name": "app"}));
        let options = MongoDriver::new().client_options(&d).unwrap();
        assert_eq!(options.write_concern.unwrap().w, Some(Acknowledgment::Nodes(1)));
        assert_eq!(options.retry_writes, Some(true));
    }

    #[test]
    fn disabled_reconnect_disables_retries() {
        let d = descriptor(json!({"name": "app", "autoreconnect": false}));
        let options = MongoDriver::new().client_options(&d).unwrap();
        assert_eq!(options.retry_reads, Some(false));
        assert_eq!(options.retry_writes, Some(false));
    }

    #[test]
    fn app_name_falls_back_to_driver_setting() {
        let d = descriptor(json!({"name": "app"}));
        let options = MongoDriver::new().with_app_name("svc").client_options(&d).unwrap();
        assert_eq!(options.app_name.as_deref(), Some("svc"));
    }

    #[test]
    fn invalid_port_is_a_configuration_error() {
        let d = descriptor(json!({"name": "app", "port": "x"}));
        let err = MongoDriver::new().client_options(&d).unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Configuration);
    }
}
