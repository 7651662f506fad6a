//! The driver boundary.
//!
//! The store talks to the database only through these traits. Two
//! implementations exist: [`MongoDriver`] over the official `mongodb` crate,
//! and [`MemoryDriver`], an in-process store with failure injection.

mod memory;
mod mongo;

pub use memory::{MemoryConnection, MemoryDriver};
pub use mongo::{MongoConnection, MongoDriver};

use crate::config::{ConnectionDescriptor, Credentials};
use crate::error::StoreResult;
use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use mongostore_core::MetaDoc;
use std::any::Any;
use std::sync::Arc;

/// Documents yielded lazily by a find.
pub type DocumentStream = BoxStream<'static, StoreResult<Document>>;

/// Opens connections.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Driver name, for logs.
    fn name(&self) -> &str;

    /// Establishes the network connection described by `descriptor`.
    ///
    /// Does not authenticate.
    async fn open(&self, descriptor: &ConnectionDescriptor) -> StoreResult<Arc<dyn DriverConnection>>;
}

/// An open connection.
#[async_trait]
pub trait DriverConnection: Send + Sync {
    /// Authenticates the connection.
    async fn authenticate(&self, credentials: &Credentials) -> StoreResult<()>;

    /// Round-trips to the server.
    async fn ping(&self) -> StoreResult<()>;

    /// Returns a handle to the named collection.
    fn collection(&self, name: &str) -> Arc<dyn DriverCollection>;

    /// Closes the connection.
    async fn close(&self) -> StoreResult<()>;

    /// Access to the concrete connection type.
    fn as_any(&self) -> &dyn Any;
}

/// A physical collection.
#[async_trait]
pub trait DriverCollection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Inserts a document, returning its `_id`.
    async fn insert_one(&self, doc: Document) -> StoreResult<Bson>;

    /// Replaces the first match of `filter`, inserting if nothing matches.
    async fn replace_upsert(&self, filter: Document, doc: Document) -> StoreResult<()>;

    /// Fetches the first match, honoring sort, skip and projection.
    async fn find_one(&self, filter: Document, meta: &MetaDoc) -> StoreResult<Option<Document>>;

    /// Streams every match.
    async fn find(&self, filter: Document, meta: &MetaDoc) -> StoreResult<DocumentStream>;

    /// Deletes the first match, returning the number deleted.
    async fn delete_one(&self, filter: Document) -> StoreResult<u64>;

    /// Deletes every match, returning the number deleted.
    async fn delete_many(&self, filter: Document) -> StoreResult<u64>;
}
