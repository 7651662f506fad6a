//! # mongostore engine
//!
//! MongoDB persistence adapter for the abstract entity contract.
//!
//! This crate provides:
//! - Configuration parsing (structured options or `mongodb://` strings)
//! - The driver boundary as traits, with a `mongodb` implementation and an
//!   in-memory implementation for tests and tooling
//! - Connection lifecycle management with generation-tagged handles
//! - An exponential-backoff reconnect state machine
//! - The entity operation executor (save, load, list, remove, native)
//! - The host adapter: a function table and the init protocol
//!
//! ## Architecture
//!
//! Every operation follows the same path:
//! 1. Resolve the collection for the entity kind (cached per connection)
//! 2. Translate the abstract query into filter and meta documents
//! 3. Execute against the live connection
//! 4. On error, consult the store's error handler, which either fails the
//!    operation or reconnects and re-issues it once
//!
//! ## Key Invariants
//!
//! - At most one live connection per store, replaced as a unit
//! - Collection handles never outlive the connection they came from
//! - Only one reconnect chain runs at a time per store
//! - Authentication and configuration errors are never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod connection;
mod driver;
mod error;
mod reconnect;
mod resolver;
mod store;
mod url;

pub use adapter::{init, EntityHost, Initialized, OpFuture, Registration, StoreOps};
pub use config::{
    AutoReconnect, ConnectionDescriptor, ConnectionMode, Credentials, Endpoint, Port,
    ReplicaSetOptions, ServerEntry, StoreOptions, DEFAULT_HOST, DEFAULT_MAX_WAIT_MS,
    DEFAULT_MIN_WAIT_MS, DEFAULT_PORT,
};
pub use connection::{ConnectionManager, LiveConnection};
pub use driver::{
    DocumentStream, DriverCollection, DriverConnection, MemoryConnection, MemoryDriver,
    MongoConnection, MongoDriver, StoreDriver,
};
pub use error::{ErrorClass, FailureCode, StoreError, StoreFailure, StoreResult};
pub use reconnect::{ReconnectPhase, ReconnectPolicy, ReconnectState, Reconnector};
pub use resolver::CollectionResolver;
pub use store::{
    Decision, ErrorContext, ErrorHandler, FailFastHandler, NativeHandle, ReconnectingHandler,
    Store, STORE_NAME,
};
pub use url::{parse_connection_string, ParsedUrl};
