//! # mongostore testkit
//!
//! Test utilities for mongostore.
//!
//! This crate provides:
//! - Store fixtures over the in-memory driver
//! - An entity host that records registrations
//! - Config file helpers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mongostore_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn saves() {
//!     let store = TestStore::open().await;
//!     let saved = store.save(&store.proto("item")).await.unwrap();
//!     assert!(saved.id().is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
