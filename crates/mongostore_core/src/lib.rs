//! # mongostore core
//!
//! Storage-independent building blocks for the mongostore entity adapter.
//!
//! This crate provides:
//! - The abstract entity record (`Entity`) with its kind and identity
//! - Identity conversion between the external string form and `ObjectId`
//! - The abstract query model (`Query`) with its `$`-suffixed control keys
//! - Query translation into filter and meta documents
//! - Conversion between entity fields and stored BSON documents
//!
//! Nothing in this crate performs I/O. The connection lifecycle, the driver
//! boundary and the operation executor live in `mongostore_engine`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod entity;
mod error;
mod query;

pub use convert::{document_to_fields, fields_to_document, value_to_bson};
pub use entity::{Entity, EntityId, EntityKind};
pub use error::{CoreError, CoreResult};
pub use query::{
    to_filter, to_meta, MetaDoc, Query, SortDirection, SortSpec, ID_FIELD, RESERVED_MARKER,
    STORE_ID_FIELD,
};

/// Crate version, reported by tooling.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
