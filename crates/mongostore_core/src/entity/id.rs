//! Entity identifier.

use crate::error::{CoreError, CoreResult};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// External identity of a persisted entity.
///
/// Identities are carried in their string form. Identities generated by the
/// store are 24-character hex renderings of a 12-byte `ObjectId`; they are:
/// - Assigned on first save
/// - Immutable once assigned
/// - Converted back to `ObjectId` whenever they reach the store
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wraps an identity string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh identity backed by a new `ObjectId`.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_object_id(ObjectId::new())
    }

    /// Creates an identity from an `ObjectId`.
    #[must_use]
    pub fn from_object_id(oid: ObjectId) -> Self {
        Self(oid.to_hex())
    }

    /// Returns the string form.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts to the store's native identity type.
    ///
    /// Fails unless the identity is exactly 24 hex characters.
    pub fn to_object_id(&self) -> CoreResult<ObjectId> {
        ObjectId::parse_str(&self.0).map_err(|_| CoreError::invalid_id(self.0.clone()))
    }

    /// Consumes the identity, returning the string form.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ObjectId> for EntityId {
    fn from(oid: ObjectId) -> Self {
        Self::from_object_id(oid)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl TryFrom<&EntityId> for ObjectId {
    type Error = CoreError;

    fn try_from(id: &EntityId) -> CoreResult<Self> {
        id.to_object_id()
    }
}
