//! Entity kind descriptor.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Identifies what an entity is: an optional namespace (`base`) and a name.
///
/// A zone may also be carried for hosts that partition entities further; it
/// does not take part in collection naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKind {
    zone: Option<String>,
    base: Option<String>,
    name: String,
}

impl EntityKind {
    /// Creates a kind with no namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            zone: None,
            base: None,
            name: name.into(),
        }
    }

    /// Creates a kind inside a namespace.
    pub fn with_base(base: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            zone: None,
            base: Some(base.into()),
            name: name.into(),
        }
    }

    /// Sets the zone.
    #[must_use]
    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Parses `name`, `base/name` or `zone/base/name`.
    ///
    /// A `-` segment means the part is absent.
    pub fn parse(canon: &str) -> CoreResult<Self> {
        let parts: Vec<&str> = canon.split('/').collect();
        let segment = |s: &str| match s {
            "" | "-" => None,
            other => Some(other.to_string()),
        };

        let (zone, base, name) = match parts.as_slice() {
            [name] => (None, None, *name),
            [base, name] => (None, segment(base), *name),
            [zone, base, name] => (segment(zone), segment(base), *name),
            _ => return Err(CoreError::InvalidKind { value: canon.into() }),
        };

        if name.is_empty() || name == "-" {
            return Err(CoreError::InvalidKind { value: canon.into() });
        }

        Ok(Self {
            zone,
            base,
            name: name.to_string(),
        })
    }

    /// Returns the zone, if any.
    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// Returns the namespace, if any.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Returns the kind name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the physical collection holding entities of this kind.
    pub fn collection_name(&self) -> String {
        match &self.base {
            Some(base) => format!("{}_{}", base, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.zone.as_deref().unwrap_or("-"),
            self.base.as_deref().unwrap_or("-"),
            self.name
        )
    }
}
