//! The abstract entity record.

use crate::entity::{EntityId, EntityKind};
use crate::error::{CoreError, CoreResult};
use crate::query::ID_FIELD;
use serde_json::{Map, Value};

/// A storage-independent record: a kind, an optional identity and named fields.
///
/// The identity lives outside the field map. It is absent until the entity is
/// first saved and cannot change afterwards.
///
/// # Example
///
/// ```rust
/// use mongostore_core::{Entity, EntityKind};
/// use serde_json::json;
///
/// let user = Entity::new(EntityKind::with_base("sys", "user"))
///     .with_field("name", json!("alice"))
///     .with_field("age", json!(30));
///
/// assert!(user.id().is_none());
/// assert_eq!(user.field_names().collect::<Vec<_>>(), ["name", "age"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    kind: EntityKind,
    id: Option<EntityId>,
    fields: Map<String, Value>,
}

impl Entity {
    /// Creates an empty entity of the given kind.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            id: None,
            fields: Map::new(),
        }
    }

    /// Builds a populated entity of `kind` from a plain field mapping.
    ///
    /// An `id` entry in the mapping becomes the identity.
    pub fn from_fields(kind: EntityKind, mut fields: Map<String, Value>) -> CoreResult<Self> {
        let id = match fields.remove(ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(EntityId::new(s)),
            Some(Value::Number(n)) => Some(EntityId::new(n.to_string())),
            Some(other) => {
                return Err(CoreError::conversion(
                    ID_FIELD,
                    format!("identity must be a string, got {other}"),
                ))
            }
        };

        Ok(Self { kind, id, fields })
    }

    /// Factory: a new entity of the same kind populated from `fields`.
    pub fn make(&self, fields: Map<String, Value>) -> CoreResult<Self> {
        Self::from_fields(self.kind.clone(), fields)
    }

    /// Returns the kind descriptor.
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Returns the identity, if assigned.
    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// Assigns the identity.
    ///
    /// Assigning the identity the entity already has is a no-op; assigning a
    /// different one is rejected.
    pub fn set_id(&mut self, id: EntityId) -> CoreResult<()> {
        match &self.id {
            Some(current) if *current != id => Err(CoreError::IdentityChanged {
                current: current.to_string(),
                attempted: id.into_string(),
            }),
            _ => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    /// Builder form of [`set_id`](Self::set_id) for entities without identity.
    ///
    /// Only meant for freshly built entities; replacing a different identity
    /// is a logic error and panics in debug builds. Use `set_id` when the
    /// entity may already carry one.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        let id = id.into();
        debug_assert!(
            self.id.as_ref().map_or(true, |current| *current == id),
            "with_id would replace identity {:?} with {:?}",
            self.id,
            id
        );
        self.id = Some(id);
        self
    }

    /// Names of all fields, excluding the identity.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field value. Setting `id` is routed to the identity.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> CoreResult<()> {
        let field = field.into();
        if field == ID_FIELD {
            let id = match value {
                Value::String(s) => EntityId::new(s),
                other => {
                    return Err(CoreError::conversion(
                        ID_FIELD,
                        format!("identity must be a string, got {other}"),
                    ))
                }
            };
            return self.set_id(id);
        }
        self.fields.insert(field, value);
        Ok(())
    }

    /// Builder form of [`set`](Self::set) for non-identity fields.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Returns all fields, excluding the identity.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Renders the entity as a plain JSON object, identity included.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        if let Some(id) = &self.id {
            out.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        }
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> EntityKind {
        EntityKind::with_base("sys", "user")
    }

    #[test]
    fn from_fields_extracts_identity() {
        let fields = json!({"id": "abc", "name": "bob"});
        let ent = Entity::from_fields(user(), fields.as_object().unwrap().clone()).unwrap();
        assert_eq!(ent.id().unwrap().as_str(), "abc");
        assert_eq!(ent.field_names().collect::<Vec<_>>(), ["name"]);
    }

    #[test]
    fn from_fields_rejects_object_identity() {
        let fields = json!({"id": {"nested": true}});
        let err = Entity::from_fields(user(), fields.as_object().unwrap().clone()).unwrap_err();
        assert!(matches!(err, CoreError::Conversion { .. }));
    }

    #[test]
    fn make_keeps_kind() {
        let proto = Entity::new(user());
        let ent = proto
            .make(json!({"name": "x"}).as_object().unwrap().clone())
            .unwrap();
        assert_eq!(ent.kind(), &user());
        assert_eq!(ent.get("name"), Some(&json!("x")));
    }

    #[test]
    fn identity_is_immutable() {
        let mut ent = Entity::new(user());
        ent.set_id(EntityId::new("one")).unwrap();
        ent.set_id(EntityId::new("one")).unwrap();
        let err = ent.set_id(EntityId::new("two")).unwrap_err();
        assert!(matches!(err, CoreError::IdentityChanged { .. }));
        assert_eq!(ent.id().unwrap().as_str(), "one");
    }

    #[test]
    fn set_routes_id_to_identity() {
        let mut ent = Entity::new(user());
        ent.set("id", json!("abc")).unwrap();
        ent.set("name", json!("carol")).unwrap();
        assert_eq!(ent.id().unwrap().as_str(), "abc");
        assert!(ent.get("id").is_none());
    }

    #[test]
    fn with_id_accepts_same_identity() {
        let ent = Entity::new(user()).with_id("abc").with_id("abc");
        assert_eq!(ent.id().unwrap().as_str(), "abc");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "would replace identity")]
    fn with_id_refuses_to_replace_identity() {
        let _ = Entity::new(user()).with_id("abc").with_id("def");
    }

    #[test]
    fn to_json_includes_identity_first() {
        let ent = Entity::new(user())
            .with_field("name", json!("dan"))
            .with_id("abc");
        assert_eq!(ent.to_json(), json!({"id": "abc", "name": "dan"}));
    }
}
