//! Entity types.

mod id;
mod kind;
mod record;

pub use id::EntityId;
pub use kind::EntityKind;
pub use record::Entity;
