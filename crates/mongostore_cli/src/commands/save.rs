//! Save command implementation.

use mongostore_core::Entity;
use mongostore_engine::StoreOptions;
use serde_json::Value;

/// Builds the entity to save from a JSON object argument.
pub fn entity_from_json(kind: &str, data: &str) -> Result<Entity, super::CliError> {
    let kind = super::parse_kind(kind)?;
    let fields = match super::parse_json("data", data)? {
        Value::Object(fields) => fields,
        other => {
            return Err(mongostore_core::CoreError::conversion(
                "data",
                format!("expected a JSON object, got {other}"),
            )
            .into())
        }
    };
    Ok(Entity::from_fields(kind, fields)?)
}

/// Runs the save command.
pub async fn run(
    options: StoreOptions,
    kind: &str,
    data: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entity = entity_from_json(kind, data)?;

    let store = super::connect(options).await?;
    let saved = store.save(&entity).await?;
    store.close().await?;

    super::print_json(&saved.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_entity() {
        let entity = entity_from_json("shop/item", r#"{"id": "5f1d7a9b2c3e4f5a6b7c8d9e", "n": 1}"#)
            .unwrap();
        assert_eq!(entity.kind().collection_name(), "shop_item");
        assert_eq!(entity.id().unwrap().as_str(), "5f1d7a9b2c3e4f5a6b7c8d9e");
        assert_eq!(entity.get("n"), Some(&json!(1)));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(entity_from_json("item", "[1, 2]").is_err());
        assert!(entity_from_json("item", "nope").is_err());
    }
}
