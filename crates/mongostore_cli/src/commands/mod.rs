//! CLI command implementations.

pub mod describe;
pub mod list;
pub mod load;
pub mod ping;
pub mod remove;
pub mod save;

use mongostore_core::{CoreError, Entity, EntityKind, Query};
use mongostore_engine::{MongoDriver, Store, StoreError, StoreOptions};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised before a store is involved.
#[derive(Debug, Error)]
pub enum CliError {
    /// Neither a config file nor a connection string was given.
    #[error("either --config or --url is required")]
    MissingConfig,

    /// Options could not be loaded.
    #[error("cannot load options: {0}")]
    Options(#[from] StoreError),

    /// An argument is not valid JSON.
    #[error("invalid JSON in {argument}: {source}")]
    Json {
        /// Argument name.
        argument: &'static str,
        /// Parse error.
        source: serde_json::Error,
    },

    /// A kind, query or entity argument was rejected.
    #[error(transparent)]
    Input(#[from] CoreError),
}

/// Builds store options from a config file, a connection string, or both.
///
/// The connection string takes precedence over the file's `url`.
pub fn load_options(config: Option<&Path>, url: Option<&str>) -> Result<StoreOptions, CliError> {
    let options = match (config, url) {
        (None, None) => return Err(CliError::MissingConfig),
        (Some(path), _) => StoreOptions::from_file(path)?,
        (None, Some(_)) => StoreOptions::new(),
    };
    Ok(match url {
        Some(url) => options.with_url(url),
        None => options,
    })
}

/// Opens a store over the `mongodb` driver.
pub async fn connect(options: StoreOptions) -> Result<Store, Box<dyn std::error::Error>> {
    let driver = MongoDriver::new().with_app_name("mongostore-cli");
    debug!(
        "connecting (url: {}, database: {:?})",
        options.url.is_some(),
        options.name
    );
    let store = Store::new(Arc::new(driver), options.with_connect(true));
    store.connect().await?;
    Ok(store)
}

/// Parses an entity kind argument.
pub fn parse_kind(kind: &str) -> Result<EntityKind, CliError> {
    Ok(EntityKind::parse(kind)?)
}

/// Parses an optional query argument; absent means "match everything".
pub fn parse_query(query: Option<&str>) -> Result<Query, CliError> {
    match query {
        None => Ok(Query::new()),
        Some(text) => {
            let value = parse_json("--query", text)?;
            Ok(Query::from_value(value)?)
        }
    }
}

/// Parses a JSON argument.
pub fn parse_json(argument: &'static str, text: &str) -> Result<Value, CliError> {
    serde_json::from_str(text).map_err(|source| CliError::Json { argument, source })
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON form of an optional entity; `null` when absent.
pub fn entity_json(entity: Option<&Entity>) -> Value {
    entity.map_or(Value::Null, Entity::to_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn options_require_a_source() {
        assert!(matches!(load_options(None, None), Err(CliError::MissingConfig)));
    }

    #[test]
    fn url_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"url": "mongodb://a/one", "minwait": 5}}"#).unwrap();

        let options = load_options(Some(file.path()), Some("mongodb://b/two")).unwrap();
        assert_eq!(options.url.as_deref(), Some("mongodb://b/two"));
        assert_eq!(options.minwait, Some(5));
    }

    #[test]
    fn query_argument() {
        assert_eq!(parse_query(None).unwrap(), Query::new());
        let query = parse_query(Some(r#"{"name": "x", "limit$": 2}"#)).unwrap();
        assert_eq!(query.get("name"), Some(&serde_json::json!("x")));

        assert!(matches!(parse_query(Some("{")), Err(CliError::Json { .. })));
        assert!(matches!(parse_query(Some("[1]")), Err(CliError::Input(_))));
    }

    #[test]
    fn kind_argument() {
        assert_eq!(parse_kind("sys/user").unwrap().collection_name(), "sys_user");
    }
}
