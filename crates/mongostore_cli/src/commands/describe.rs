//! Describe command implementation.

use mongostore_engine::{ConnectionMode, StoreOptions};
use serde::Serialize;
use serde_json::{Map, Value};

/// Normalized connection settings, as printed.
#[derive(Debug, Serialize)]
pub struct DescribeResult {
    /// Topology.
    pub mode: ConnectionMode,
    /// Resolved `host:port` endpoints.
    pub endpoints: Vec<String>,
    /// Database name.
    pub database: Option<String>,
    /// Authenticating user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Replica set name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_set: Option<String>,
    /// Whether the custom reconnect handler is active.
    pub custom_reconnect: bool,
    /// First reconnect wait in milliseconds.
    pub min_wait_ms: u128,
    /// Reconnect wait ceiling in milliseconds.
    pub max_wait_ms: u128,
    /// Connection-level options.
    pub server_options: Map<String, Value>,
    /// Database-level options.
    pub db_options: Map<String, Value>,
}

/// Builds the description without connecting.
pub fn describe(options: &StoreOptions) -> Result<DescribeResult, Box<dyn std::error::Error>> {
    let descriptor = options.descriptor()?;
    let endpoints = descriptor
        .resolve_endpoints()?
        .into_iter()
        .map(|(host, port)| format!("{host}:{port}"))
        .collect();
    let policy = options.reconnect_policy();

    Ok(DescribeResult {
        mode: descriptor.mode,
        endpoints,
        database: descriptor.database.clone(),
        username: descriptor.credentials.as_ref().map(|c| c.username.clone()),
        replica_set: descriptor.replica_set_name().map(str::to_string),
        custom_reconnect: options.auto_reconnect().is_custom(),
        min_wait_ms: policy.min_wait.as_millis(),
        max_wait_ms: policy.max_wait.as_millis(),
        server_options: descriptor.server_options,
        db_options: descriptor.db_options,
    })
}

/// Runs the describe command.
pub fn run(options: &StoreOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = describe(options)?;

    if format == "json" {
        return super::print_json(&result);
    }

    println!("Mode:       {:?}", result.mode);
    println!("Endpoints:  {}", result.endpoints.join(", "));
    println!("Database:   {}", result.database.as_deref().unwrap_or("-"));
    println!("User:       {}", result.username.as_deref().unwrap_or("-"));
    if let Some(name) = &result.replica_set {
        println!("Replica:    {}", name);
    }
    println!(
        "Reconnect:  {} (wait {}ms..{}ms)",
        if result.custom_reconnect { "custom" } else { "driver" },
        result.min_wait_ms,
        result.max_wait_ms
    );
    for (key, value) in &result.db_options {
        println!("  {} = {}", key, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn describes_replica_set_url() {
        let options = StoreOptions::from_value(json!({
            "url": "mongodb://admin:secret@a:1,b:2/shop?replicaSet=rs0",
            "autoreconnect": 2,
            "maxwait": 1000
        }))
        .unwrap();

        let result = describe(&options).unwrap();
        assert_eq!(result.mode, ConnectionMode::ReplicaSet);
        assert_eq!(result.endpoints, vec!["a:1", "b:2"]);
        assert_eq!(result.database.as_deref(), Some("shop"));
        assert_eq!(result.username.as_deref(), Some("admin"));
        assert_eq!(result.replica_set.as_deref(), Some("rs0"));
        assert!(result.custom_reconnect);
        assert_eq!(result.max_wait_ms, 1000);

        let text = serde_json::to_string(&result).unwrap();
        assert!(!text.contains("secret"));
    }

    #[test]
    fn invalid_port_fails() {
        let options = StoreOptions::from_value(json!({"name": "app", "port": "abc"})).unwrap();
        assert!(describe(&options).is_err());
    }
}
