//! Store configuration and the normalized connection descriptor.

use crate::error::{StoreError, StoreResult};
use crate::reconnect::ReconnectPolicy;
use crate::url::{parse_connection_string, ParsedUrl};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 27017;

/// Default initial reconnect wait, in milliseconds.
pub const DEFAULT_MIN_WAIT_MS: u64 = 16;

/// Default reconnect wait ceiling, in milliseconds.
pub const DEFAULT_MAX_WAIT_MS: u64 = 65536;

/// Database selected when a connection string names none.
const DEFAULT_URL_DATABASE: &str = "admin";

/// Auto-reconnect mode.
///
/// | option value       | mode       |
/// |--------------------|------------|
/// | `false`, `0`       | `Disabled` |
/// | absent, `true`, `1`| `Driver`   |
/// | `2`                | `Custom`   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoReconnect {
    /// Driver-level reconnection disabled, no reconnect chain.
    Disabled,
    /// Driver-level reconnection only.
    #[default]
    Driver,
    /// Driver-level reconnection plus the store's own reconnect chain.
    Custom,
}

impl AutoReconnect {
    /// Mode for a numeric option value.
    pub fn from_level(level: f64) -> Self {
        if (level - 2.0).abs() < f64::EPSILON {
            Self::Custom
        } else if level > 0.0 {
            Self::Driver
        } else {
            Self::Disabled
        }
    }

    /// Whether the driver's own reconnection is enabled.
    pub fn driver_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether the store's reconnect chain is active.
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom)
    }
}

impl<'de> Deserialize<'de> for AutoReconnect {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Level(f64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Self::Driver,
            Raw::Flag(false) => Self::Disabled,
            Raw::Level(level) => Self::from_level(level),
        })
    }
}

impl Serialize for AutoReconnect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Disabled => serializer.serialize_bool(false),
            Self::Driver => serializer.serialize_bool(true),
            Self::Custom => serializer.serialize_u8(2),
        }
    }
}

/// A configured port.
///
/// Invalid values are kept as given and reported when the connection is
/// opened.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Port {
    /// Not configured; resolves to [`DEFAULT_PORT`].
    #[default]
    Default,
    /// An explicit port.
    Number(u16),
    /// A value that is not a usable port.
    Invalid(String),
}

impl Port {
    /// Parses the leading base-10 digits of `raw`, ignoring any trailing text.
    ///
    /// Zero means "not configured".
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());

        if end == 0 {
            return Self::Invalid(raw.to_string());
        }
        match digits[..end].parse::<u64>() {
            Ok(0) => Self::Default,
            Ok(_) if negative => Self::Invalid(raw.to_string()),
            Ok(n) => u16::try_from(n).map_or_else(|_| Self::Invalid(raw.to_string()), Self::Number),
            Err(_) => Self::Invalid(raw.to_string()),
        }
    }

    /// Port from an option value: a number, a string, or a falsy value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null | Value::Bool(false) => Self::Default,
            Value::String(s) if s.is_empty() => Self::Default,
            Value::String(s) => Self::parse(s),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f == 0.0 => Self::Default,
                Some(f) if f > 0.0 && f <= f64::from(u16::MAX) => Self::Number(f as u16),
                _ => Self::Invalid(n.to_string()),
            },
            other => Self::Invalid(other.to_string()),
        }
    }

    /// Returns true if no port is configured.
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// The port number to connect to.
    pub fn resolve(&self) -> StoreResult<u16> {
        match self {
            Self::Default => Ok(DEFAULT_PORT),
            Self::Number(n) => Ok(*n),
            Self::Invalid(raw) => Err(StoreError::configuration(format!("invalid port: {raw:?}"))),
        }
    }
}

impl<'de> Deserialize<'de> for Port {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(&Value::deserialize(deserializer)?))
    }
}

impl Serialize for Port {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Default => serializer.serialize_u16(DEFAULT_PORT),
            Self::Number(n) => serializer.serialize_u16(*n),
            Self::Invalid(raw) => serializer.serialize_str(raw),
        }
    }
}

/// One server of a replica set, as configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEntry {
    /// Host name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Alias of `host`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Port.
    pub port: Port,
}

impl ServerEntry {
    /// Creates a server entry.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            server: None,
            port: Port::Number(port),
        }
    }

    fn endpoint(&self) -> Endpoint {
        let host = non_empty(&self.host)
            .or(non_empty(&self.server))
            .map_or_else(|| DEFAULT_HOST.to_string(), Clone::clone);
        Endpoint::new(host, self.port.clone())
    }
}

/// Replica set options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaSetOptions {
    /// Member servers; replaces any parsed from the connection string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<ServerEntry>>,
    /// Replica set options, layered over those of the connection string.
    pub options: Map<String, Value>,
}

/// Free-form store options, as supplied by the host.
///
/// Unknown keys are ignored. Empty strings count as absent.
///
/// # Example
///
/// ```rust
/// use mongostore_engine::{ConnectionMode, StoreOptions};
///
/// let options = StoreOptions::from_json_str(
///     r#"{"url": "mongodb://a:27017,b:27018/app", "autoreconnect": 2}"#,
/// ).unwrap();
///
/// let descriptor = options.descriptor().unwrap();
/// assert_eq!(descriptor.mode, ConnectionMode::ReplicaSet);
/// assert_eq!(descriptor.endpoints.len(), 2);
/// assert!(options.auto_reconnect().is_custom());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// `false` defers the connection until [`Store::connect`](crate::Store::connect).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<bool>,
    /// Connection string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Database name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Host name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Alias of `host`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Port, as a number or a string.
    #[serde(skip_serializing_if = "Port::is_default")]
    pub port: Port,
    /// User name; enables authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Alias of `username`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Password.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Alias of `password`.
    #[serde(skip_serializing)]
    pub pass: Option<String>,
    /// Database options, layered over defaults and connection string options.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    /// Replica set configuration; forces replica set mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicaset: Option<ReplicaSetOptions>,
    /// Auto-reconnect mode: `false`, `true` or `2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoreconnect: Option<AutoReconnect>,
    /// Initial reconnect wait in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minwait: Option<u64>,
    /// Reconnect wait ceiling in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxwait: Option<u64>,
}

impl StoreOptions {
    /// Creates empty options: a local server, driver-level auto-reconnect.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON object.
    pub fn from_value(value: Value) -> StoreResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| StoreError::configuration(format!("invalid store options: {e}")))
    }

    /// Parses options from JSON text.
    pub fn from_json_str(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::configuration(format!("invalid store options: {e}")))
    }

    /// Loads options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Sets the connection string.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the database name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Port::Number(port);
        self
    }

    /// Sets the credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Adds a database option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Configures a replica set with the given members.
    pub fn with_replicaset(mut self, servers: Vec<ServerEntry>) -> Self {
        self.replicaset.get_or_insert_with(ReplicaSetOptions::default).servers = Some(servers);
        self
    }

    /// Sets the auto-reconnect mode.
    pub fn with_autoreconnect(mut self, mode: AutoReconnect) -> Self {
        self.autoreconnect = Some(mode);
        self
    }

    /// Sets the reconnect wait bounds.
    pub fn with_waits(mut self, min: Duration, max: Duration) -> Self {
        self.minwait = Some(min.as_millis() as u64);
        self.maxwait = Some(max.as_millis() as u64);
        self
    }

    /// Sets whether the connection is opened during init.
    pub fn with_connect(mut self, connect: bool) -> Self {
        self.connect = Some(connect);
        self
    }

    /// Whether opening is deferred.
    pub fn defers_connect(&self) -> bool {
        self.connect == Some(false)
    }

    /// The configured auto-reconnect mode.
    pub fn auto_reconnect(&self) -> AutoReconnect {
        self.autoreconnect.unwrap_or_default()
    }

    /// Reconnect wait bounds; zero or absent values take the defaults.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let min = self.minwait.filter(|&ms| ms > 0).unwrap_or(DEFAULT_MIN_WAIT_MS);
        let max = self.maxwait.filter(|&ms| ms > 0).unwrap_or(DEFAULT_MAX_WAIT_MS);
        ReconnectPolicy::from_millis(min, max)
    }

    /// Builds the normalized connection descriptor.
    ///
    /// Structured options override or augment what the connection string
    /// provides. A malformed connection string fails here; an unusable port
    /// only fails when endpoints are resolved.
    pub fn descriptor(&self) -> StoreResult<ConnectionDescriptor> {
        let mut server_options = Map::new();
        server_options.insert("auto_reconnect".into(), Value::Bool(true));
        let mut db_options = Map::new();
        db_options.insert("w".into(), Value::from(1));
        let mut replica_options = Map::new();

        let mut mode = ConnectionMode::Single;
        let mut servers: Option<Vec<Endpoint>> = None;
        let mut host: Option<String> = None;
        let mut port = Port::Default;
        let mut database = None;
        let mut credentials = None;

        if let Some(url) = non_empty(&self.url) {
            let ParsedUrl {
                endpoints,
                database: url_database,
                credentials: url_credentials,
                server_options: url_server,
                db_options: url_db,
                replica_options: url_replica,
            } = parse_connection_string(url)?;

            database = Some(url_database.unwrap_or_else(|| DEFAULT_URL_DATABASE.to_string()));
            if endpoints.len() > 1 {
                mode = ConnectionMode::ReplicaSet;
                servers = Some(endpoints);
            } else if let Some(endpoint) = endpoints.into_iter().next() {
                host = Some(endpoint.host);
                port = endpoint.port;
            }
            credentials = url_credentials;
            server_options.extend(url_server);
            db_options.extend(url_db);
            replica_options.extend(url_replica);
        }

        if let Some(name) = non_empty(&self.name) {
            database = Some(name.clone());
        }
        if let Some(h) = non_empty(&self.host).or(non_empty(&self.server)) {
            host = Some(h.clone());
        }
        if !self.port.is_default() {
            port = self.port.clone();
        }
        if let Some(username) = non_empty(&self.username).or(non_empty(&self.user)) {
            let password = non_empty(&self.password).or(non_empty(&self.pass)).cloned();
            credentials = Some(Credentials::new(username.clone(), password));
        }
        if let Some(reconnect) = self.autoreconnect {
            server_options.insert(
                "auto_reconnect".into(),
                Value::Bool(reconnect.driver_enabled()),
            );
        }
        db_options.extend(self.options.clone());

        if let Some(replicaset) = &self.replicaset {
            mode = ConnectionMode::ReplicaSet;
            replica_options.extend(replicaset.options.clone());
            if let Some(list) = &replicaset.servers {
                servers = Some(list.iter().map(ServerEntry::endpoint).collect());
            }
        }

        let endpoints = match servers {
            Some(list) if mode == ConnectionMode::ReplicaSet && !list.is_empty() => list,
            _ => vec![Endpoint::new(
                host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port,
            )],
        };

        Ok(ConnectionDescriptor {
            mode,
            endpoints,
            database,
            credentials,
            server_options,
            db_options,
            replica_options,
        })
    }
}

/// Topology of the configured deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// One server.
    Single,
    /// A replica set.
    ReplicaSet,
}

/// A server address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// Port.
    pub port: Port,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: Port) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host and port, failing on an unusable port.
    pub fn resolve(&self) -> StoreResult<(String, u16)> {
        Ok((self.host.clone(), self.port.resolve()?))
    }
}

/// Authentication credentials.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    /// Principal name.
    pub username: String,
    /// Secret; never serialized or printed.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Normalized connection settings. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionDescriptor {
    /// Topology.
    pub mode: ConnectionMode,
    /// Servers in declaration order.
    pub endpoints: Vec<Endpoint>,
    /// Database name.
    pub database: Option<String>,
    /// Credentials, if authentication is required.
    pub credentials: Option<Credentials>,
    /// Connection-level options.
    pub server_options: Map<String, Value>,
    /// Database-level options.
    pub db_options: Map<String, Value>,
    /// Replica set options.
    pub replica_options: Map<String, Value>,
}

impl ConnectionDescriptor {
    /// The database name, required to open a connection.
    pub fn database_name(&self) -> StoreResult<&str> {
        self.database
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StoreError::configuration("no database name configured"))
    }

    /// Resolves every endpoint, failing on the first unusable port.
    pub fn resolve_endpoints(&self) -> StoreResult<Vec<(String, u16)>> {
        self.endpoints.iter().map(Endpoint::resolve).collect()
    }

    /// Whether driver-level reconnection is enabled.
    pub fn driver_auto_reconnect(&self) -> bool {
        option(&self.server_options, "auto_reconnect")
            .or_else(|| option(&self.server_options, "autoReconnect"))
            .map_or(true, |v| v.as_bool().unwrap_or(true))
    }

    /// The replica set name, if configured.
    pub fn replica_set_name(&self) -> Option<&str> {
        ["replicaSet", "rs_name", "name"]
            .iter()
            .find_map(|key| option(&self.replica_options, key))
            .and_then(Value::as_str)
    }
}

/// Case-insensitive option lookup.
pub(crate) fn option<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn non_empty(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn options(value: Value) -> StoreOptions {
        StoreOptions::from_value(value).unwrap()
    }

    #[test]
    fn defaults() {
        let descriptor = options(json!({"name": "app"})).descriptor().unwrap();
        assert_eq!(descriptor.mode, ConnectionMode::Single);
        assert_eq!(descriptor.endpoints, vec![Endpoint::new(DEFAULT_HOST, Port::Default)]);
        assert_eq!(descriptor.resolve_endpoints().unwrap(), vec![("localhost".to_string(), 27017)]);
        assert_eq!(descriptor.database_name().unwrap(), "app");
        assert_eq!(descriptor.db_options.get("w"), Some(&json!(1)));
        assert!(descriptor.driver_auto_reconnect());
        assert!(descriptor.credentials.is_none());
    }

    #[test]
    fn missing_database_fails_at_resolution() {
        let descriptor = StoreOptions::new().descriptor().unwrap();
        assert!(descriptor.database_name().is_err());
    }

    #[test]
    fn url_database_defaults_to_admin() {
        let descriptor = options(json!({"url": "mongodb://h"})).descriptor().unwrap();
        assert_eq!(descriptor.database_name().unwrap(), "admin");
    }

    #[test]
    fn url_with_many_hosts_is_replica_set() {
        let descriptor = options(json!({"url": "mongodb://a,b:27018,c/app"}))
            .descriptor()
            .unwrap();
        assert_eq!(descriptor.mode, ConnectionMode::ReplicaSet);
        assert_eq!(descriptor.endpoints.len(), 3);
    }

    #[test]
    fn structured_fields_override_url() {
        let descriptor = options(json!({
            "url": "mongodb://u:p@a:1000/one?w=2",
            "name": "two",
            "server": "b",
            "port": "2000",
            "options": {"w": "majority"}
        }))
        .descriptor()
        .unwrap();

        assert_eq!(descriptor.endpoints, vec![Endpoint::new("b", Port::Number(2000))]);
        assert_eq!(descriptor.database.as_deref(), Some("two"));
        assert_eq!(descriptor.db_options.get("w"), Some(&json!("majority")));
        assert_eq!(descriptor.credentials.unwrap().username, "u");
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let descriptor = options(json!({"url": "mongodb://a/app", "host": "", "name": ""}))
            .descriptor()
            .unwrap();
        assert_eq!(descriptor.endpoints[0].host, "a");
        assert_eq!(descriptor.database.as_deref(), Some("app"));
    }

    #[test]
    fn port_strings_parse_leading_digits() {
        assert_eq!(Port::parse("27018"), Port::Number(27018));
        assert_eq!(Port::parse("27018abc"), Port::Number(27018));
        assert_eq!(Port::parse(" 42"), Port::Number(42));
        assert_eq!(Port::parse("0"), Port::Default);
        assert!(matches!(Port::parse("abc"), Port::Invalid(_)));
        assert!(matches!(Port::parse("-1"), Port::Invalid(_)));
        assert!(matches!(Port::parse("70000"), Port::Invalid(_)));
    }

    #[test]
    fn invalid_port_fails_at_resolution_not_parse() {
        let descriptor = options(json!({"name": "app", "port": "nope"}))
            .descriptor()
            .unwrap();
        let err = descriptor.resolve_endpoints().unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Configuration);
    }

    #[test]
    fn replicaset_forces_mode() {
        let descriptor = options(json!({
            "name": "app",
            "host": "solo",
            "replicaset": {"options": {"replicaSet": "rs0"}}
        }))
        .descriptor()
        .unwrap();

        assert_eq!(descriptor.mode, ConnectionMode::ReplicaSet);
        assert_eq!(descriptor.endpoints, vec![Endpoint::new("solo", Port::Default)]);
        assert_eq!(descriptor.replica_set_name(), Some("rs0"));
    }

    #[test]
    fn replicaset_servers_replace_url_hosts() {
        let descriptor = options(json!({
            "url": "mongodb://a,b/app",
            "replicaset": {"servers": [{"host": "x", "port": 1}, {"server": "y"}]}
        }))
        .descriptor()
        .unwrap();

        assert_eq!(
            descriptor.endpoints,
            vec![
                Endpoint::new("x", Port::Number(1)),
                Endpoint::new("y", Port::Default)
            ]
        );
    }

    #[test]
    fn autoreconnect_modes() {
        let mode = |v: Value| options(json!({"autoreconnect": v})).auto_reconnect();
        assert_eq!(mode(json!(false)), AutoReconnect::Disabled);
        assert_eq!(mode(json!(0)), AutoReconnect::Disabled);
        assert_eq!(mode(json!(true)), AutoReconnect::Driver);
        assert_eq!(mode(json!(1)), AutoReconnect::Driver);
        assert_eq!(mode(json!(2)), AutoReconnect::Custom);
        assert_eq!(StoreOptions::new().auto_reconnect(), AutoReconnect::Driver);

        let descriptor = options(json!({"name": "app", "autoreconnect": false}))
            .descriptor()
            .unwrap();
        assert!(!descriptor.driver_auto_reconnect());
    }

    #[test]
    fn credentials_need_a_username() {
        let descriptor = options(json!({"name": "app", "password": "secret"}))
            .descriptor()
            .unwrap();
        assert!(descriptor.credentials.is_none());

        let descriptor = options(json!({"name": "app", "user": "bob", "pass": "secret"}))
            .descriptor()
            .unwrap();
        let creds = descriptor.credentials.unwrap();
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.password.as_deref(), Some("secret"));
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn reconnect_policy_defaults() {
        let policy = options(json!({"minwait": 0})).reconnect_policy();
        assert_eq!(policy.min_wait, Duration::from_millis(DEFAULT_MIN_WAIT_MS));
        assert_eq!(policy.max_wait, Duration::from_millis(DEFAULT_MAX_WAIT_MS));

        let policy = options(json!({"minwait": 10, "maxwait": 80})).reconnect_policy();
        assert_eq!(policy.min_wait, Duration::from_millis(10));
        assert_eq!(policy.max_wait, Duration::from_millis(80));
    }

    #[test]
    fn builder() {
        let opts = StoreOptions::new()
            .with_host("db")
            .with_port(27020)
            .with_name("app")
            .with_credentials("admin", "pw")
            .with_option("journal", true)
            .with_connect(false);

        assert!(opts.defers_connect());
        let descriptor = opts.descriptor().unwrap();
        assert_eq!(descriptor.resolve_endpoints().unwrap(), vec![("db".to_string(), 27020)]);
        assert_eq!(descriptor.db_options.get("journal"), Some(&json!(true)));
    }

    #[test]
    fn unknown_keys_ignored() {
        let opts = options(json!({"name": "app", "map": {"-/-/foo": "*"}}));
        assert_eq!(opts.name.as_deref(), Some("app"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"url": "mongodb://h:27017/app", "minwait": 32}}"#).unwrap();

        let opts = StoreOptions::from_file(file.path()).unwrap();
        assert_eq!(opts.minwait, Some(32));
        assert_eq!(opts.descriptor().unwrap().database_name().unwrap(), "app");

        assert!(StoreOptions::from_file("/nonexistent/mongostore.json").is_err());
    }

    #[test]
    fn serialized_options_hide_secrets() {
        let opts = StoreOptions::new().with_credentials("admin", "hunter2");
        let text = serde_json::to_string(&opts).unwrap();
        assert!(text.contains("admin"));
        assert!(!text.contains("hunter2"));
    }
}
