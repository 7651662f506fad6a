//! `mongodb://` connection string parsing.
//!
//! Form: `mongodb://[user[:pass]@]host1[:port1][,host2[:port2],...][/[database][?options]]`
//!
//! Credentials, host names and the database name may be percent-encoded.
//! Query-string options are sorted into server, db and replica option maps
//! so they can be layered over the defaults.

use crate::config::{Credentials, Endpoint, Port};
use crate::error::{StoreError, StoreResult};
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

const SCHEME: &str = "mongodb://";

/// Options that configure replica set membership and read routing.
const REPLICA_OPTIONS: &[&str] = &[
    "replicaset",
    "rs_name",
    "readpreference",
    "readpreferencetags",
    "maxstalenessseconds",
    "secondaryacceptablelatencyms",
];

/// Options that configure writes, reads and authentication for the database.
const DB_OPTIONS: &[&str] = &[
    "w",
    "wtimeoutms",
    "journal",
    "j",
    "fsync",
    "authsource",
    "authmechanism",
    "authmechanismproperties",
    "readconcernlevel",
    "native_parser",
];

/// A parsed connection string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedUrl {
    /// Hosts in declaration order.
    pub endpoints: Vec<Endpoint>,
    /// Database name from the path, if any.
    pub database: Option<String>,
    /// Embedded credentials, if any.
    pub credentials: Option<Credentials>,
    /// Connection-level options.
    pub server_options: Map<String, Value>,
    /// Database-level options.
    pub db_options: Map<String, Value>,
    /// Replica set options.
    pub replica_options: Map<String, Value>,
}

/// Parses a `mongodb://` connection string.
pub fn parse_connection_string(url: &str) -> StoreResult<ParsedUrl> {
    let rest = url.strip_prefix(SCHEME).ok_or_else(|| {
        if url.starts_with("mongodb+srv://") {
            StoreError::configuration("SRV connection strings are not supported")
        } else {
            StoreError::configuration(format!("connection string must start with {SCHEME}"))
        }
    })?;

    let split = rest.find(|c| c == '/' || c == '?').unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(split);

    let (userinfo, hosts) = match authority.rsplit_once('@') {
        Some((userinfo, hosts)) => (Some(userinfo), hosts),
        None => (None, authority),
    };

    let mut parsed = ParsedUrl {
        credentials: userinfo.map(parse_userinfo).transpose()?,
        endpoints: parse_hosts(hosts)?,
        ..ParsedUrl::default()
    };

    let (path, query) = match tail.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (tail, None),
    };

    let database = path.strip_prefix('/').unwrap_or(path);
    if !database.is_empty() {
        parsed.database = Some(decode(database)?);
    }

    if let Some(query) = query {
        parse_options(query, &mut parsed)?;
    }

    Ok(parsed)
}

fn parse_userinfo(info: &str) -> StoreResult<Credentials> {
    let (user, password) = match info.split_once(':') {
        Some((user, password)) => (user, Some(password)),
        None => (info, None),
    };

    let username = decode(user)?;
    if username.is_empty() {
        return Err(StoreError::configuration("empty username in connection string"));
    }

    Ok(Credentials::new(username, password.map(decode).transpose()?))
}

fn parse_hosts(hosts: &str) -> StoreResult<Vec<Endpoint>> {
    if hosts.is_empty() {
        return Err(StoreError::configuration("connection string has no hosts"));
    }
    hosts.split(',').map(parse_host).collect()
}

fn parse_host(spec: &str) -> StoreResult<Endpoint> {
    let (host, port) = if let Some(rest) = spec.strip_prefix('[') {
        // [v6-address]:port
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| StoreError::configuration(format!("unterminated IPv6 host: {spec}")))?;
        let port = match after {
            "" => None,
            after => Some(after.strip_prefix(':').ok_or_else(|| {
                StoreError::configuration(format!("malformed host: {spec}"))
            })?),
        };
        (host, port)
    } else {
        match spec.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (spec, None),
        }
    };

    if host.is_empty() {
        return Err(StoreError::configuration(format!("empty host in connection string: {spec:?}")));
    }

    let port = match port {
        None => Port::Default,
        Some(raw) => match raw.parse::<u16>() {
            Ok(n) if n > 0 => Port::Number(n),
            _ => {
                return Err(StoreError::configuration(format!(
                    "invalid port {raw:?} for host {host}"
                )))
            }
        },
    };

    Ok(Endpoint::new(decode(host)?, port))
}

fn parse_options(query: &str, parsed: &mut ParsedUrl) -> StoreResult<()> {
    for pair in query.split(|c| c == '&' || c == ';').filter(|p| !p.is_empty()) {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| StoreError::configuration(format!("option without value: {pair}")))?;

        let value = option_value(&decode(raw)?);
        let lower = key.to_ascii_lowercase();

        let target = if REPLICA_OPTIONS.contains(&lower.as_str()) {
            &mut parsed.replica_options
        } else if DB_OPTIONS.contains(&lower.as_str()) {
            &mut parsed.db_options
        } else {
            &mut parsed.server_options
        };
        target.insert(key.to_string(), value);
    }
    Ok(())
}

fn option_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

fn decode(raw: &str) -> StoreResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| StoreError::configuration(format!("invalid percent-encoding in {raw:?}: {e}")))
}
