//! Server configuration and loading.
//!
//! Loading flow:
//! 1. Start with [`ServerConfig::default()`]
//! 2. If a config file is given and exists, deep-merge its JSON over the defaults
//! 3. Apply `ROOMCAST_*` environment overrides
//!
//! The binary applies CLI flags on top and then calls [`ServerConfig::validate`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{ConfigError, bind_target};
use crate::websocket::connection::ConnectionSettings;
use crate::websocket::hub::DEFAULT_QUEUE_CAPACITY;
use crate::websocket::lifecycle::ConnectionOptions;

/// Configuration for the roomcast server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`; `0` picks a free port).
    pub port: u16,
    /// Capacity of each connection's outbound queue.
    pub queue_capacity: usize,
    /// Seconds between pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a connection is dropped.
    pub read_timeout_secs: u64,
    /// Seconds allowed for a single outbound write.
    pub write_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Broadcast a `leave` message when a connection goes away.
    pub announce_leave: bool,
    /// CORS allow-list. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Seconds to wait for connections to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            heartbeat_interval_secs: 54,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            max_message_size: 64 * 1024,
            announce_leave: true,
            allowed_origins: Vec::new(),
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if self.max_message_size < 1024 {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must be at least 1024 bytes, got {}",
                self.max_message_size
            )));
        }
        if let Some(origin) = self
            .allowed_origins
            .iter()
            .find(|o| HeaderValue::from_str(o).is_err())
        {
            return Err(ConfigError::Invalid(format!("invalid CORS origin {origin:?}")));
        }
        let _ = self.connection_settings()?;
        Ok(())
    }

    /// Pump timings derived from the `*_secs` fields.
    pub fn connection_settings(&self) -> Result<ConnectionSettings, ConfigError> {
        ConnectionSettings::new(
            Duration::from_secs(self.heartbeat_interval_secs),
            Duration::from_secs(self.read_timeout_secs),
            Duration::from_secs(self.write_timeout_secs),
        )
    }

    /// Per-connection options handed to every new connection.
    pub fn connection_options(&self) -> Result<ConnectionOptions, ConfigError> {
        Ok(ConnectionOptions {
            settings: self.connection_settings()?,
            announce_leave: self.announce_leave,
        })
    }

    /// Grace period for shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// `host:port` as handed to the listener.
    pub fn bind_addr(&self) -> String {
        bind_target(&self.host, self.port)
    }
}

/// Load config from `path` deep-merged over the defaults.
///
/// A missing file yields the defaults. Environment overrides are not applied;
/// see [`apply_env_overrides`].
pub fn load_from_path(path: &Path) -> Result<ServerConfig, ConfigError> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading config from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "config file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and primitives are replaced, and nulls in
/// `source` keep the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Environment lookup backed by the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Apply `ROOMCAST_*` overrides read through `lookup`.
///
/// Values that fail to parse or are out of range are logged and ignored.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("ROOMCAST_HOST") {
        config.host = v;
    }
    if let Some(v) = env.ranged("ROOMCAST_PORT", 0_u16, u16::MAX) {
        config.port = v;
    }
    if let Some(v) = env.ranged("ROOMCAST_QUEUE_CAPACITY", 1_usize, 1 << 20) {
        config.queue_capacity = v;
    }
    if let Some(v) = env.ranged("ROOMCAST_HEARTBEAT_INTERVAL_SECS", 1_u64, 3600) {
        config.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.ranged("ROOMCAST_READ_TIMEOUT_SECS", 1_u64, 3600) {
        config.read_timeout_secs = v;
    }
    if let Some(v) = env.ranged("ROOMCAST_WRITE_TIMEOUT_SECS", 1_u64, 3600) {
        config.write_timeout_secs = v;
    }
    if let Some(v) = env.ranged("ROOMCAST_MAX_MESSAGE_SIZE", 1024_usize, 64 << 20) {
        config.max_message_size = v;
    }
    if let Some(v) = env.boolean("ROOMCAST_ANNOUNCE_LEAVE") {
        config.announce_leave = v;
    }
    if let Some(v) = env.string("ROOMCAST_ALLOWED_ORIGINS") {
        config.allowed_origins = v
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_owned)
            .collect();
    }
    if let Some(v) = env.ranged("ROOMCAST_SHUTDOWN_TIMEOUT_SECS", 0_u64, 3600) {
        config.shutdown_timeout_secs = v;
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number within `min..=max`.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn boolean(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: FromStr + PartialOrd,
    {
        let val = self.string(name)?;
        let result = parse_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}
