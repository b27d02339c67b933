//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while loading or validating [`ServerConfig`](crate::config::ServerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON or does not match the schema.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range or inconsistent with another.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },
    /// The bound listener has no usable local address.
    #[error("listener has no local address: {0}")]
    LocalAddr(std::io::Error),
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServerError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "bind",
            Self::LocalAddr(_) => "local_addr",
            Self::Config(_) => "config",
        }
    }
}

/// Format a host/port pair the way the listener is given it.
pub(crate) fn bind_target(host: &str, port: u16) -> String {
    match host.parse::<std::net::IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{host}:{port}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::Invalid("port out of range".into());
        assert_eq!(err.to_string(), "invalid config value: port out of range");
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: ConfigError = json_err.into();
        assert!(matches!(err, ConfigError::Json(_)));
        assert!(err.to_string().contains("parse config JSON"));
    }

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:80: denied");
        assert_eq!(err.error_kind(), "bind");
    }

    #[test]
    fn config_error_is_transparent() {
        let err: ServerError = ConfigError::Invalid("x".into()).into();
        assert_eq!(err.to_string(), "invalid config value: x");
        assert_eq!(err.error_kind(), "config");
    }

    #[test]
    fn bind_target_brackets_ipv6() {
        assert_eq!(bind_target("0.0.0.0", 8080), "0.0.0.0:8080");
        assert_eq!(bind_target("::1", 8080), "[::1]:8080");
        assert_eq!(bind_target("localhost", 9000), "localhost:9000");
    }
}
