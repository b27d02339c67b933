//! # roomcast
//!
//! Server binary: loads configuration, installs logging and metrics, and
//! serves until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use roomcast_server::config::{apply_env_overrides, load_from_path, process_env};
use roomcast_server::{RoomcastServer, ServerConfig};
use roomcast_telemetry::{LogFormat, TelemetryConfig, init_telemetry};
use tracing::{Level, info, warn};

/// Room-scoped WebSocket chat fan-out server.
#[derive(Parser, Debug)]
#[command(name = "roomcast", version, about = "Room-scoped WebSocket chat fan-out server")]
struct Cli {
    /// JSON config file, merged over the built-in defaults.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Outbound queue capacity per connection.
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Do not broadcast a leave message when a connection closes.
    #[arg(long)]
    no_leave: bool,

    /// Default log level (`RUST_LOG` takes precedence).
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log output format: json or pretty.
    #[arg(long, default_value = "json")]
    log_format: LogFormat,
}

impl Cli {
    /// Defaults, then config file, then `ROOMCAST_*` env, then flags.
    fn load_config<F>(&self, env: F) -> Result<ServerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.config {
            Some(path) => {
                if !path.exists() {
                    bail!("config file not found: {}", path.display());
                }
                load_from_path(path)
                    .with_context(|| format!("failed to load config from {}", path.display()))?
            }
            None => ServerConfig::default(),
        };
        apply_env_overrides(&mut config, env);

        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if self.no_leave {
            config.announce_leave = false;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        log_level: cli.log_level,
        module_levels: Vec::new(),
        format: cli.log_format,
    })
    .context("failed to initialise logging")?;

    let config = cli.load_config(process_env)?;
    let metrics = roomcast_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let server = RoomcastServer::new(config, Some(metrics)).context("failed to create server")?;
    let handle = server.listen().await.context("failed to start server")?;
    info!(addr = %handle.local_addr(), "roomcast listening on http://{}", handle.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    if !handle.shutdown().await {
        warn!("connections did not drain before the shutdown timeout");
    }
    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::parse_from(["roomcast"]);
        assert_eq!(cli.log_level, Level::INFO);
        assert_eq!(cli.log_format, LogFormat::Json);

        let config = cli.load_config(no_env).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn flags_override_file_and_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 9000, "host": "10.0.0.1", "queue_capacity": 64}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let cli = Cli::parse_from(["roomcast", "--config", &path, "--port", "9100", "--no-leave"]);
        let config = cli
            .load_config(|name| (name == "ROOMCAST_HOST").then(|| "127.0.0.1".to_owned()))
            .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.queue_capacity, 64);
        assert!(!config.announce_leave);
    }

    #[test]
    fn missing_config_file_is_error() {
        let cli = Cli::parse_from(["roomcast", "--config", "/nonexistent/roomcast.json"]);
        let err = cli.load_config(no_env).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn invalid_result_is_rejected() {
        let cli = Cli::parse_from(["roomcast", "--queue-capacity", "0"]);
        assert!(cli.load_config(no_env).is_err());
    }

    #[test]
    fn log_format_flag() {
        let cli = Cli::parse_from(["roomcast", "--log-format", "pretty", "--log-level", "debug"]);
        assert_eq!(cli.log_format, LogFormat::Pretty);
        assert_eq!(cli.log_level, Level::DEBUG);
    }

    #[test]
    fn unknown_log_format_fails_to_parse() {
        assert!(Cli::try_parse_from(["roomcast", "--log-format", "xml"]).is_err());
    }
}
