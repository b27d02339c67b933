//! # roomcast-server
//!
//! Room-scoped WebSocket fan-out over Axum.
//!
//! - Hub: connection registry with room-scoped, non-blocking broadcast and
//!   eviction of consumers whose queue is full
//! - Per-connection inbound and outbound pumps with read/write deadlines and a
//!   ping heartbeat
//! - HTTP surface: `/ws`, `/health`, `/metrics`, CORS
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{ConfigError, ServerError};
pub use server::{RoomcastServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
pub use websocket::hub::{BroadcastReport, Hub};
pub use websocket::lifecycle::{ConnectionOptions, ConnectionReport, run_connection};
