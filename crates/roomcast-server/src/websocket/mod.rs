//! WebSocket connection registry, per-connection pumps and lifecycle.

pub mod connection;
pub mod hub;
pub mod inbound;
pub mod lifecycle;
pub mod outbound;

/// Frame type exchanged with the transport.
pub use axum::extract::ws::Message as WsFrame;
