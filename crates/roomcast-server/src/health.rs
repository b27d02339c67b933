//! `/health` endpoint.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the server is up.
    pub status: &'static str,
    /// Current time, RFC 3339.
    pub time: String,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Live connections per room.
    pub rooms: BTreeMap<String, usize>,
}

/// Build a health response for `now`.
pub fn health_check(now: DateTime<Utc>, rooms: BTreeMap<String, usize>) -> HealthResponse {
    HealthResponse {
        status: "healthy",
        time: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        connections: rooms.values().sum(),
        rooms,
    }
}
