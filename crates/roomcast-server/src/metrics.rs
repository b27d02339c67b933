//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded. The handle renders the
/// `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections registered (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections removed from the hub for any reason (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections evicted by a broadcast (counter, labels: cause).
pub const WS_EVICTIONS_TOTAL: &str = "ws_evictions_total";
/// Finished connections (counter, labels: reason).
pub const WS_TERMINATIONS_TOTAL: &str = "ws_terminations_total";
/// Messages broadcast (counter, labels: kind).
pub const MESSAGES_BROADCAST_TOTAL: &str = "messages_broadcast_total";
/// Per-recipient enqueues (counter).
pub const MESSAGES_DELIVERED_TOTAL: &str = "messages_delivered_total";
/// Client frames dropped as undecodable (counter, labels: kind).
pub const MALFORMED_FRAMES_TOTAL: &str = "malformed_frames_total";
