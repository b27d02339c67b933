//! `RoomcastServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::Utc;
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use roomcast_core::Identity;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::Hub;
use crate::websocket::lifecycle::{ConnectionOptions, run_connection};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection registry.
    pub hub: Arc<Hub>,
    /// Shutdown signal.
    pub shutdown: ShutdownCoordinator,
    /// Tracks live connection tasks so shutdown can wait for them.
    pub tracker: TaskTracker,
    /// Options handed to every connection.
    pub options: ConnectionOptions,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
    /// Renders `/metrics`; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Query parameters accepted by `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Display name; defaults to `Anonymous`.
    pub username: Option<String>,
    /// Room to join; defaults to `general`.
    pub room: Option<String>,
}

/// The roomcast server.
pub struct RoomcastServer {
    config: ServerConfig,
    state: AppState,
}

impl RoomcastServer {
    /// Create a server from a config. Fails if the config does not validate.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Result<Self, ServerError> {
        config.validate()?;
        let state = AppState {
            hub: Arc::new(Hub::new(config.queue_capacity)),
            shutdown: ShutdownCoordinator::new(),
            tracker: TaskTracker::new(),
            options: config.connection_options()?,
            max_message_size: config.max_message_size,
            metrics,
        };
        Ok(Self { config, state })
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&self.config.allowed_origins))
            .with_state(self.state.clone())
    }

    /// Connection registry.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.state.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the listener and start serving in the background.
    ///
    /// When shutdown is signalled, the listener stops accepting and every
    /// connection's queue is closed so each one sends a close frame and exits.
    pub async fn listen(self) -> Result<ServerHandle, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!(addr = %local_addr, "roomcast server listening");

        let router = self.router();
        let signal = {
            let token = self.state.shutdown.token();
            let hub = Arc::clone(&self.state.hub);
            async move {
                token.cancelled().await;
                let closed = hub.close_all();
                info!(closed, "shutdown signalled, closing connections");
            }
        };
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });

        Ok(ServerHandle {
            addr: local_addr,
            shutdown_timeout: self.config.shutdown_timeout(),
            state: self.state,
            server,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_timeout: std::time::Duration,
    state: AppState,
    server: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connection registry.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.state.hub
    }

    /// Stop accepting, close every connection, and wait for them to drain.
    ///
    /// Returns `false` if the shutdown timeout elapsed first.
    pub async fn shutdown(self) -> bool {
        self.state.tracker.close();
        let tracker = self.state.tracker.clone();
        let drain = tokio::spawn(async move { tracker.wait().await });
        self.state
            .shutdown
            .graceful_shutdown(vec![self.server, drain], Some(self.shutdown_timeout))
            .await
    }
}

/// CORS: any origin when `origins` is empty, otherwise the listed ones.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let identity = Identity::resolve(params.username, params.room);
    debug!(username = %identity.username, room = %identity.room, "websocket upgrade requested");

    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, identity, state))
}

async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    if state.shutdown.is_shutting_down() {
        debug!("dropping websocket accepted during shutdown");
        return;
    }
    let (sink, stream) = socket.split();
    let hub = Arc::clone(&state.hub);
    let _report = state
        .tracker
        .track_future(run_connection(hub, identity, sink, stream, state.options))
        .await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(Utc::now(), state.hub.rooms()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
