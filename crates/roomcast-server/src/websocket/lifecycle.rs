//! Connection orchestration: register, announce, run both pumps, tear down.

use std::fmt::Display;
use std::sync::Arc;

use futures::{Sink, Stream};
use roomcast_core::{ConnectionId, Identity, Message};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use super::WsFrame;
use super::connection::{
    ConnectionSettings, ConnectionState, InboundExit, Lifecycle, OutboundExit, Termination,
};
use super::hub::Hub;
use super::inbound::run_inbound;
use super::outbound::run_outbound;
use crate::metrics as m;

/// Per-connection behaviour chosen by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Pump timings.
    pub settings: ConnectionSettings,
    /// Broadcast a `leave` message to the room after the connection is gone.
    pub announce_leave: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            settings: ConnectionSettings::default(),
            announce_leave: true,
        }
    }
}

/// Outcome of a finished connection.
#[derive(Clone, Debug)]
pub struct ConnectionReport {
    /// Id the hub assigned.
    pub id: ConnectionId,
    /// Identity the connection was bound to.
    pub identity: Identity,
    /// What ended the connection.
    pub termination: Termination,
    /// `true` if the hub had already dropped the connection (eviction or
    /// shutdown) before teardown.
    pub evicted: bool,
    /// Final lifecycle state; always `Closed` once the report exists.
    pub state: ConnectionState,
}

enum FirstExit {
    Inbound(Result<InboundExit, JoinError>),
    Outbound(Result<OutboundExit, JoinError>),
}

/// Drive one connection from registration to `Closed`.
///
/// The join announcement is broadcast after registration, so the joiner sees
/// its own join. Whichever pump stops first ends the connection:
///
/// - inbound first: the connection is unregistered, which closes the queue and
///   lets the outbound pump flush and send a close frame.
/// - outbound first: the transport is no longer writable, so the inbound pump
///   is aborted before the connection is unregistered.
pub async fn run_connection<S, R, E>(
    hub: Arc<Hub>,
    identity: Identity,
    sink: S,
    stream: R,
    options: ConnectionOptions,
) -> ConnectionReport
where
    S: Sink<WsFrame> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<WsFrame, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let lifecycle = Lifecycle::new();
    let started = Instant::now();
    let settings = options.settings;

    let (id, queue) = hub.register(identity.clone());
    let _ = hub.broadcast(Message::join(&identity));
    let _ = lifecycle.advance(ConnectionState::Active);

    let span = info_span!(
        "connection",
        conn_id = %id,
        username = %identity.username,
        room = %identity.room,
    );
    let mut outbound =
        tokio::spawn(run_outbound(id.clone(), sink, queue, settings).instrument(span.clone()));
    let mut inbound = tokio::spawn(
        run_inbound(
            id.clone(),
            identity.clone(),
            stream,
            Arc::clone(&hub),
            settings.read_timeout,
        )
        .instrument(span),
    );

    let first = tokio::select! {
        res = &mut inbound => FirstExit::Inbound(res),
        res = &mut outbound => FirstExit::Outbound(res),
    };
    let _ = lifecycle.advance(ConnectionState::Terminating);

    let (termination, evicted) = match first {
        FirstExit::Inbound(res) => {
            let termination = res.map_or_else(task_failed, Termination::Inbound);
            let evicted = !hub.unregister(&id);
            if let Err(e) = outbound.await {
                warn!(conn_id = %id, error = %e, "outbound pump failed during teardown");
            }
            (termination, evicted)
        }
        FirstExit::Outbound(res) => {
            let termination = res.map_or_else(task_failed, Termination::Outbound);
            inbound.abort();
            let evicted = !hub.unregister(&id);
            if let Err(e) = inbound.await {
                if !e.is_cancelled() {
                    warn!(conn_id = %id, error = %e, "inbound pump failed during teardown");
                }
            }
            (termination, evicted)
        }
    };

    if options.announce_leave {
        let _ = hub.broadcast(Message::leave(&identity));
    }
    let _ = lifecycle.advance(ConnectionState::Closed);

    metrics::counter!(m::WS_TERMINATIONS_TOTAL, "reason" => termination.reason()).increment(1);
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let reason = termination.reason();
    if termination.is_abnormal() {
        warn!(
            conn_id = %id,
            username = %identity.username,
            room = %identity.room,
            reason,
            ?termination,
            evicted,
            elapsed_ms,
            "connection closed abnormally"
        );
    } else if termination == Termination::Inbound(InboundExit::ReadTimeout) {
        info!(conn_id = %id, room = %identity.room, reason, evicted, elapsed_ms, "connection timed out");
    } else {
        debug!(conn_id = %id, room = %identity.room, reason, evicted, elapsed_ms, "connection closed");
    }

    ConnectionReport {
        id,
        identity,
        termination,
        evicted,
        state: lifecycle.state(),
    }
}

fn task_failed(e: JoinError) -> Termination {
    Termination::TaskFailed(e.to_string())
}
