//! Outbound pump: drain the per-connection queue and keep the peer alive with pings.

use std::fmt::Display;
use std::time::Duration;

use axum::body::Bytes;
use futures::{Sink, SinkExt};
use roomcast_core::ConnectionId;
use tokio::time::{self, Instant, MissedTickBehavior, timeout};
use tracing::{debug, trace, warn};

use super::WsFrame;
use super::connection::{ConnectionSettings, OutboundExit};
use super::hub::OutboundQueue;

/// Run until the hub closes the queue or a write fails.
///
/// When the queue is closed, whatever was already buffered is written first,
/// then a close frame. The first ping goes out one heartbeat interval after
/// start.
pub async fn run_outbound<S>(
    id: ConnectionId,
    mut sink: S,
    mut queue: OutboundQueue,
    settings: ConnectionSettings,
) -> OutboundExit
where
    S: Sink<WsFrame> + Unpin,
    S::Error: Display,
{
    let mut heartbeat = time::interval_at(
        Instant::now() + settings.heartbeat_interval,
        settings.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(message) = next else {
                    if let Err(exit) =
                        write_frame(&mut sink, WsFrame::Close(None), settings.write_timeout).await
                    {
                        debug!(conn_id = %id, ?exit, "close frame not delivered");
                    }
                    return OutboundExit::QueueClosed;
                };
                let json = match serde_json::to_string(message.as_ref()) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(conn_id = %id, error = %e, "failed to serialize message");
                        continue;
                    }
                };
                if let Err(exit) =
                    write_frame(&mut sink, WsFrame::Text(json.into()), settings.write_timeout).await
                {
                    return exit;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(exit) =
                    write_frame(&mut sink, WsFrame::Ping(Bytes::new()), settings.write_timeout).await
                {
                    return exit;
                }
                trace!(conn_id = %id, "ping sent");
            }
        }
    }
}

/// Send one frame, giving up after `deadline`.
pub async fn write_frame<S>(sink: &mut S, frame: WsFrame, deadline: Duration) -> Result<(), OutboundExit>
where
    S: Sink<WsFrame> + Unpin,
    S::Error: Display,
{
    match timeout(deadline, sink.send(frame)).await {
        Err(_) => Err(OutboundExit::WriteTimeout),
        Ok(Err(e)) => Err(OutboundExit::Transport(e.to_string())),
        Ok(Ok(())) => Ok(()),
    }
}
