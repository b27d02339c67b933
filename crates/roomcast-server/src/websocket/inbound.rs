//! Inbound pump: read frames, decode, stamp identity, hand to the hub.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use roomcast_core::{ConnectionId, Identity, InboundFrame, Message};
use tokio::time::timeout;
use tracing::{debug, trace};

use super::WsFrame;
use super::connection::InboundExit;
use super::hub::Hub;
use crate::metrics as m;

/// Run until the peer goes away, the transport fails, or nothing arrives for
/// `read_timeout`.
///
/// Every frame received (pongs included) restarts the read window. Frames that
/// fail to decode are dropped without affecting the connection.
pub async fn run_inbound<R, E>(
    id: ConnectionId,
    identity: Identity,
    mut stream: R,
    hub: Arc<Hub>,
    read_timeout: Duration,
) -> InboundExit
where
    R: Stream<Item = Result<WsFrame, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = match timeout(read_timeout, stream.next()).await {
            Err(_) => return InboundExit::ReadTimeout,
            Ok(None) => return InboundExit::StreamEnded,
            Ok(Some(Err(e))) => return InboundExit::Transport(e.to_string()),
            Ok(Some(Ok(frame))) => frame,
        };

        let decoded = match frame {
            WsFrame::Text(text) => InboundFrame::decode(text.as_str()),
            WsFrame::Binary(bytes) => InboundFrame::decode_bytes(&bytes),
            WsFrame::Pong(_) => {
                trace!(conn_id = %id, "pong received");
                continue;
            }
            // The transport answers pings itself.
            WsFrame::Ping(_) => continue,
            WsFrame::Close(close) => return InboundExit::PeerClosed(close.map(|f| f.code)),
        };

        match decoded {
            Ok(frame) => {
                let report = hub.broadcast(Message::stamped(frame, &identity));
                trace!(conn_id = %id, delivered = report.delivered, "relayed client message");
            }
            Err(e) => {
                metrics::counter!(m::MALFORMED_FRAMES_TOTAL, "kind" => e.error_kind()).increment(1);
                debug!(conn_id = %id, error = %e, "discarding malformed frame");
            }
        }
    }
}
