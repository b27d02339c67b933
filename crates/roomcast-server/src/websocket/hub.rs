//! Connection registry and room-scoped fan-out.
//!
//! The hub is the only owner of each connection's queue producer. Removing a
//! member from the map drops that producer, which is what closes the queue and
//! tells the connection's outbound pump to send a close frame and stop.
//!
//! Every operation holds the membership lock for its whole duration and never
//! awaits while holding it, so register, unregister and broadcast are totally
//! ordered. Within a room, recipients see messages in `broadcast` call order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use roomcast_core::{ConnectionId, Identity, Message};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::metrics as m;

/// Default per-connection queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Consumer end of a connection's outbound queue.
pub type OutboundQueue = mpsc::Receiver<Arc<Message>>;

/// Outcome of one [`Hub::broadcast`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members of the target room at the start of the pass.
    pub recipients: usize,
    /// Members whose queue accepted the message.
    pub delivered: usize,
    /// Members removed during the pass because their queue was full or its
    /// consumer was gone.
    pub evicted: Vec<ConnectionId>,
}

struct Member {
    identity: Identity,
    tx: mpsc::Sender<Arc<Message>>,
}

/// Registry of live connections.
pub struct Hub {
    members: Mutex<HashMap<ConnectionId, Member>>,
    queue_capacity: usize,
}

impl Hub {
    /// Create an empty hub. `queue_capacity` is clamped to at least 1.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Capacity of each connection's outbound queue.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Add a connection bound to `identity`.
    ///
    /// Returns the new id and the consumer end of its (empty) outbound queue.
    pub fn register(&self, identity: Identity) -> (ConnectionId, OutboundQueue) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let active = {
            let mut members = self.members.lock();
            let _ = members.insert(
                id.clone(),
                Member {
                    identity: identity.clone(),
                    tx,
                },
            );
            members.len()
        };

        metrics::counter!(m::WS_CONNECTIONS_TOTAL).increment(1);
        metrics::gauge!(m::WS_CONNECTIONS_ACTIVE).set(active as f64);
        info!(
            conn_id = %id,
            username = %identity.username,
            room = %identity.room,
            active,
            "connection registered"
        );
        (id, rx)
    }

    /// Remove a connection and close its queue.
    ///
    /// Returns `true` if it was present. Calling this for a connection that is
    /// already gone (unregistered or evicted) is a no-op.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let (removed, active) = {
            let mut members = self.members.lock();
            let removed = members.remove(id);
            (removed, members.len())
        };

        let Some(member) = removed else {
            debug!(conn_id = %id, "unregister: connection already absent");
            return false;
        };
        // Dropping the only producer closes the queue.
        drop(member.tx);

        metrics::counter!(m::WS_DISCONNECTIONS_TOTAL).increment(1);
        metrics::gauge!(m::WS_CONNECTIONS_ACTIVE).set(active as f64);
        info!(
            conn_id = %id,
            username = %member.identity.username,
            room = %member.identity.room,
            active,
            "connection unregistered"
        );
        true
    }

    /// Enqueue `message` for every member of `message.room()`.
    ///
    /// Never waits on a consumer: a member whose queue is full is evicted in
    /// the same pass (removed and its queue closed) instead.
    pub fn broadcast(&self, message: Message) -> BroadcastReport {
        let message = Arc::new(message);
        let mut report = BroadcastReport::default();

        let active = {
            let mut members = self.members.lock();
            members.retain(|id, member| {
                if member.identity.room != message.room() {
                    return true;
                }
                report.recipients += 1;
                match member.tx.try_send(Arc::clone(&message)) {
                    Ok(()) => {
                        report.delivered += 1;
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            conn_id = %id,
                            username = %member.identity.username,
                            room = %member.identity.room,
                            capacity = self.queue_capacity,
                            "outbound queue full, evicting slow consumer"
                        );
                        report.evicted.push(id.clone());
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(conn_id = %id, "outbound queue has no consumer, evicting");
                        report.evicted.push(id.clone());
                        false
                    }
                }
            });
            members.len()
        };

        metrics::counter!(m::MESSAGES_BROADCAST_TOTAL, "kind" => message.kind().as_str())
            .increment(1);
        metrics::counter!(m::MESSAGES_DELIVERED_TOTAL).increment(report.delivered as u64);
        if !report.evicted.is_empty() {
            metrics::counter!(m::WS_EVICTIONS_TOTAL).increment(report.evicted.len() as u64);
            metrics::counter!(m::WS_DISCONNECTIONS_TOTAL).increment(report.evicted.len() as u64);
            metrics::gauge!(m::WS_CONNECTIONS_ACTIVE).set(active as f64);
        }
        debug!(
            kind = message.kind().as_str(),
            room = message.room(),
            recipients = report.recipients,
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "broadcast"
        );
        report
    }

    /// Remove every member, closing all queues. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(ConnectionId, Member)> = self.members.lock().drain().collect();
        let closed = drained.len();
        drop(drained);
        if closed > 0 {
            metrics::counter!(m::WS_DISCONNECTIONS_TOTAL).increment(closed as u64);
            metrics::gauge!(m::WS_CONNECTIONS_ACTIVE).set(0.0);
            info!(closed, "closed all connections");
        }
        closed
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Number of live connections bound to `room`.
    pub fn room_count(&self, room: &str) -> usize {
        self.members
            .lock()
            .values()
            .filter(|m| m.identity.room == room)
            .count()
    }

    /// Live member count per room.
    pub fn rooms(&self) -> BTreeMap<String, usize> {
        let members = self.members.lock();
        let mut rooms = BTreeMap::new();
        for member in members.values() {
            *rooms.entry(member.identity.room.clone()).or_insert(0) += 1;
        }
        rooms
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.lock().contains_key(id)
    }

    /// Identity bound to `id`, if registered.
    pub fn identity(&self, id: &ConnectionId) -> Option<Identity> {
        self.members.lock().get(id).map(|m| m.identity.clone())
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
