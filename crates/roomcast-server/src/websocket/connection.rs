//! Per-connection settings, pump exit reasons and the lifecycle state machine.

use std::fmt;
use std::time::Duration;

use axum::extract::ws::close_code;
use parking_lot::Mutex;

use crate::errors::ConfigError;

/// Timing knobs shared by both pumps of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// How often the outbound pump sends a ping.
    pub heartbeat_interval: Duration,
    /// How long the inbound pump waits for any frame before giving up.
    pub read_timeout: Duration,
    /// Deadline for a single outbound write.
    pub write_timeout: Duration,
}

impl ConnectionSettings {
    /// Build settings, rejecting a heartbeat that would not arrive before the
    /// peer's read deadline.
    pub fn new(
        heartbeat_interval: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if heartbeat_interval.is_zero() || write_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat interval and write timeout must be non-zero".into(),
            ));
        }
        if heartbeat_interval >= read_timeout {
            return Err(ConfigError::Invalid(format!(
                "heartbeat interval ({heartbeat_interval:?}) must be shorter than read timeout ({read_timeout:?})"
            )));
        }
        Ok(Self {
            heartbeat_interval,
            read_timeout,
            write_timeout,
        })
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(54),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Why the inbound pump stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundExit {
    /// Peer sent a close frame (with its close code, if any).
    PeerClosed(Option<u16>),
    /// The transport stream ended without a close frame.
    StreamEnded,
    /// Nothing arrived within the read window.
    ReadTimeout,
    /// Read error from the transport.
    Transport(String),
}

impl InboundExit {
    /// Whether this exit should be reported as an error rather than a normal
    /// disconnect.
    pub fn is_abnormal(&self) -> bool {
        match self {
            Self::PeerClosed(None) | Self::StreamEnded | Self::ReadTimeout => false,
            Self::PeerClosed(Some(code)) => !is_expected_close_code(*code),
            Self::Transport(_) => true,
        }
    }
}

/// Close codes treated as an ordinary disconnect.
pub fn is_expected_close_code(code: u16) -> bool {
    matches!(code, close_code::NORMAL | close_code::AWAY | close_code::ABNORMAL)
}

/// Why the outbound pump stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundExit {
    /// The registry closed the queue (unregister or eviction).
    QueueClosed,
    /// A write did not complete within the write deadline.
    WriteTimeout,
    /// Write error from the transport.
    Transport(String),
}

/// What moved a connection from `Active` to `Terminating`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The inbound pump exited first.
    Inbound(InboundExit),
    /// The outbound pump exited first.
    Outbound(OutboundExit),
    /// A pump task panicked or was cancelled.
    TaskFailed(String),
}

impl Termination {
    /// Short classification string for logging/metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Inbound(InboundExit::PeerClosed(_)) => "peer_closed",
            Self::Inbound(InboundExit::StreamEnded) => "stream_ended",
            Self::Inbound(InboundExit::ReadTimeout) => "read_timeout",
            Self::Inbound(InboundExit::Transport(_)) => "read_error",
            Self::Outbound(OutboundExit::QueueClosed) => "queue_closed",
            Self::Outbound(OutboundExit::WriteTimeout) => "write_timeout",
            Self::Outbound(OutboundExit::Transport(_)) => "write_error",
            Self::TaskFailed(_) => "task_failed",
        }
    }

    /// Whether the termination deserves a warning in the logs.
    pub fn is_abnormal(&self) -> bool {
        match self {
            Self::Inbound(exit) => exit.is_abnormal(),
            Self::Outbound(OutboundExit::QueueClosed) => false,
            Self::Outbound(_) | Self::TaskFailed(_) => true,
        }
    }
}

/// Connection lifecycle states.
///
/// `Connecting → Active → Terminating → Closed`. `Connecting → Terminating`
/// is allowed for a connection torn down before it ever went live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Identity resolved, not yet registered.
    Connecting,
    /// Registered, join announced, pumps running.
    Active,
    /// A pump detected a terminal condition; teardown in progress.
    Terminating,
    /// Both pumps gone, queue closed, transport released, not registered.
    Closed,
}

impl ConnectionState {
    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Active | Self::Terminating)
                | (Self::Active, Self::Terminating)
                | (Self::Terminating, Self::Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Shared cell holding a connection's current state.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<ConnectionState>,
}

impl Lifecycle {
    /// Start in `Connecting`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Connecting),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next` if the transition is legal.
    ///
    /// Returns `false` (and leaves the state untouched) otherwise, so repeated
    /// teardown calls are harmless.
    pub fn advance(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if state.can_advance_to(next) {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Whether the connection reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
