//! Chat message model and client frame decoding.
//!
//! Wire format (both directions):
//!
//! ```json
//! {"type":"message","username":"alice","content":"hi","room":"general","timestamp":"2026-01-01T00:00:00Z"}
//! ```
//!
//! Clients only get to choose `type` and `content`. Sender, room and time are
//! stamped by the server from the connection's bound [`Identity`].

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::errors::FrameError;
use crate::identity::Identity;

/// Kind of chat event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// A member entered the room.
    #[serde(rename = "join")]
    Join,
    /// A member left the room.
    #[serde(rename = "leave")]
    Leave,
    /// Ordinary chat text.
    #[default]
    #[serde(rename = "message")]
    Chat,
}

impl MessageKind {
    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Chat => "message",
        }
    }
}

/// A chat event as relayed to room members.
///
/// Fields are read-only after construction; messages are shared between
/// recipients behind an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: MessageKind,
    username: String,
    content: String,
    room: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message for `identity` timestamped now.
    pub fn new(kind: MessageKind, identity: &Identity, content: impl Into<String>) -> Self {
        Self {
            kind,
            username: identity.username.clone(),
            content: content.into(),
            room: identity.room.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Announcement sent when a connection joins its room.
    pub fn join(identity: &Identity) -> Self {
        Self::new(
            MessageKind::Join,
            identity,
            format!("{} joined the room", identity.username),
        )
    }

    /// Announcement sent when a connection leaves its room.
    pub fn leave(identity: &Identity) -> Self {
        Self::new(
            MessageKind::Leave,
            identity,
            format!("{} left the room", identity.username),
        )
    }

    /// Turn a decoded client frame into a relayable message.
    ///
    /// Username, room and timestamp always come from the server side.
    pub fn stamped(frame: InboundFrame, identity: &Identity) -> Self {
        Self::new(frame.kind, identity, frame.content)
    }

    /// Event kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Sender username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Message body.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Room the message is scoped to.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Server-assigned time of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// The parts of a client payload the server honours.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundFrame {
    /// Requested event kind; `message` when absent.
    pub kind: MessageKind,
    /// Message body; empty when absent.
    pub content: String,
}

/// Lenient view of a client payload. Unknown keys (including any
/// client-supplied `username`, `room` or `timestamp`) are ignored.
#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<MessageKind>,
    #[serde(default)]
    content: Option<String>,
}

impl InboundFrame {
    /// Chat frame with the given body.
    pub fn chat(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Chat,
            content: content.into(),
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(FrameError::Malformed(serde_json::Error::custom(
                "expected a JSON object",
            )));
        }
        let raw: RawFrame = serde_json::from_value(value)?;
        Ok(Self {
            kind: raw.kind.unwrap_or_default(),
            content: raw.content.unwrap_or_default(),
        })
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FrameError::NotUtf8)?;
        Self::decode(text)
    }
}
