//! # roomcast-core
//!
//! Domain types shared by the roomcast crates:
//!
//! - [`Message`]: the chat event relayed to every member of a room
//! - [`InboundFrame`]: the subset of a client payload the server honours
//! - [`Identity`]: the `(username, room)` pair a connection is bound to
//! - [`ConnectionId`]: opaque, time-ordered connection handle

#![deny(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod ids;
pub mod message;

pub use errors::FrameError;
pub use identity::{DEFAULT_ROOM, DEFAULT_USERNAME, Identity};
pub use ids::ConnectionId;
pub use message::{InboundFrame, Message, MessageKind};
