//! The identity a connection is bound to for its whole lifetime.

use serde::{Deserialize, Serialize};

/// Username used when the client does not supply one.
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// Room used when the client does not supply one.
pub const DEFAULT_ROOM: &str = "general";

/// Username and room resolved at connect time.
///
/// Every message relayed on behalf of a connection carries these values,
/// whatever the client put in its payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Display name of the sender.
    pub username: String,
    /// Room the connection broadcasts to and receives from.
    pub room: String,
}

impl Identity {
    /// Build an identity from explicit values.
    pub fn new(username: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            room: room.into(),
        }
    }

    /// Apply defaults for missing or empty query parameters.
    pub fn resolve(username: Option<String>, room: Option<String>) -> Self {
        let username = username
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_owned());
        let room = room
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ROOM.to_owned());
        Self { username, room }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::resolve(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_keeps_supplied_values() {
        let id = Identity::resolve(Some("alice".into()), Some("random".into()));
        assert_eq!(id, Identity::new("alice", "random"));
    }

    #[test]
    fn resolve_defaults_missing_values() {
        let id = Identity::resolve(None, None);
        assert_eq!(id.username, DEFAULT_USERNAME);
        assert_eq!(id.room, DEFAULT_ROOM);
    }

    #[test]
    fn resolve_treats_empty_as_missing() {
        let id = Identity::resolve(Some(String::new()), Some(String::new()));
        assert_eq!(id, Identity::default());
    }

    #[test]
    fn resolve_defaults_each_field_independently() {
        let id = Identity::resolve(Some("bob".into()), None);
        assert_eq!(id.username, "bob");
        assert_eq!(id.room, "general");

        let id = Identity::resolve(None, Some("ops".into()));
        assert_eq!(id.username, "Anonymous");
        assert_eq!(id.room, "ops");
    }
}
