//! Errors raised while decoding client frames.

use thiserror::Error;

/// A client frame that could not be turned into an [`InboundFrame`](crate::InboundFrame).
///
/// Always recoverable: the frame is dropped and the connection keeps reading.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload was not valid JSON, not an object, or had an unknown `type`.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Binary payload that is not UTF-8.
    #[error("frame is not valid UTF-8")]
    NotUtf8,
}

impl FrameError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::NotUtf8 => "not_utf8",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display_includes_cause() {
        let err: FrameError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("malformed frame:"));
        assert_eq!(err.error_kind(), "malformed");
    }

    #[test]
    fn not_utf8_kind() {
        assert_eq!(FrameError::NotUtf8.error_kind(), "not_utf8");
    }
}
