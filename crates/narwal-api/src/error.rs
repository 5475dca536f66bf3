use thiserror::Error;

/// Top-level error type for the `narwal-api` crate.
///
/// Covers the socket transport and the frame encoder. Decode failures have
/// their own [`DecodeError`] because they never tear a connection down;
/// `narwal-core` maps both into its session-level taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// The WebSocket upgrade or TCP connect failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The device sent a close frame.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Read or write failed on an open socket.
    #[error("WebSocket I/O error: {0}")]
    WebSocketIo(String),

    /// Connect did not complete in time.
    #[error("Connect timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Codec ───────────────────────────────────────────────────────
    /// A frame could not be built from the given topic.
    #[error("Cannot encode frame: {0}")]
    Encode(#[from] EncodeError),

    /// A received frame could not be parsed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl Error {
    /// Returns `true` if reconnecting may resolve this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_)
                | Self::WebSocketClosed { .. }
                | Self::WebSocketIo(_)
                | Self::Timeout { .. }
        )
    }
}

/// A frame or payload that could not be decoded.
///
/// Only two things are errors: a length that points past the end of the
/// buffer, and bytes that cannot be a frame at all. Unknown topics and
/// unknown field numbers are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("malformed: {reason}")]
    Malformed { reason: String },
}

impl DecodeError {
    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// A frame that cannot be represented on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("topic is {len} bytes, the frame header allows at most {max}")]
    TopicTooLong { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
        assert!(!Error::Encode(EncodeError::EmptyTopic).is_transient());
        assert!(!Error::Decode(DecodeError::malformed("bad tag")).is_transient());
    }

    #[test]
    fn decode_error_messages() {
        assert_eq!(
            DecodeError::truncated(12, 4).to_string(),
            "truncated: needed 12 bytes, 4 available"
        );
        assert_eq!(
            DecodeError::malformed("bad frame type 0x02").to_string(),
            "malformed: bad frame type 0x02"
        );
    }
}
