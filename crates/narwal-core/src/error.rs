// ── Core error types ──
//
// Session-level errors from narwal-core. Consumers never see socket or
// codec internals directly; the `From<narwal_api::Error>` impl translates
// transport failures into these variants.

use narwal_api::{DecodeError, EncodeError};
use thiserror::Error;

use crate::session::SessionState;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    #[error("Device connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("{what} timed out after {timeout_secs}s")]
    Timeout { what: String, timeout_secs: u64 },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Device is not ready for commands (session is {state})")]
    NotReady { state: SessionState },

    #[error("Command cancelled before the device confirmed it")]
    Cancelled,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Undecodable payload: {0}")]
    Decode(#[from] DecodeError),

    #[error("Cannot encode command: {0}")]
    Encode(#[from] EncodeError),

    #[error("Map image encoding failed: {message}")]
    Render { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for failures the session retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::ConnectionLost { .. } | Self::Timeout { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<narwal_api::Error> for CoreError {
    fn from(err: narwal_api::Error) -> Self {
        match err {
            narwal_api::Error::WebSocketConnect(reason) => CoreError::ConnectFailed {
                endpoint: String::new(),
                reason,
            },
            narwal_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionLost {
                reason: format!("closed by device (code {code}): {reason}"),
            },
            narwal_api::Error::WebSocketIo(reason) => CoreError::ConnectionLost { reason },
            narwal_api::Error::Timeout { timeout_secs } => CoreError::Timeout {
                what: "Connect".into(),
                timeout_secs,
            },
            narwal_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid device address: {e}"),
            },
            narwal_api::Error::Encode(e) => CoreError::Encode(e),
            narwal_api::Error::Decode(e) => CoreError::Decode(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_session_errors() {
        let err = CoreError::from(narwal_api::Error::WebSocketConnect("refused".into()));
        assert!(matches!(err, CoreError::ConnectFailed { .. }));
        assert!(err.is_transient());

        let err = CoreError::from(narwal_api::Error::WebSocketClosed {
            code: 1000,
            reason: "bye".into(),
        });
        assert_eq!(
            err.to_string(),
            "Device connection lost: closed by device (code 1000): bye"
        );
    }

    #[test]
    fn not_ready_names_the_state() {
        let err = CoreError::NotReady {
            state: SessionState::AwaitingWake,
        };
        assert_eq!(
            err.to_string(),
            "Device is not ready for commands (session is awaiting_wake)"
        );
        assert!(!err.is_transient());
    }
}
