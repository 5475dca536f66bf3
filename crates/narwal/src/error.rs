//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use narwal_config::ConfigError;
use narwal_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const NOT_READY: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to robot at {endpoint}: {reason}")]
    #[diagnostic(
        code(narwal::connection_failed),
        help(
            "Check that the robot is powered and on the same network.\n\
             Endpoint: {endpoint}"
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("{what} timed out after {seconds}s")]
    #[diagnostic(
        code(narwal::timeout),
        help(
            "The robot did not answer. Sleeping robots can take a while to wake;\n\
             try a longer --wait."
        )
    )]
    Timeout { what: String, seconds: u64 },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(narwal::not_ready))]
    NotReady { message: String },

    #[error("Command was cancelled before the robot confirmed it")]
    #[diagnostic(code(narwal::cancelled))]
    Cancelled,

    #[error("Robot rejected '{command}': {result}")]
    #[diagnostic(code(narwal::rejected))]
    Rejected { command: String, result: String },

    #[error("No map received from the robot")]
    #[diagnostic(
        code(narwal::no_map),
        help("The robot only sends a map once it has mapped the floor. Try again after a clean.")
    )]
    NoMap,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(narwal::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(narwal::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: narwal config add <name> <address>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No robot configured")]
    #[diagnostic(
        code(narwal::no_config),
        help(
            "Pass --host, or create a profile with: narwal config add <name> <address>\n\
             Config file: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(narwal::config))]
    Config(ConfigError),

    // ── Device ───────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(narwal::device))]
    Core(CoreError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config serialization failed: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotReady { .. } | Self::Cancelled => exit_code::NOT_READY,
            Self::ProfileNotFound { .. } | Self::NoMap => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectFailed { endpoint, reason } => {
                Self::ConnectionFailed { endpoint, reason }
            }
            CoreError::Timeout { what, timeout_secs } => Self::Timeout {
                what,
                seconds: timeout_secs,
            },
            err @ CoreError::NotReady { .. } => Self::NotReady {
                message: err.to_string(),
            },
            CoreError::Cancelled => Self::Cancelled,
            CoreError::Io(e) => Self::Io(e),
            other => Self::Core(other),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { name } => Self::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narwal_core::SessionState;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let err = CliError::from(CoreError::Timeout {
            what: "Waiting for awake".into(),
            timeout_secs: 3,
        });
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);

        let err = CliError::from(CoreError::NotReady {
            state: SessionState::Reconnecting,
        });
        assert_eq!(err.exit_code(), exit_code::NOT_READY);
        assert!(err.to_string().contains("reconnecting"));

        let err = CliError::from(ConfigError::Validation {
            field: "host".into(),
            reason: "empty".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
