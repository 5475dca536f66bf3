//! Shared configuration for Narwal tools.
//!
//! TOML profiles (one per robot), environment overrides, and translation
//! to `narwal_core::SessionConfig`. The CLI layers its own flag overrides
//! on top of what this crate resolves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use narwal_core::{DeviceIdentity, PendingPolicy, ReconnectConfig, SessionConfig, Theme};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no profile selected and no default profile configured")]
    NoProfile,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults, overridable per profile.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named robot profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile by name, falling back to `default_profile`, then to
    /// the only configured profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        if let Some(name) = name {
            return self
                .profiles
                .get_key_value(name)
                .map(|(k, p)| (k.as_str(), p))
                .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() });
        }

        if let Some(default) = self.default_profile.as_deref() {
            if let Some((k, p)) = self.profiles.get_key_value(default) {
                return Ok((k.as_str(), p));
            }
        }

        let mut only = self.profiles.iter();
        match (only.next(), only.next()) {
            (Some((k, p)), None) => Ok((k.as_str(), p)),
            _ => Err(ConfigError::NoProfile),
        }
    }

    /// Resolve a profile straight into a `SessionConfig`.
    pub fn session_config(&self, name: Option<&str>) -> Result<SessionConfig, ConfigError> {
        let (_, profile) = self.profile(name)?;
        profile_to_session_config(profile, &self.defaults)
    }
}

/// Timing and output defaults. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub connect_timeout: u64,
    pub wake_timeout: u64,
    pub wake_retry_interval: u64,
    pub keepalive_interval: u64,
    pub poll_interval: u64,
    pub probe_timeout: u64,
    pub command_timeout: u64,
    pub map_command_timeout: u64,

    pub backoff_initial: u64,
    pub backoff_max: u64,
    pub backoff_reset_after: u64,

    /// `queue_latest` or `fail_fast`.
    pub pending_policy: String,
    pub event_capacity: usize,
    pub map_scale: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            connect_timeout: 10,
            wake_timeout: 20,
            wake_retry_interval: 5,
            keepalive_interval: 15,
            poll_interval: 60,
            probe_timeout: 10,
            command_timeout: 5,
            map_command_timeout: 15,
            backoff_initial: 1,
            backoff_max: 300,
            backoff_reset_after: 120,
            pending_policy: "queue_latest".into(),
            event_capacity: 256,
            map_scale: 1,
        }
    }
}

/// One robot on the local network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// IP address or hostname.
    pub host: String,

    /// WebSocket port. Every known firmware listens on 9002.
    pub port: Option<u16>,

    /// Device id for topic addressing. Learned from the robot when absent.
    pub device_id: Option<String>,

    /// Model-line product key. Defaults to the one shared by current models.
    pub product_key: Option<String>,

    pub connect_timeout: Option<u64>,
    pub wake_timeout: Option<u64>,
    pub keepalive_interval: Option<u64>,
    pub poll_interval: Option<u64>,
    pub command_timeout: Option<u64>,
    pub pending_policy: Option<String>,
    pub map_scale: Option<u32>,
}

impl Profile {
    /// A bare profile for an ad-hoc host.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "narwal", "narwal").map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".config").join("narwal")
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment.
///
/// Environment keys use `NARWAL_` and a double underscore for nesting,
/// e.g. `NARWAL_DEFAULTS__POLL_INTERVAL=30`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NARWAL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

pub fn parse_pending_policy(value: &str) -> Result<PendingPolicy, ConfigError> {
    match value {
        "queue_latest" => Ok(PendingPolicy::QueueLatest),
        "fail_fast" => Ok(PendingPolicy::FailFast),
        other => Err(ConfigError::Validation {
            field: "pending_policy".into(),
            reason: format!("expected 'queue_latest' or 'fail_fast', got '{other}'"),
        }),
    }
}

fn seconds(field: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be at least 1 second".into(),
        });
    }
    Ok(Duration::from_secs(value))
}

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() || host.contains(char::is_whitespace) || host.contains('/') {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("expected an IP address or hostname, got '{}'", profile.host),
        });
    }

    let port = profile.port.unwrap_or(narwal_core::DEFAULT_PORT);
    if port == 0 {
        return Err(ConfigError::Validation {
            field: "port".into(),
            reason: "must be non-zero".into(),
        });
    }

    let product_key = profile
        .product_key
        .clone()
        .unwrap_or_else(|| DeviceIdentity::default().product_key);
    if product_key.is_empty() || product_key.contains('/') {
        return Err(ConfigError::Validation {
            field: "product_key".into(),
            reason: format!("'{product_key}' cannot appear in a topic"),
        });
    }
    let device_id = profile.device_id.clone().unwrap_or_default();
    if device_id.contains('/') {
        return Err(ConfigError::Validation {
            field: "device_id".into(),
            reason: format!("'{device_id}' cannot appear in a topic"),
        });
    }

    let scale = profile.map_scale.unwrap_or(defaults.map_scale);
    if !(1..=16).contains(&scale) {
        return Err(ConfigError::Validation {
            field: "map_scale".into(),
            reason: format!("expected 1..=16, got {scale}"),
        });
    }

    let reconnect = ReconnectConfig {
        initial_delay: seconds("backoff_initial", defaults.backoff_initial)?,
        max_delay: seconds("backoff_max", defaults.backoff_max)?,
        reset_after: seconds("backoff_reset_after", defaults.backoff_reset_after)?,
    };
    if reconnect.initial_delay > reconnect.max_delay {
        return Err(ConfigError::Validation {
            field: "backoff_initial".into(),
            reason: "must not exceed backoff_max".into(),
        });
    }

    let pending_policy = parse_pending_policy(
        profile
            .pending_policy
            .as_deref()
            .unwrap_or(&defaults.pending_policy),
    )?;

    Ok(SessionConfig {
        host: host.to_owned(),
        port,
        identity: DeviceIdentity::new(product_key, device_id),
        connect_timeout: seconds(
            "connect_timeout",
            profile.connect_timeout.unwrap_or(defaults.connect_timeout),
        )?,
        wake_timeout: seconds(
            "wake_timeout",
            profile.wake_timeout.unwrap_or(defaults.wake_timeout),
        )?,
        wake_retry_interval: seconds("wake_retry_interval", defaults.wake_retry_interval)?,
        keepalive_interval: seconds(
            "keepalive_interval",
            profile
                .keepalive_interval
                .unwrap_or(defaults.keepalive_interval),
        )?,
        poll_interval: seconds(
            "poll_interval",
            profile.poll_interval.unwrap_or(defaults.poll_interval),
        )?,
        probe_timeout: seconds("probe_timeout", defaults.probe_timeout)?,
        command_timeout: seconds(
            "command_timeout",
            profile.command_timeout.unwrap_or(defaults.command_timeout),
        )?,
        map_command_timeout: seconds("map_command_timeout", defaults.map_command_timeout)?,
        reconnect,
        pending_policy,
        event_capacity: defaults.event_capacity.max(1),
        theme: Theme {
            scale,
            ..Theme::default()
        },
        ..SessionConfig::default()
    })
}
