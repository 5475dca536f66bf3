// ── Runtime session configuration ──
//
// These types describe how to reach one robot and how patiently to treat
// it. The CLI (via narwal-config) builds a `SessionConfig` and hands it in;
// core never touches disk.

use std::time::Duration;

use narwal_api::DeviceIdentity;
use narwal_api::protocol::DEFAULT_PORT;

use crate::map::Theme;

/// What to do with a user command issued while the device is not awake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPolicy {
    /// Hold the most recent command and send it once awake. A newer
    /// command replaces (and cancels) the held one.
    #[default]
    QueueLatest,
    /// Reject immediately with `NotReady`.
    FailFast,
}

/// Exponential backoff between connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on any delay. Default: 300s.
    pub max_delay: Duration,

    /// How long a connection must stay awake before the backoff drops
    /// back to `initial_delay`. Default: 120s.
    pub reset_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            reset_after: Duration::from_secs(120),
        }
    }
}

/// Configuration for one device session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device IP address or hostname.
    pub host: String,
    /// WebSocket port (9002 on every known firmware).
    pub port: u16,
    /// Initial topic addressing; replaced by what the device reports.
    pub identity: DeviceIdentity,

    /// TCP + WebSocket handshake limit.
    pub connect_timeout: Duration,
    /// Time after connecting before the wake sequence is first re-sent.
    pub wake_timeout: Duration,
    /// Re-send period once the wake timeout has passed.
    pub wake_retry_interval: Duration,
    /// Pause after each wake-sequence frame.
    pub wake_frame_spacing: Duration,
    /// Heartbeat period while awake. Any outbound frame resets it.
    pub keepalive_interval: Duration,
    /// Broadcast silence after which a status query is sent.
    pub poll_interval: Duration,
    /// How long the status query may go unanswered before reconnecting.
    pub probe_timeout: Duration,
    /// How long to wait for a command reply before reporting it unconfirmed.
    pub command_timeout: Duration,
    /// Same, for map requests (larger replies).
    pub map_command_timeout: Duration,

    pub reconnect: ReconnectConfig,
    pub pending_policy: PendingPolicy,

    /// Events buffered per subscriber before the oldest are dropped.
    pub event_capacity: usize,

    /// Colours and scale for rendered maps.
    pub theme: Theme,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            identity: DeviceIdentity::default(),
            connect_timeout: Duration::from_secs(10),
            wake_timeout: Duration::from_secs(20),
            wake_retry_interval: Duration::from_secs(5),
            wake_frame_spacing: Duration::from_millis(200),
            keepalive_interval: Duration::from_secs(15),
            poll_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            map_command_timeout: Duration::from_secs(15),
            reconnect: ReconnectConfig::default(),
            pending_policy: PendingPolicy::default(),
            event_capacity: 256,
            theme: Theme::default(),
        }
    }
}

impl SessionConfig {
    /// Defaults for a device at `host` with a known device id.
    pub fn new(host: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            identity: DeviceIdentity::for_device(device_id),
            ..Self::default()
        }
    }

    /// `ws://host:port` for logs and the WebSocket transport.
    pub fn endpoint(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_timings() {
        let config = SessionConfig::new("10.0.0.7", "robot-1");
        assert_eq!(config.port, 9002);
        assert_eq!(config.keepalive_interval, Duration::from_secs(15));
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.wake_timeout, Duration::from_secs(20));
        assert_eq!(config.identity.device_id, "robot-1");
        assert_eq!(config.endpoint(), "ws://10.0.0.7:9002");
        assert_eq!(config.pending_policy, PendingPolicy::QueueLatest);
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(300));
        assert_eq!(config.reset_after, Duration::from_secs(120));
    }
}
