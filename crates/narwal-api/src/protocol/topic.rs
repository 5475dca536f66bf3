// ── Topic catalogue and device addressing ──
//
// Every frame is addressed as `/{product_key}/{device_id}/{short_topic}`.
// The product key identifies the model line; the device id is the robot's
// serial-like identifier. Both are learned from the device when possible.

use serde::{Deserialize, Serialize};

/// Product key used until the device reports its own.
pub const DEFAULT_PRODUCT_KEY: &str = "QoEsI5qYXO";

// ── Broadcast topics ─────────────────────────────────────────────────

pub const ROBOT_BASE_STATUS: &str = "status/robot_base_status";
pub const WORKING_STATUS: &str = "status/working_status";
pub const UPGRADE_STATUS: &str = "upgrade/upgrade_status";
pub const DOWNLOAD_STATUS: &str = "status/download_status";
pub const DISPLAY_MAP: &str = "map/display_map";
pub const TIME_LINE_STATUS: &str = "status/time_line_status";
pub const PLANNING_DEBUG_INFO: &str = "developer/planning_debug_info";

/// Topics requested in the wake-time subscription, in request order.
pub const SUBSCRIBED_TOPICS: [&str; 6] = [
    ROBOT_BASE_STATUS,
    WORKING_STATUS,
    UPGRADE_STATUS,
    DOWNLOAD_STATUS,
    DISPLAY_MAP,
    TIME_LINE_STATUS,
];

// ── Command topics ───────────────────────────────────────────────────

pub const YELL: &str = "common/yell";
pub const REBOOT: &str = "common/reboot";
pub const SHUTDOWN: &str = "common/shutdown";
pub const GET_DEVICE_INFO: &str = "common/get_device_info";
pub const GET_FEATURE_LIST: &str = "common/get_feature_list";
pub const ACTIVE_ROBOT_PUBLISH: &str = "common/active_robot_publish";
pub const NOTIFY_APP_EVENT: &str = "common/notify_app_event";
pub const GET_DEVICE_BASE_STATUS: &str = "status/get_device_base_status";
pub const APP_STATUS_HEARTBEAT: &str = "status/app_status_heartbeat";
pub const PING: &str = "developer/ping";

pub const TASK_PAUSE: &str = "task/pause";
pub const TASK_RESUME: &str = "task/resume";
pub const TASK_FORCE_END: &str = "task/force_end";
pub const TASK_CANCEL: &str = "task/cancel";

pub const SUPPLY_RECALL: &str = "supply/recall";
pub const SUPPLY_WASH_MOP: &str = "supply/wash_mop";
pub const SUPPLY_DRY_MOP: &str = "supply/dry_mop";
pub const SUPPLY_DUST_GATHERING: &str = "supply/dust_gathering";

pub const CLEAN_PLAN_START: &str = "clean/plan/start";
pub const CLEAN_EASY_START: &str = "clean/easy_clean/start";
pub const CLEAN_SET_FAN_LEVEL: &str = "clean/set_fan_level";
pub const CLEAN_SET_MOP_HUMIDITY: &str = "clean/set_mop_humidity";
pub const CLEAN_CURRENT_TASK: &str = "clean/current_clean_task/get";

pub const MAP_GET: &str = "map/get_map";
pub const MAP_GET_ALL_REDUCED: &str = "map/get_all_reduced_maps";

pub const CAMERA_TAKE_PICTURE: &str = "camera/take_picture";

// ── Addressing ───────────────────────────────────────────────────────

/// The `/{product_key}/{device_id}` part of every topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub product_key: String,
    pub device_id: String,
}

impl DeviceIdentity {
    pub fn new(product_key: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            product_key: product_key.into(),
            device_id: device_id.into(),
        }
    }

    /// Identity with the default product key.
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self::new(DEFAULT_PRODUCT_KEY, device_id)
    }

    /// Full topic for a short topic name.
    pub fn topic(&self, short: &str) -> String {
        format!("/{}/{}/{}", self.product_key, self.device_id, short)
    }

    /// Whether the device id is still unknown.
    pub fn is_incomplete(&self) -> bool {
        self.device_id.is_empty() || self.product_key.is_empty()
    }

    /// Recover the identity from a full topic, if it has one.
    pub fn from_topic(topic: &str) -> Option<Self> {
        let mut parts = topic.splitn(4, '/');
        let (Some(""), Some(product_key), Some(device_id), Some(rest)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        if product_key.is_empty() || device_id.is_empty() || rest.is_empty() {
            return None;
        }
        Some(Self::new(product_key, device_id))
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::for_device("")
    }
}

/// Strip the `/{product_key}/{device_id}/` prefix from a full topic.
///
/// Topics with fewer than four `/`-separated parts are returned unchanged.
pub fn short_topic(topic: &str) -> &str {
    topic.splitn(4, '/').nth(3).unwrap_or(topic)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn full_topic_layout() {
        let id = DeviceIdentity::for_device("dev42");
        assert_eq!(id.topic(YELL), "/QoEsI5qYXO/dev42/common/yell");
    }

    #[test]
    fn short_topic_strips_prefix() {
        assert_eq!(
            short_topic("/QoEsI5qYXO/dev42/status/working_status"),
            "status/working_status"
        );
        assert_eq!(short_topic("/pk/dev/map/display_map"), "map/display_map");
    }

    #[test]
    fn short_topic_keeps_unprefixed_topics() {
        assert_eq!(short_topic("status/working_status"), "status/working_status");
        assert_eq!(short_topic("plain"), "plain");
    }

    #[test]
    fn identity_from_topic() {
        let id = DeviceIdentity::from_topic("/AbCdEf/serial-1/status/robot_base_status").unwrap();
        assert_eq!(id, DeviceIdentity::new("AbCdEf", "serial-1"));
    }

    #[test]
    fn identity_from_topic_rejects_partial_topics() {
        assert!(DeviceIdentity::from_topic("status/working_status").is_none());
        assert!(DeviceIdentity::from_topic("/pk//status/x").is_none());
        assert!(DeviceIdentity::from_topic("/pk/dev").is_none());
    }

    #[test]
    fn default_identity_is_incomplete() {
        assert!(DeviceIdentity::default().is_incomplete());
        assert!(!DeviceIdentity::for_device("x").is_incomplete());
    }
}
