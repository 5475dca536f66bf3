// ── Outbound commands ──
//
// Every command the device accepts, its short topic, and its payload
// template. Encoding is a pure function of the command and the device
// identity, so the same command always produces the same bytes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::EncodeError;
use crate::protocol::topic::{self, DeviceIdentity};
use crate::protocol::wire::MessageWriter;
use crate::protocol::{Frame, FrameKind};

/// Seconds the device keeps publishing after a wake subscription.
pub const SUBSCRIPTION_SECS: u32 = 600;

// ── Setting levels ───────────────────────────────────────────────────

/// Suction level. The device accepts it but never reports it back.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FanSpeed {
    Quiet,
    Normal,
    Strong,
    Max,
}

impl FanSpeed {
    pub fn level(self) -> u8 {
        match self {
            Self::Quiet => 0,
            Self::Normal => 1,
            Self::Strong => 2,
            Self::Max => 3,
        }
    }
}

/// Mop water flow. Like [`FanSpeed`], write-only on the device side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MopHumidity {
    Dry,
    Normal,
    Wet,
}

impl MopHumidity {
    pub fn level(self) -> u8 {
        match self {
            Self::Dry => 0,
            Self::Normal => 1,
            Self::Wet => 2,
        }
    }
}

// ── Command ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Cleaning
    Start,
    EasyClean,
    Stop,
    Cancel,
    Pause,
    Resume,
    ReturnToDock,
    Locate,
    SetFanSpeed(FanSpeed),
    SetMopHumidity(MopHumidity),

    // Station
    WashMop,
    DryMop,
    EmptyDustbin,

    // Map & camera
    GetMap,
    GetAllMaps,
    TakePicture,

    // Queries
    GetDeviceInfo,
    GetFeatureList,
    GetBaseStatus,
    GetCurrentTask,

    // System
    Reboot,
    Shutdown,

    // Session upkeep
    NotifyAppEvent,
    SubscribeTopics { duration_secs: u32 },
    KeepActive { duration_secs: u32 },
    AppHeartbeat,
    Ping,
}

impl Command {
    /// The short topic this command is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Start => topic::CLEAN_PLAN_START,
            Self::EasyClean => topic::CLEAN_EASY_START,
            Self::Stop => topic::TASK_FORCE_END,
            Self::Cancel => topic::TASK_CANCEL,
            Self::Pause => topic::TASK_PAUSE,
            Self::Resume => topic::TASK_RESUME,
            Self::ReturnToDock => topic::SUPPLY_RECALL,
            Self::Locate => topic::YELL,
            Self::SetFanSpeed(_) => topic::CLEAN_SET_FAN_LEVEL,
            Self::SetMopHumidity(_) => topic::CLEAN_SET_MOP_HUMIDITY,
            Self::WashMop => topic::SUPPLY_WASH_MOP,
            Self::DryMop => topic::SUPPLY_DRY_MOP,
            Self::EmptyDustbin => topic::SUPPLY_DUST_GATHERING,
            Self::GetMap => topic::MAP_GET,
            Self::GetAllMaps => topic::MAP_GET_ALL_REDUCED,
            Self::TakePicture => topic::CAMERA_TAKE_PICTURE,
            Self::GetDeviceInfo => topic::GET_DEVICE_INFO,
            Self::GetFeatureList => topic::GET_FEATURE_LIST,
            Self::GetBaseStatus => topic::GET_DEVICE_BASE_STATUS,
            Self::GetCurrentTask => topic::CLEAN_CURRENT_TASK,
            Self::Reboot => topic::REBOOT,
            Self::Shutdown => topic::SHUTDOWN,
            Self::NotifyAppEvent => topic::NOTIFY_APP_EVENT,
            Self::SubscribeTopics { .. } | Self::KeepActive { .. } => topic::ACTIVE_ROBOT_PUBLISH,
            Self::AppHeartbeat => topic::APP_STATUS_HEARTBEAT,
            Self::Ping => topic::PING,
        }
    }

    /// The protobuf payload for this command.
    pub fn payload(&self) -> Bytes {
        match self {
            Self::SetFanSpeed(speed) => level_payload(speed.level()),
            Self::SetMopHumidity(humidity) => level_payload(humidity.level()),
            Self::NotifyAppEvent | Self::AppHeartbeat => MessageWriter::new().varint(1, 1).finish(),
            Self::KeepActive { duration_secs } => MessageWriter::new()
                .varint(1, u64::from(*duration_secs))
                .finish(),
            Self::SubscribeTopics { duration_secs } => topic::SUBSCRIBED_TOPICS
                .iter()
                .fold(MessageWriter::new(), |msg, name| {
                    msg.message(
                        1,
                        MessageWriter::new()
                            .string(1, name)
                            .varint(2, u64::from(*duration_secs)),
                    )
                })
                .finish(),
            _ => Bytes::new(),
        }
    }

    /// Bind this command to a device.
    pub fn frame(&self, identity: &DeviceIdentity) -> CommandFrame {
        CommandFrame {
            topic: identity.topic(self.topic()),
            payload: self.payload(),
            correlation_id: None,
        }
    }

    /// Commands sent right after connecting to bring a sleeping robot
    /// into publishing mode, in send order.
    pub fn wake_sequence() -> [Command; 7] {
        [
            Self::NotifyAppEvent,
            Self::SubscribeTopics {
                duration_secs: SUBSCRIPTION_SECS,
            },
            Self::KeepActive {
                duration_secs: SUBSCRIPTION_SECS,
            },
            Self::AppHeartbeat,
            Self::GetBaseStatus,
            Self::GetDeviceInfo,
            Self::Ping,
        ]
    }

    /// Whether this command only keeps the session alive.
    pub fn is_upkeep(&self) -> bool {
        matches!(
            self,
            Self::NotifyAppEvent
                | Self::SubscribeTopics { .. }
                | Self::KeepActive { .. }
                | Self::AppHeartbeat
                | Self::Ping
        )
    }
}

/// Encode `command` for `identity` into wire bytes.
pub fn encode(command: &Command, identity: &DeviceIdentity) -> Result<Bytes, EncodeError> {
    command.frame(identity).encode()
}

fn level_payload(level: u8) -> Bytes {
    MessageWriter::new()
        .varint(1, u64::from(level & 0x7f))
        .finish()
}

// ── CommandFrame ─────────────────────────────────────────────────────

/// A command bound to a device topic, ready for the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub topic: String,
    pub payload: Bytes,
    /// Local bookkeeping id; the protocol has no correlation field, so
    /// this never reaches the wire.
    pub correlation_id: Option<u64>,
}

impl CommandFrame {
    pub fn with_correlation_id(mut self, id: u64) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn short_topic(&self) -> &str {
        topic::short_topic(&self.topic)
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        Frame::new(FrameKind::Publish, self.topic.clone(), self.payload.clone()).encode()
    }
}
