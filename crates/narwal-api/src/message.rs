// ── Inbound messages ──
//
// Classifies decoded frames by topic. Status broadcasts are parsed into
// partial updates (absent fields stay `None`); map payloads are handed on
// undecoded; anything unrecognised comes back as `Message::Unknown` so
// firmware that grows new topics never breaks the session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::protocol::topic::{self, DeviceIdentity};
use crate::protocol::wire::{Fields, Value};
use crate::protocol::{Frame, FrameKind};

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Reply to a command we sent.
    CommandAck(CommandAck),
    /// A status broadcast, reduced to the fields it carried.
    Status(StatusUpdate),
    /// A `map/display_map` broadcast.
    Map(MapBroadcast),
    /// A well-formed frame on a topic we do not interpret.
    Unknown { topic: String, payload: Bytes },
}

impl Message {
    /// Classify a frame by kind and topic.
    pub fn from_frame(frame: &Frame) -> Result<Self, DecodeError> {
        let short = frame.short_topic();

        if frame.kind == FrameKind::Response {
            return CommandAck::parse(short, frame.payload.clone()).map(Self::CommandAck);
        }

        let parse = || Fields::parse(&frame.payload);
        let update = match short {
            topic::ROBOT_BASE_STATUS => StatusUpdate::from_base_status(&parse()?),
            topic::WORKING_STATUS => StatusUpdate::from_working_status(&parse()?),
            topic::UPGRADE_STATUS => StatusUpdate::from_upgrade_status(&parse()?),
            topic::DOWNLOAD_STATUS => StatusUpdate::from_download_status(&parse()?),
            topic::DISPLAY_MAP => {
                return Ok(Self::Map(MapBroadcast {
                    payload: frame.payload.clone(),
                }));
            }
            other => {
                return Ok(Self::Unknown {
                    topic: other.to_owned(),
                    payload: frame.payload.clone(),
                });
            }
        };

        Ok(Self::Status(update))
    }

    /// A short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandAck(_) => "ack",
            Self::Status(_) => "status",
            Self::Map(_) => "map",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Decode one WebSocket binary message.
pub fn decode(data: &Bytes) -> Result<Message, DecodeError> {
    let frame = Frame::decode(data)?;
    Message::from_frame(&frame)
}

// ── Working state ────────────────────────────────────────────────────

/// Raw working state reported in `robot_base_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingState {
    #[default]
    Unknown,
    Standby,
    Cleaning,
    /// Second cleaning code seen on some firmwares.
    CleaningAlt,
    /// On the dock and charging.
    Docked,
    /// On the dock, battery full.
    Charged,
    Error,
    Other(u32),
}

impl WorkingState {
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Standby,
            4 => Self::Cleaning,
            5 => Self::CleaningAlt,
            10 => Self::Docked,
            14 => Self::Charged,
            99 => Self::Error,
            other => Self::Other(u32::try_from(other).unwrap_or(u32::MAX)),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Standby => 1,
            Self::Cleaning => 4,
            Self::CleaningAlt => 5,
            Self::Docked => 10,
            Self::Charged => 14,
            Self::Error => 99,
            Self::Other(code) => code,
        }
    }

    pub fn is_cleaning(self) -> bool {
        matches!(self, Self::Cleaning | Self::CleaningAlt)
    }

    pub fn is_on_dock(self) -> bool {
        matches!(self, Self::Docked | Self::Charged)
    }
}

// ── Status updates ───────────────────────────────────────────────────

/// Fields carried by one status broadcast. `None` means "not in this
/// message", never "unknown".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub working_state: Option<WorkingState>,
    pub paused: Option<bool>,
    pub returning: Option<bool>,
    pub dock_sub_state: Option<u32>,
    pub battery_percent: Option<u8>,
    pub session_id: Option<String>,
    pub device_timestamp: Option<u64>,
    pub cleaning_seconds: Option<u64>,
    pub cleaning_area_cm2: Option<u64>,
    pub firmware_version: Option<String>,
    pub firmware_target: Option<String>,
    pub upgrade_status: Option<u32>,
    pub download_status: Option<u32>,
}

impl StatusUpdate {
    /// `robot_base_status`: field 3 holds the working-state block, field 2
    /// the battery as a float (field 38 on older firmware).
    pub fn from_base_status(fields: &Fields<'_>) -> Self {
        let mut update = Self::default();

        // Protobuf omits zero values, so a present block with a missing
        // flag means the flag is off.
        if let Some(state) = fields.message(3) {
            update.working_state = Some(WorkingState::from_code(state.u64(1).unwrap_or(0)));
            update.paused = Some(state.bool(2).unwrap_or(false));
            update.returning = Some(state.bool(7).unwrap_or(false));
            update.dock_sub_state = Some(state.u32(10).unwrap_or(0));
        }

        update.battery_percent = fields
            .f32(2)
            .or_else(|| fields.f32(38))
            .and_then(battery_percent);
        update.session_id = fields.str(13).map(str::to_owned);
        update.device_timestamp = fields.u64(36);
        update
    }

    /// `working_status`: elapsed seconds in field 3, area in cm² in field 13.
    pub fn from_working_status(fields: &Fields<'_>) -> Self {
        Self {
            cleaning_seconds: fields.u64(3),
            cleaning_area_cm2: fields.u64(13),
            ..Self::default()
        }
    }

    pub fn from_upgrade_status(fields: &Fields<'_>) -> Self {
        Self {
            upgrade_status: fields.u32(4),
            firmware_version: fields.str(7).map(str::to_owned),
            firmware_target: fields.str(8).map(str::to_owned),
            ..Self::default()
        }
    }

    pub fn from_download_status(fields: &Fields<'_>) -> Self {
        Self {
            download_status: fields.u32(1),
            ..Self::default()
        }
    }

    /// Whether the broadcast carried nothing we understand.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
fn battery_percent(raw: f32) -> Option<u8> {
    raw.is_finite().then(|| raw.round().clamp(0.0, 100.0) as u8)
}

// ── Command acknowledgements ─────────────────────────────────────────

/// Result code in field 1 of a command reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandResult {
    Success,
    NotApplicable,
    Conflict,
    Other(u64),
    /// The reply carried no result code.
    Missing,
}

impl CommandResult {
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Success,
            2 => Self::NotApplicable,
            3 => Self::Conflict,
            other => Self::Other(other),
        }
    }
}

/// A command reply (`0x2a` frame).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandAck {
    /// Short topic of the command this answers.
    pub topic: String,
    pub result: CommandResult,
    pub payload: Bytes,
}

impl CommandAck {
    pub(crate) fn parse(topic: &str, payload: Bytes) -> Result<Self, DecodeError> {
        let result = match Fields::parse(&payload)?.get(1) {
            Some(Value::Varint(code)) => CommandResult::from_code(code),
            _ => CommandResult::Missing,
        };
        Ok(Self {
            topic: topic.to_owned(),
            result,
            payload,
        })
    }

    pub fn is_success(&self) -> bool {
        self.result == CommandResult::Success
    }

    /// The base status carried by a `get_device_base_status` reply.
    pub fn status_update(&self) -> Option<StatusUpdate> {
        if self.topic != topic::GET_DEVICE_BASE_STATUS {
            return None;
        }
        let fields = Fields::parse(&self.payload).ok()?;
        fields
            .message(2)
            .map(|status| StatusUpdate::from_base_status(&status))
    }

    /// Identity and firmware from a `get_device_info` reply.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        if self.topic != topic::GET_DEVICE_INFO {
            return None;
        }
        let fields = Fields::parse(&self.payload).ok()?;
        let product_key = fields.str(1).filter(|s| !s.is_empty())?;
        let device_id = fields.str(2).filter(|s| !s.is_empty())?;
        Some(DeviceInfo {
            product_key: product_key.to_owned(),
            device_id: device_id.to_owned(),
            firmware_version: fields.str(3).map(str::to_owned),
        })
    }

    /// The map message inside a `get_map` reply, as a zero-copy slice.
    pub fn map_payload(&self) -> Option<Bytes> {
        if self.topic != topic::MAP_GET {
            return None;
        }
        let fields = Fields::parse(&self.payload).ok()?;
        let map = fields.bytes(2).filter(|b| !b.is_empty())?;
        Some(self.payload.slice_ref(map))
    }
}

/// What a `get_device_info` reply tells us about the robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub product_key: String,
    pub device_id: String,
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.product_key.clone(), self.device_id.clone())
    }
}

// ── Map broadcast ────────────────────────────────────────────────────

/// An undecoded map payload; `narwal-core` turns it into a map model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapBroadcast {
    pub payload: Bytes,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::wire::MessageWriter;

    fn publish(short: &str, payload: Bytes) -> Frame {
        Frame::new(
            FrameKind::Publish,
            DeviceIdentity::for_device("dev").topic(short),
            payload,
        )
    }

    #[test]
    fn base_status_with_float_battery() {
        let payload = MessageWriter::new()
            .message(3, MessageWriter::new().varint(1, 10).varint(10, 1))
            .float(2, 79.6)
            .string(13, "sess-1")
            .finish();

        let Message::Status(update) =
            Message::from_frame(&publish(topic::ROBOT_BASE_STATUS, payload)).unwrap()
        else {
            panic!("expected status");
        };
        assert_eq!(update.working_state, Some(WorkingState::Docked));
        assert_eq!(update.paused, Some(false));
        assert_eq!(update.dock_sub_state, Some(1));
        assert_eq!(update.battery_percent, Some(80));
        assert_eq!(update.session_id.as_deref(), Some("sess-1"));
        assert_eq!(update.cleaning_seconds, None);
    }

    #[test]
    fn base_status_battery_fallback_field() {
        let payload = MessageWriter::new().varint(38, 55).finish();
        let update = StatusUpdate::from_base_status(&Fields::parse(&payload).unwrap());
        assert_eq!(update.battery_percent, Some(55));
        assert_eq!(update.working_state, None);
    }

    #[test]
    fn working_status_fields() {
        let payload = MessageWriter::new().varint(3, 1200).varint(13, 254_000).finish();
        let Message::Status(update) =
            Message::from_frame(&publish(topic::WORKING_STATUS, payload)).unwrap()
        else {
            panic!("expected status");
        };
        assert_eq!(update.cleaning_seconds, Some(1200));
        assert_eq!(update.cleaning_area_cm2, Some(254_000));
        assert_eq!(update.battery_percent, None);
    }

    #[test]
    fn upgrade_status_fields() {
        let payload = MessageWriter::new()
            .varint(4, 2)
            .string(7, "v01.02.03")
            .string(8, "v01.03.00")
            .finish();
        let update = StatusUpdate::from_upgrade_status(&Fields::parse(&payload).unwrap());
        assert_eq!(update.firmware_version.as_deref(), Some("v01.02.03"));
        assert_eq!(update.firmware_target.as_deref(), Some("v01.03.00"));
        assert_eq!(update.upgrade_status, Some(2));
    }

    #[test]
    fn display_map_is_passed_through() {
        let payload = Bytes::from_static(&[0x20, 0x05]);
        let msg = Message::from_frame(&publish(topic::DISPLAY_MAP, payload.clone())).unwrap();
        assert_eq!(msg, Message::Map(MapBroadcast { payload }));
    }

    #[test]
    fn unrecognised_topic_is_unknown() {
        let msg = Message::from_frame(&publish(
            topic::TIME_LINE_STATUS,
            Bytes::from_static(&[0x0b]),
        ))
        .unwrap();
        assert!(
            matches!(msg, Message::Unknown { topic: ref t, .. } if t == topic::TIME_LINE_STATUS)
        );
    }

    #[test]
    fn ack_result_codes() {
        let frame = Frame::new(
            FrameKind::Response,
            DeviceIdentity::for_device("dev").topic(topic::TASK_PAUSE),
            MessageWriter::new().varint(1, 3).finish(),
        );
        let Message::CommandAck(ack) = Message::from_frame(&frame).unwrap() else {
            panic!("expected ack");
        };
        assert_eq!(ack.topic, topic::TASK_PAUSE);
        assert_eq!(ack.result, CommandResult::Conflict);
        assert!(!ack.is_success());
    }

    #[test]
    fn base_status_reply_carries_status() {
        let payload = MessageWriter::new()
            .varint(1, 1)
            .message(
                2,
                MessageWriter::new()
                    .message(3, MessageWriter::new().varint(1, 4))
                    .float(2, 42.0),
            )
            .finish();
        let ack = CommandAck::parse(topic::GET_DEVICE_BASE_STATUS, payload).unwrap();
        let update = ack.status_update().unwrap();
        assert_eq!(update.working_state, Some(WorkingState::Cleaning));
        assert_eq!(update.battery_percent, Some(42));
    }

    #[test]
    fn device_info_reply() {
        let payload = MessageWriter::new()
            .string(1, "PkEy123")
            .string(2, "robot-9")
            .string(3, "v2.1.0")
            .finish();
        let ack = CommandAck::parse(topic::GET_DEVICE_INFO, payload).unwrap();
        assert_eq!(ack.result, CommandResult::Missing);
        let info = ack.device_info().unwrap();
        assert_eq!(info.identity(), DeviceIdentity::new("PkEy123", "robot-9"));
        assert_eq!(info.firmware_version.as_deref(), Some("v2.1.0"));
    }

    #[test]
    fn map_reply_payload_is_sliced() {
        let inner = MessageWriter::new().varint(4, 10).varint(5, 20).finish();
        let payload = MessageWriter::new().varint(1, 1).bytes(2, &inner).finish();
        let ack = CommandAck::parse(topic::MAP_GET, payload).unwrap();
        assert_eq!(ack.map_payload().unwrap(), inner);
        assert!(ack.status_update().is_none());
    }

    #[test]
    fn truncated_status_payload_is_an_error() {
        let err = Message::from_frame(&publish(
            topic::ROBOT_BASE_STATUS,
            Bytes::from_static(&[0x1a, 0x05, 0x08]),
        ))
        .unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn working_state_codes() {
        assert_eq!(WorkingState::from_code(5), WorkingState::CleaningAlt);
        assert_eq!(WorkingState::from_code(14), WorkingState::Charged);
        assert_eq!(WorkingState::from_code(7), WorkingState::Other(7));
        assert_eq!(WorkingState::Other(7).code(), 7);
        assert!(WorkingState::Charged.is_on_dock());
    }
}
