//! Codec behaviour against hand-built frames.
//!
//! Covers deterministic encoding, tolerance of unknown fields and topics,
//! and the two decode failure modes.
#![allow(clippy::unwrap_used)]

use bytes::{BufMut, Bytes, BytesMut};
use pretty_assertions::assert_eq;

use narwal_api::command::{self, Command, FanSpeed};
use narwal_api::message::{self, Message};
use narwal_api::protocol::topic;
use narwal_api::protocol::wire::MessageWriter;
use narwal_api::{DecodeError, DeviceIdentity, Frame, FrameKind, WorkingState};

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn robot() -> DeviceIdentity {
    DeviceIdentity::for_device("robot-1")
}

fn broadcast(short: &str, payload: Bytes) -> Bytes {
    Frame::new(FrameKind::Publish, robot().topic(short), payload)
        .encode()
        .unwrap()
}

// ── Encoding ────────────────────────────────────────────────────────

#[test]
fn heartbeat_frame_bytes() {
    let bytes = command::encode(&Command::AppHeartbeat, &robot()).unwrap();
    insta::assert_snapshot!(
        hex(&bytes),
        @"0131222f2f516f457349357159584f2f726f626f742d312f7374617475732f6170705f7374617475735f6865617274626561740801"
    );
}

#[test]
fn fan_speed_frame_bytes() {
    let bytes = command::encode(&Command::SetFanSpeed(FanSpeed::Max), &robot()).unwrap();
    insta::assert_snapshot!(
        hex(&bytes),
        @"012922272f516f457349357159584f2f726f626f742d312f636c65616e2f7365745f66616e5f6c6576656c0803"
    );
}

#[test]
fn encoding_is_deterministic() {
    for cmd in Command::wake_sequence()
        .into_iter()
        .chain([Command::Start, Command::SetFanSpeed(FanSpeed::Strong), Command::GetMap])
    {
        let first = command::encode(&cmd, &robot()).unwrap();
        let second = command::encode(&cmd.clone(), &robot()).unwrap();
        assert_eq!(first, second, "{cmd:?} encoded differently");
    }
}

#[test]
fn encoded_commands_decode_back_to_their_topic() {
    let bytes = command::encode(&Command::ReturnToDock, &robot()).unwrap();
    let frame = Frame::decode(&bytes).unwrap();
    assert_eq!(frame.kind, FrameKind::Publish);
    assert_eq!(frame.short_topic(), topic::SUPPLY_RECALL);
    assert!(frame.payload.is_empty());
}

// ── Tolerance ───────────────────────────────────────────────────────

#[test]
fn unknown_field_is_skipped() {
    let payload = MessageWriter::new()
        .bytes(500, b"future firmware")
        .message(3, MessageWriter::new().varint(1, 4).varint(99, 1))
        .varint(38, 64)
        .fixed32(501, 0xdead_beef)
        .finish();

    let Message::Status(update) = message::decode(&broadcast(topic::ROBOT_BASE_STATUS, payload)).unwrap()
    else {
        panic!("expected a status message");
    };
    assert_eq!(update.working_state, Some(WorkingState::Cleaning));
    assert_eq!(update.battery_percent, Some(64));
}

#[test]
fn unknown_topic_is_not_an_error() {
    let msg = message::decode(&broadcast("vendor/new_thing", Bytes::from_static(b"\x08\x01"))).unwrap();
    assert_eq!(
        msg,
        Message::Unknown {
            topic: "vendor/new_thing".into(),
            payload: Bytes::from_static(b"\x08\x01"),
        }
    );
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn length_prefix_past_end_is_truncated() {
    // field 3, declared length 40, 2 bytes present
    let bytes = broadcast(topic::ROBOT_BASE_STATUS, Bytes::from_static(&[0x1a, 0x28, 0x08, 0x04]));
    let err = message::decode(&bytes).unwrap_err();
    assert!(matches!(err, DecodeError::Truncated { .. }), "got {err:?}");
}

#[test]
fn topic_length_past_end_is_truncated() {
    let mut buf = BytesMut::new();
    buf.put_slice(&[0x01, 0x20, 0x22, 0x1e]);
    buf.put_slice(b"/short");
    let err = message::decode(&buf.freeze()).unwrap_err();
    assert_eq!(err, DecodeError::Truncated { needed: 34, available: 10 });
}

#[test]
fn garbage_is_malformed() {
    let err = message::decode(&Bytes::from_static(b"hello world")).unwrap_err();
    assert!(matches!(err, DecodeError::Malformed { .. }));
}

#[test]
fn bad_frame_does_not_affect_the_next_one() {
    let bad = broadcast(topic::WORKING_STATUS, Bytes::from_static(&[0x1a, 0x7f]));
    let good = broadcast(
        topic::WORKING_STATUS,
        MessageWriter::new().varint(3, 90).finish(),
    );

    assert!(message::decode(&bad).is_err());
    let Message::Status(update) = message::decode(&good).unwrap() else {
        panic!("expected a status message");
    };
    assert_eq!(update.cleaning_seconds, Some(90));
}
