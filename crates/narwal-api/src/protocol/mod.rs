//! Binary framing and the protobuf-lite payload format spoken on port 9002.
//!
//! [`frame`] wraps a topic and payload into the one-frame-per-message
//! envelope, [`wire`] reads and writes untyped protobuf fields, and
//! [`topic`] holds the topic catalogue and device addressing.

pub mod frame;
pub mod topic;
pub mod wire;

pub use frame::{Frame, FrameKind};

/// Port of the device's local WebSocket endpoint.
pub const DEFAULT_PORT: u16 = 9002;
