// narwal-api: Wire codec and socket transport for Narwal robot vacuums on the local network.

pub mod command;
pub mod error;
pub mod message;
pub mod protocol;
pub mod transport;
pub mod websocket;

pub use command::{Command, CommandFrame, FanSpeed, MopHumidity};
pub use error::{DecodeError, EncodeError, Error};
pub use message::{
    CommandAck, CommandResult, DeviceInfo, MapBroadcast, Message, StatusUpdate, WorkingState,
};
pub use protocol::topic::DeviceIdentity;
pub use protocol::{Frame, FrameKind};
pub use transport::{Connection, FrameSink, FrameStream, Transport};
pub use websocket::WebSocketTransport;
