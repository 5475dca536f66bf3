// ── Frame transport seam ──
//
// The session talks to the device through this trait so tests can swap the
// WebSocket for in-memory channels. A connection is a sink of outbound frame
// bytes and a stream of inbound ones; one item is one frame.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};

use crate::error::Error;

/// Outbound half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = Error> + Send>>;

/// Inbound half of an open connection. Ends when the socket closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// An open connection to the device.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Something that can open a connection to the device.
pub trait Transport: Send + Sync {
    /// Open a new connection. Each call yields an independent socket.
    fn connect(&self) -> BoxFuture<'_, Result<Connection, Error>>;

    /// Where this transport connects to, for logs.
    fn endpoint(&self) -> String;
}
