//! WebSocket transport to the device's local endpoint.
//!
//! The robot listens on `ws://<host>:9002` and accepts one client at a
//! time. Every message is a binary frame; text, ping and pong messages carry
//! nothing for us and are dropped here.
//!
//! # Example
//!
//! ```rust,ignore
//! use narwal_api::{Transport, WebSocketTransport};
//! use std::time::Duration;
//!
//! let transport = WebSocketTransport::new("192.168.1.50", 9002, Duration::from_secs(10))?;
//! let conn = transport.connect().await?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::error::Error;
use crate::transport::{Connection, Transport};

// ── WebSocketTransport ───────────────────────────────────────────────

/// Opens plain `ws://` connections to one device.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> Result<Self, Error> {
        let url = Url::parse(&format!("ws://{host}:{port}"))?;
        Ok(Self::from_url(url, connect_timeout))
    }

    pub fn from_url(url: Url, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) -> BoxFuture<'_, Result<Connection, Error>> {
        Box::pin(open(&self.url, self.connect_timeout))
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

// ── Single connection ────────────────────────────────────────────────

async fn open(url: &Url, connect_timeout: Duration) -> Result<Connection, Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let (ws_stream, _response) =
        tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: connect_timeout.as_secs(),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");

    let (write, read) = ws_stream.split();

    let sink = write
        .sink_map_err(|e| Error::WebSocketIo(e.to_string()))
        .with(|frame: Bytes| future::ready(Ok::<_, Error>(Message::binary(frame))));

    let stream = read.filter_map(|msg| future::ready(binary_payload(msg)));

    Ok(Connection {
        sink: Box::pin(sink),
        stream: Box::pin(stream),
    })
}

/// Keep binary payloads, surface close frames and errors, drop the rest.
fn binary_payload(msg: Result<Message, tungstenite::Error>) -> Option<Result<Bytes, Error>> {
    match msg {
        Ok(Message::Binary(data)) => Some(Ok(data)),
        Ok(Message::Close(frame)) => {
            let (code, reason) = frame.map_or((1005, String::new()), |cf| {
                (u16::from(cf.code), cf.reason.as_str().to_owned())
            });
            tracing::info!(code, reason = %reason, "WebSocket close frame received");
            Some(Err(Error::WebSocketClosed { code, reason }))
        }
        Ok(Message::Ping(_)) => {
            // tungstenite answers pings itself
            tracing::trace!("WebSocket ping");
            None
        }
        Ok(Message::Text(text)) => {
            tracing::debug!(len = text.len(), "Ignoring text message");
            None
        }
        Ok(_) => None,
        Err(e) => Some(Err(Error::WebSocketIo(e.to_string()))),
    }
}
