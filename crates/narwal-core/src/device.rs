// ── Device facade ──
//
// `Vacuum` is what a host integration talks to. It translates its command
// vocabulary into codec commands and answers every read from the last
// snapshot, whatever the connection is doing. Settings the robot never
// reports back (fan speed, mop humidity) show up as locally set once the
// session writes them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use narwal_api::{Command, DeviceIdentity, FanSpeed, MopHumidity, Transport, WebSocketTransport};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::map::RasterImage;
use crate::model::{DeviceEvent, MapModel, StatusSnapshot};
use crate::session::{CommandOutcome, Session, SessionState};
use crate::store::MapSnapshot;
use crate::subscription::{CallbackHandle, DeviceSubscription};

/// Commands a host can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command", content = "value")]
pub enum VacuumCommand {
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
    WashMop,
    DryMop,
    EmptyDustbin,
    RefreshMap,
    TakePicture,
}

impl VacuumCommand {
    /// The codec command this maps to.
    pub fn to_command(self) -> Command {
        match self {
            Self::Start => Command::Start,
            Self::EasyClean => Command::EasyClean,
            Self::Stop => Command::Stop,
            Self::Cancel => Command::Cancel,
            Self::Pause => Command::Pause,
            Self::Resume => Command::Resume,
            Self::ReturnToDock => Command::ReturnToDock,
            Self::Locate => Command::Locate,
            Self::SetFanSpeed(speed) => Command::SetFanSpeed(speed),
            Self::SetMopHumidity(humidity) => Command::SetMopHumidity(humidity),
            Self::WashMop => Command::WashMop,
            Self::DryMop => Command::DryMop,
            Self::EmptyDustbin => Command::EmptyDustbin,
            Self::RefreshMap => Command::GetMap,
            Self::TakePicture => Command::TakePicture,
        }
    }
}

/// One robot vacuum on the local network.
#[derive(Debug, Clone)]
pub struct Vacuum {
    session: Session,
}

impl Vacuum {
    /// A vacuum reached over WebSocket at `config.host:config.port`.
    ///
    /// Fails only when the host does not form a valid URL.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let transport =
            WebSocketTransport::new(&config.host, config.port, config.connect_timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// A vacuum reached through a custom transport.
    pub fn with_transport(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            session: Session::new(config, transport),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the session. Returns immediately; the session keeps trying
    /// in the background until [`disconnect`](Self::disconnect).
    pub async fn connect(&self) {
        self.session.start().await;
    }

    pub async fn disconnect(&self) {
        self.session.stop().await;
    }

    /// Wait until the robot answers, up to `timeout`.
    pub async fn wait_until_awake(&self, timeout: Duration) -> Result<(), CoreError> {
        self.session
            .wait_for_state(SessionState::Awake, timeout)
            .await
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send a command. Fan speed and mop humidity are recorded as locally
    /// set when the command is written to the robot; one replaced while
    /// held for a sleeping robot leaves the cached value alone.
    pub async fn send_command(&self, command: VacuumCommand) -> Result<CommandOutcome, CoreError> {
        let ticket = self.session.submit(command.to_command())?;
        debug!(?command, id = ticket.id(), "Command submitted");
        ticket.outcome().await
    }

    /// Ask the robot for its current map. The reply arrives as a
    /// [`DeviceEvent::MapReady`].
    pub async fn refresh_map(&self) -> Result<CommandOutcome, CoreError> {
        self.send_command(VacuumCommand::RefreshMap).await
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe(&self) -> DeviceSubscription {
        DeviceSubscription::new(self.session.subscribe())
    }

    /// Call `callback` for every event until the handle is dropped.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: FnMut(DeviceEvent) + Send + 'static,
    {
        CallbackHandle::spawn(self.subscribe(), callback)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Last known status. `available` is `true` only while awake.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.session.state();
        StatusSnapshot {
            status: self.session.store().status(),
            available: state == SessionState::Awake,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Topic identity in use (as configured, or as reported by the robot).
    pub fn identity(&self) -> Arc<DeviceIdentity> {
        self.session.store().identity()
    }

    pub fn last_map(&self) -> Option<Arc<MapSnapshot>> {
        self.session.store().map()
    }

    pub fn map_model(&self) -> Option<Arc<MapModel>> {
        self.last_map().map(|m| Arc::clone(&m.model))
    }

    pub fn map_image(&self) -> Option<Arc<RasterImage>> {
        self.last_map().map(|m| Arc::clone(&m.image))
    }

    /// The last rendered map as PNG bytes.
    pub fn map_png(&self) -> Result<Option<Vec<u8>>, CoreError> {
        self.map_image().map(|image| image.to_png()).transpose()
    }

    /// Write the last rendered map to `path`. Returns `false` when no map
    /// has been received yet.
    pub fn save_map_png(&self, path: &Path) -> Result<bool, CoreError> {
        match self.map_image() {
            Some(image) => {
                image.save_png(path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
