// narwal-core: Session state machine, device model and map rendering between narwal-api and consumers.

pub mod config;
pub mod device;
pub mod error;
pub mod map;
pub mod model;
pub mod session;
pub mod store;
pub mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{PendingPolicy, ReconnectConfig, SessionConfig};
pub use device::{Vacuum, VacuumCommand};
pub use error::CoreError;
pub use map::{RasterImage, Theme};
pub use model::{Activity, DeviceEvent, DeviceStatus, LocalSetting, MapModel, StatusSnapshot};
pub use session::{CommandOutcome, CommandTicket, Session, SessionState};
pub use store::{DeviceStore, MapSnapshot};
pub use subscription::{CallbackHandle, DeviceSubscription};

// Codec types that appear in this crate's public API.
pub use narwal_api::protocol::DEFAULT_PORT;
pub use narwal_api::{
    CommandAck, CommandResult, DeviceIdentity, DeviceInfo, FanSpeed, MopHumidity, WorkingState,
};
