// ── Domain model ──
//
// Device status, map geometry and the events published to subscribers.

mod map;
mod status;

use std::sync::Arc;

pub use map::{CellKind, Grid, MAX_MAP_SIDE, MapModel, Point, RobotPose, Room, Segment};
pub(crate) use map::cell_count;
pub use status::{Activity, DeviceStatus, LocalSetting, StatusSnapshot};

use crate::session::SessionState;
use crate::store::MapSnapshot;

/// A change published to subscribers, in arrival order.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The session moved to a new state. Availability follows `Awake`.
    StateChanged(SessionState),
    /// The cached status changed.
    Status(Arc<DeviceStatus>),
    /// A new map was decoded and rendered.
    MapReady(Arc<MapSnapshot>),
}
