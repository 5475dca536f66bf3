use serde::Serialize;

/// A position in map cells (one cell = one pixel at render scale 1).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Room {
    pub id: u32,
    pub name: Option<String>,
    pub room_type: Option<u32>,
    /// Outline in cells; empty when the map only has a raster grid.
    pub polygon: Vec<Point>,
    /// Index into the render palette, derived from `id`.
    pub color_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RobotPose {
    pub position: Point,
    pub heading: Option<f32>,
}

// ── Raster grid ──────────────────────────────────────────────────────

/// Largest map side, in cells, the decoder accepts.
pub const MAX_MAP_SIDE: u32 = 8192;

const CELL_UNKNOWN: u32 = 0x00;
const CELL_FLOOR: u32 = 0x20;
const CELL_OBSTACLE: u32 = 0x28;
const CELL_BORDER_BIT: u32 = 0x10;

/// What one grid cell holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Unknown,
    /// Floor not assigned to any room.
    Floor,
    /// Obstacle not assigned to any room.
    Obstacle,
    /// A cell of a room; `border` marks the room's edge.
    Room { room_id: u32, border: bool },
    /// A value the decoder cannot place.
    Other,
}

impl CellKind {
    /// Classify a raw cell value: `room_id << 8 | flags`.
    pub fn from_raw(value: u32) -> Self {
        match value {
            CELL_UNKNOWN => Self::Unknown,
            CELL_FLOOR => Self::Floor,
            CELL_OBSTACLE => Self::Obstacle,
            v if v >> 8 == 0 => Self::Other,
            v => Self::Room {
                room_id: v >> 8,
                border: v & CELL_BORDER_BIT != 0,
            },
        }
    }
}

/// Row-major raster of raw cell values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub width: u32,
    pub height: u32,
    cells: Vec<u32>,
}

impl Grid {
    /// `cells` must hold exactly `width * height` values.
    pub(crate) fn new(width: u32, height: u32, cells: Vec<u32>) -> Self {
        debug_assert_eq!(cells.len(), cell_count(width, height));
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn raw(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = usize::try_from(u64::from(y) * u64::from(self.width) + u64::from(x)).ok()?;
        self.cells.get(index).copied()
    }

    pub fn cell(&self, x: u32, y: u32) -> CellKind {
        self.raw(x, y).map_or(CellKind::Unknown, CellKind::from_raw)
    }

    pub fn cells(&self) -> &[u32] {
        &self.cells
    }
}

pub(crate) fn cell_count(width: u32, height: u32) -> usize {
    usize::try_from(u64::from(width) * u64::from(height)).unwrap_or(usize::MAX)
}

// ── MapModel ─────────────────────────────────────────────────────────

/// One decoded floor plan. Replaced wholesale on every good map payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapModel {
    /// Size in cells; zero when the payload only carried vector geometry.
    pub width: u32,
    pub height: u32,
    /// Millimetres per cell.
    pub resolution_mm: Option<u32>,
    pub rooms: Vec<Room>,
    pub walls: Vec<Segment>,
    pub dock: Option<Point>,
    pub robot: Option<RobotPose>,
    pub grid: Option<Grid>,
    pub area: Option<u64>,
    pub created_at: Option<u64>,
}

impl MapModel {
    pub fn room(&self, id: u32) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    /// Whether there is anything to draw.
    pub fn has_geometry(&self) -> bool {
        self.grid.is_some()
            || self.rooms.iter().any(|r| r.polygon.len() >= 3)
            || !self.walls.is_empty()
    }

    /// Drawing extent in cells: the declared size, or the bounding box of
    /// the vector geometry when no size was sent.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::as_conversions
    )]
    pub fn extent(&self) -> (u32, u32) {
        if self.width > 0 && self.height > 0 {
            return (self.width, self.height);
        }

        let points = self
            .rooms
            .iter()
            .flat_map(|r| r.polygon.iter().copied())
            .chain(self.walls.iter().flat_map(|w| [w.start, w.end]))
            .chain(self.dock);

        let (max_x, max_y) = points.fold((0.0_f32, 0.0_f32), |(mx, my), p| {
            (mx.max(p.x), my.max(p.y))
        });

        ((max_x.ceil() as u32).max(1), (max_y.ceil() as u32).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_classification() {
        assert_eq!(CellKind::from_raw(0), CellKind::Unknown);
        assert_eq!(CellKind::from_raw(0x20), CellKind::Floor);
        assert_eq!(CellKind::from_raw(0x28), CellKind::Obstacle);
        assert_eq!(
            CellKind::from_raw(0x0302),
            CellKind::Room {
                room_id: 3,
                border: false
            }
        );
        assert_eq!(
            CellKind::from_raw(0x0312),
            CellKind::Room {
                room_id: 3,
                border: true
            }
        );
        assert_eq!(CellKind::from_raw(0x05), CellKind::Other);
    }

    #[test]
    fn grid_lookup_is_row_major() {
        let grid = Grid::new(3, 2, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(grid.raw(2, 0), Some(2));
        assert_eq!(grid.raw(0, 1), Some(3));
        assert_eq!(grid.raw(3, 0), None);
        assert_eq!(grid.cell(9, 9), CellKind::Unknown);
    }

    #[test]
    fn extent_falls_back_to_geometry_bounds() {
        let model = MapModel {
            rooms: vec![Room {
                id: 1,
                name: None,
                room_type: None,
                polygon: vec![Point::new(0.0, 0.0), Point::new(10.2, 0.0), Point::new(10.2, 7.5)],
                color_index: 0,
            }],
            ..MapModel::default()
        };
        assert_eq!(model.extent(), (11, 8));
        assert!(model.has_geometry());
        assert!(!MapModel::default().has_geometry());
    }
}
