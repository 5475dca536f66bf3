// ── Map payload decoder ──
//
// Map messages carry a header (size, resolution, origin), a room list with
// optional outlines, wall segments, dock entries and usually a compressed
// raster grid. Broadcasts nest the grid block in field 7; `get_map` replies
// keep it at the top level. Either way the whole map is rebuilt from one
// payload.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder};
use narwal_api::DecodeError;
use narwal_api::protocol::wire::{Fields, read_varint};

use crate::map::render::color_index_for;
use crate::model::{Grid, MAX_MAP_SIDE, MapModel, Point, RobotPose, Room, Segment, cell_count};

// Top-level map fields.
const F_ROBOT: u32 = 1;
const F_RESOLUTION: u32 = 3;
const F_WIDTH: u32 = 4;
const F_HEIGHT: u32 = 5;
const F_ORIGIN: u32 = 6;
const F_GRID_BLOCK: u32 = 7;
const F_ROOMS: u32 = 12;
const F_GRID: u32 = 17;
const F_WALLS: u32 = 20;
const F_AREA: u32 = 33;
const F_CREATED_AT: u32 = 34;
const F_DOCKS: u32 = 48;

const GRID_HEADER_TAG: u8 = 0x0a;
/// A grid may be padded to at most this many times the cells it carried.
const MAX_GRID_PADDING: usize = 4;
/// Longest varint a cell can take, plus room for the grid wrapper.
const MAX_CELL_BYTES: u64 = 10;
const GRID_WRAPPER_BYTES: u64 = 16;

/// Decode one map payload.
///
/// An empty payload is [`DecodeError::Truncated`]. A payload that parses
/// but holds nothing drawable, or whose size or geometry exceeds
/// [`MAX_MAP_SIDE`] cells per side, is [`DecodeError::Malformed`].
pub fn decode_map(payload: &[u8]) -> Result<MapModel, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Truncated {
            needed: 1,
            available: 0,
        });
    }

    let fields = Fields::parse(payload)?;
    let block = fields.message(F_GRID_BLOCK);

    let width = block
        .as_ref()
        .and_then(|b| b.u32(1))
        .or_else(|| fields.u32(F_WIDTH))
        .unwrap_or(0);
    let height = block
        .as_ref()
        .and_then(|b| b.u32(2))
        .or_else(|| fields.u32(F_HEIGHT))
        .unwrap_or(0);
    if width > MAX_MAP_SIDE || height > MAX_MAP_SIDE {
        return Err(DecodeError::Malformed {
            reason: format!("map size {width}x{height} exceeds {MAX_MAP_SIDE} cells per side"),
        });
    }
    let resolution_mm = fields.u32(F_RESOLUTION).filter(|r| *r > 0);
    let origin = fields.message(F_ORIGIN).map_or(Point::default(), |o| {
        Point::new(o.f32(3).unwrap_or(0.0), o.f32(1).unwrap_or(0.0))
    });

    let grid = block
        .as_ref()
        .and_then(|b| b.bytes(3))
        .or_else(|| fields.bytes(F_GRID))
        .and_then(|compressed| decode_grid(compressed, width, height));

    let model = MapModel {
        width,
        height,
        resolution_mm,
        rooms: fields.messages(F_ROOMS).filter_map(|r| room(&r)).collect(),
        walls: fields.messages(F_WALLS).filter_map(|w| wall(&w)).collect(),
        dock: dock_position(&fields, resolution_mm, origin),
        robot: fields.message(F_ROBOT).and_then(|r| robot_pose(&r)),
        grid,
        area: fields.u64(F_AREA),
        created_at: fields.u64(F_CREATED_AT),
    };

    if !model.has_geometry() {
        return Err(DecodeError::Malformed {
            reason: "map payload carries no grid, room outlines or walls".into(),
        });
    }

    let (extent_w, extent_h) = model.extent();
    if extent_w > MAX_MAP_SIDE || extent_h > MAX_MAP_SIDE {
        return Err(DecodeError::Malformed {
            reason: format!(
                "map geometry spans {extent_w}x{extent_h} cells, over {MAX_MAP_SIDE} per side"
            ),
        });
    }

    Ok(model)
}

fn point(fields: &Fields<'_>) -> Option<Point> {
    Some(Point::new(fields.f32(1)?, fields.f32(2)?))
}

fn room(fields: &Fields<'_>) -> Option<Room> {
    let id = fields.u32(1)?;
    Some(Room {
        id,
        name: fields.str(3).filter(|s| !s.is_empty()).map(str::to_owned),
        room_type: fields.u32(2),
        polygon: fields.messages(4).filter_map(|p| point(&p)).collect(),
        color_index: color_index_for(id),
    })
}

fn wall(fields: &Fields<'_>) -> Option<Segment> {
    Some(Segment {
        start: point(&fields.message(1)?)?,
        end: point(&fields.message(2)?)?,
    })
}

fn robot_pose(fields: &Fields<'_>) -> Option<RobotPose> {
    Some(RobotPose {
        position: point(fields)?,
        heading: fields.f32(3),
    })
}

/// Latest dock entry, converted from centimetres to cells.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn dock_position(fields: &Fields<'_>, resolution_mm: Option<u32>, origin: Point) -> Option<Point> {
    let entry = fields
        .messages(F_DOCKS)
        .filter_map(|d| {
            let pos = d.message(2)?;
            Some((d.u64(3).unwrap_or(0), pos.f32(1)?, pos.f32(2)?))
        })
        .max_by_key(|(ts, _, _)| *ts)?;

    let (_, x_cm, y_cm) = entry;
    let cm_per_cell = resolution_mm.map_or(1.0, |r| r as f32 / 10.0);
    Some(Point::new(
        x_cm / cm_per_cell - origin.x,
        y_cm / cm_per_cell - origin.y,
    ))
}

// ── Raster grid ──────────────────────────────────────────────────────

/// Inflate and unpack the cell grid. Short grids are padded with unknown
/// cells and long ones cut, so the result always matches the header size.
/// A grid carrying under a quarter of its declared cells is dropped.
fn decode_grid(compressed: &[u8], width: u32, height: u32) -> Option<Grid> {
    let expected = cell_count(width, height);
    if expected == 0 || compressed.is_empty() {
        return None;
    }

    let limit = u64::try_from(expected)
        .unwrap_or(u64::MAX)
        .saturating_mul(MAX_CELL_BYTES)
        .saturating_add(GRID_WRAPPER_BYTES);
    let raw = inflate(compressed, limit);
    let body = strip_grid_header(&raw);

    let mut cells = Vec::new();
    let mut pos = 0;
    while pos < body.len() && cells.len() < expected {
        match read_varint(body, &mut pos) {
            Ok(value) => cells.push(u32::try_from(value).unwrap_or(0)),
            Err(_) => break,
        }
    }

    if cells.len().saturating_mul(MAX_GRID_PADDING) < expected {
        tracing::warn!(
            decoded = cells.len(),
            expected,
            "Map grid carries too few cells for its header, dropping it"
        );
        return None;
    }
    if cells.len() < expected {
        tracing::debug!(
            decoded = cells.len(),
            expected,
            "Map grid shorter than its header, padding"
        );
        cells.resize(expected, 0);
    }

    Some(Grid::new(width, height, cells))
}

/// Inflate at most `limit` bytes; zlib first, then raw deflate.
fn inflate(data: &[u8], limit: u64) -> Cow<'_, [u8]> {
    let mut out = Vec::new();
    if ZlibDecoder::new(data)
        .take(limit)
        .read_to_end(&mut out)
        .is_ok()
    {
        return Cow::Owned(out);
    }

    out.clear();
    if DeflateDecoder::new(data)
        .take(limit)
        .read_to_end(&mut out)
        .is_ok()
        && !out.is_empty()
    {
        return Cow::Owned(out);
    }

    tracing::warn!(len = data.len(), "Map grid is not compressed, reading it raw");
    Cow::Borrowed(data)
}

/// Skip the `0x0a <len>` wrapper some firmwares put around the packed cells.
fn strip_grid_header(data: &[u8]) -> &[u8] {
    if data.first() != Some(&GRID_HEADER_TAG) {
        return data;
    }
    let mut pos = 1;
    match read_varint(data, &mut pos) {
        Ok(_) => data.get(pos..).unwrap_or_default(),
        Err(_) => data,
    }
}
