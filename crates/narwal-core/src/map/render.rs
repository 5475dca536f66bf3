// ── Map rasteriser ──
//
// Paints a MapModel into an RGB buffer: background, grid cells, room
// outlines (scanline fill), walls (Bresenham), then the dock and robot
// markers on top. Row 0 of the grid is the top row of the image.

use std::path::Path;

use serde::Serialize;

use crate::error::CoreError;
use crate::model::{CellKind, MAX_MAP_SIDE, MapModel, Point};

pub type Rgb = [u8; 3];

/// Largest rendered image side, in pixels. The scale shrinks to fit.
pub const MAX_IMAGE_SIDE: u32 = 8192;
/// Points further than this from the origin, in pixels, are not drawn.
const MAX_DRAW_COORD: f32 = 32_768.0;

/// Pastel room colours, indexed by [`color_index_for`].
pub const PALETTE: [Rgb; 22] = [
    [100, 149, 237],
    [144, 238, 144],
    [255, 182, 193],
    [255, 218, 185],
    [221, 160, 221],
    [176, 224, 230],
    [255, 255, 150],
    [188, 143, 143],
    [152, 251, 152],
    [135, 206, 250],
    [240, 128, 128],
    [216, 191, 216],
    [250, 250, 210],
    [173, 216, 230],
    [244, 164, 96],
    [245, 222, 179],
    [127, 255, 212],
    [255, 160, 122],
    [186, 218, 160],
    [255, 228, 196],
    [200, 162, 200],
    [174, 198, 207],
];

/// Palette slot for a room id. Ids start at 1, so room 1 takes slot 0.
pub fn color_index_for(room_id: u32) -> usize {
    let len = PALETTE.len();
    (usize::try_from(room_id).unwrap_or(0) % len + len - 1) % len
}

/// Colours and scale used by [`render`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Theme {
    /// Output pixels per map cell (at least 1). Lowered for maps that
    /// would exceed [`MAX_IMAGE_SIDE`].
    pub scale: u32,
    pub background: Rgb,
    pub floor: Rgb,
    pub obstacle: Rgb,
    /// Cells with a value the decoder could not classify.
    pub fallback: Rgb,
    pub wall: Rgb,
    /// Subtracted from each channel of a room colour for its border.
    pub border_darken: u8,
    pub palette: Vec<Rgb>,
    pub dock_fill: Rgb,
    pub dock_outline: Rgb,
    pub robot_fill: Rgb,
    pub robot_outline: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            scale: 1,
            background: [40, 40, 40],
            floor: [200, 200, 200],
            obstacle: [80, 80, 80],
            fallback: [180, 180, 180],
            wall: [60, 60, 60],
            border_darken: 80,
            palette: PALETTE.to_vec(),
            dock_fill: [255, 255, 255],
            dock_outline: [180, 180, 180],
            robot_fill: [0, 120, 255],
            robot_outline: [255, 255, 255],
        }
    }
}

impl Theme {
    fn room_color(&self, index: usize) -> Rgb {
        if self.palette.is_empty() {
            return self.fallback;
        }
        self.palette[index % self.palette.len()]
    }

    fn darken(&self, color: Rgb) -> Rgb {
        color.map(|c| c.saturating_sub(self.border_darken))
    }
}

// ── RasterImage ──────────────────────────────────────────────────────

/// A rendered map: tightly packed RGB rows, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl RasterImage {
    fn filled(width: u32, height: u32, color: Rgb) -> Self {
        let count = usize::try_from(u64::from(width) * u64::from(height)).unwrap_or(0);
        Self {
            width,
            height,
            pixels: color.repeat(count),
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let offset = self.offset(i64::from(x), i64::from(y))?;
        let px = self.pixels.get(offset..offset + 3)?;
        Some([px[0], px[1], px[2]])
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        usize::try_from((y * i64::from(self.width) + x) * 3).ok()
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb) {
        if let Some(offset) = self.offset(x, y) {
            if let Some(px) = self.pixels.get_mut(offset..offset + 3) {
                px.copy_from_slice(&color);
            }
        }
    }

    fn fill_rect(&mut self, x: i64, y: i64, size: i64, color: Rgb) {
        for dy in 0..size {
            for dx in 0..size {
                self.put(x + dx, y + dy, color);
            }
        }
    }

    /// Encode as an 8-bit RGB PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, CoreError> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().map_err(render_error)?;
            writer.write_image_data(&self.pixels).map_err(render_error)?;
            writer.finish().map_err(render_error)?;
        }
        Ok(out)
    }

    pub fn save_png(&self, path: &Path) -> Result<(), CoreError> {
        std::fs::write(path, self.to_png()?)?;
        Ok(())
    }
}

fn render_error(err: png::EncodingError) -> CoreError {
    CoreError::Render {
        message: err.to_string(),
    }
}

// ── Rendering ────────────────────────────────────────────────────────

/// Rasterise `model` with `theme`.
///
/// The extent is clipped to [`MAX_MAP_SIDE`] cells per side and geometry
/// too far off the image is skipped.
pub fn render(model: &MapModel, theme: &Theme) -> RasterImage {
    let (cells_w, cells_h) = model.extent();
    let (cells_w, cells_h) = (cells_w.min(MAX_MAP_SIDE), cells_h.min(MAX_MAP_SIDE));
    let scale = theme
        .scale
        .min(MAX_IMAGE_SIDE / cells_w.max(cells_h).max(1))
        .max(1);
    let mut image = RasterImage::filled(
        cells_w.saturating_mul(scale),
        cells_h.saturating_mul(scale),
        theme.background,
    );
    let s = i64::from(scale);
    let to_px = |p: Point| -> (f32, f32) { (p.x * scale_f(scale), p.y * scale_f(scale)) };

    if let Some(grid) = &model.grid {
        for y in 0..grid.height.min(cells_h) {
            for x in 0..grid.width.min(cells_w) {
                let color = match grid.cell(x, y) {
                    CellKind::Unknown => continue,
                    CellKind::Floor => theme.floor,
                    CellKind::Obstacle => theme.obstacle,
                    CellKind::Room { room_id, border } => {
                        let base = model
                            .room(room_id)
                            .map_or_else(|| theme.room_color(color_index_for(room_id)), |r| {
                                theme.room_color(r.color_index)
                            });
                        if border { theme.darken(base) } else { base }
                    }
                    CellKind::Other => theme.fallback,
                };
                image.fill_rect(i64::from(x) * s, i64::from(y) * s, s, color);
            }
        }
    }

    for room in model.rooms.iter().filter(|r| r.polygon.len() >= 3) {
        let color = theme.room_color(room.color_index);
        let points: Vec<(f32, f32)> = room.polygon.iter().copied().map(to_px).collect();
        if !points.iter().copied().all(drawable) {
            tracing::debug!(room = room.id, "Room outline out of range, not drawn");
            continue;
        }
        fill_polygon(&mut image, &points, color);
        let edge = theme.darken(color);
        for (i, &a) in points.iter().enumerate() {
            let b = points[(i + 1) % points.len()];
            draw_line(&mut image, a, b, edge);
        }
    }

    for wall in &model.walls {
        let (start, end) = (to_px(wall.start), to_px(wall.end));
        if drawable(start) && drawable(end) {
            draw_line(&mut image, start, end, theme.wall);
        }
    }

    let short_side = image.width.min(image.height);
    if let Some(dock) = model.dock.filter(|p| drawable(to_px(*p))) {
        let radius = (short_side / 60).max(4);
        draw_marker(&mut image, to_px(dock), radius, theme.dock_fill, theme.dock_outline);
    }
    if let Some(robot) = model.robot.filter(|r| drawable(to_px(r.position))) {
        let radius = (short_side / 80).max(3);
        draw_marker(
            &mut image,
            to_px(robot.position),
            radius,
            theme.robot_fill,
            theme.robot_outline,
        );
    }

    image
}

fn drawable((x, y): (f32, f32)) -> bool {
    x.is_finite() && y.is_finite() && x.abs() <= MAX_DRAW_COORD && y.abs() <= MAX_DRAW_COORD
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn scale_f(scale: u32) -> f32 {
    scale as f32
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn round(v: f32) -> i64 {
    v.round() as i64
}

/// Even-odd scanline fill, sampling each row at its pixel centre.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::as_conversions)]
fn fill_polygon(image: &mut RasterImage, points: &[(f32, f32)], color: Rgb) {
    let (min_y, max_y) = points
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)));
    let first_row = (min_y.floor() as i64).max(0);
    let last_row = (max_y.ceil() as i64).min(i64::from(image.height) - 1);

    let mut crossings = Vec::new();
    for row in first_row..=last_row {
        let sample = row as f32 + 0.5;
        crossings.clear();
        for (i, &(x1, y1)) in points.iter().enumerate() {
            let (x2, y2) = points[(i + 1) % points.len()];
            if (y1 <= sample) != (y2 <= sample) {
                crossings.push(x1 + (sample - y1) / (y2 - y1) * (x2 - x1));
            }
        }
        crossings.sort_by(f32::total_cmp);

        for span in crossings.chunks_exact(2) {
            let start = ((span[0] - 0.5).ceil() as i64).max(0);
            let end = ((span[1] - 0.5).floor() as i64).min(i64::from(image.width) - 1);
            for x in start..=end {
                image.put(x, row, color);
            }
        }
    }
}

/// Bresenham line between two pixel positions.
fn draw_line(image: &mut RasterImage, from: (f32, f32), to: (f32, f32), color: Rgb) {
    let (mut x0, mut y0) = (round(from.0), round(from.1));
    let (x1, y1) = (round(to.0), round(to.1));
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        image.put(x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Filled disc with a one-pixel outline.
fn draw_marker(image: &mut RasterImage, center: (f32, f32), radius: u32, fill: Rgb, outline: Rgb) {
    let (cx, cy) = (round(center.0), round(center.1));
    let r = i64::from(radius);
    let inner = (r - 1) * (r - 1);
    for dy in -r..=r {
        for dx in -r..=r {
            let d = dx * dx + dy * dy;
            if d > r * r {
                continue;
            }
            image.put(cx + dx, cy + dy, if d > inner { outline } else { fill });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Grid, Room, RobotPose, Segment};

    fn room(id: u32, polygon: Vec<Point>) -> Room {
        Room {
            id,
            name: None,
            room_type: None,
            polygon,
            color_index: color_index_for(id),
        }
    }

    #[test]
    fn color_index_is_stable_per_room() {
        assert_eq!(color_index_for(1), 0);
        assert_eq!(color_index_for(22), 21);
        assert_eq!(color_index_for(23), 0);
        assert_eq!(color_index_for(0), 21);
    }

    #[test]
    fn grid_cells_take_room_colors() {
        let model = MapModel {
            width: 3,
            height: 1,
            grid: Some(Grid::new(3, 1, vec![0x20, 0x0102, 0x0112])),
            rooms: vec![room(1, Vec::new())],
            ..MapModel::default()
        };
        let theme = Theme::default();
        let image = render(&model, &theme);

        assert_eq!(image.pixel(0, 0), Some(theme.floor));
        assert_eq!(image.pixel(1, 0), Some(PALETTE[0]));
        assert_eq!(image.pixel(2, 0), Some([20, 69, 157]));
    }

    #[test]
    fn unknown_cells_keep_background_and_scale_applies() {
        let model = MapModel {
            width: 2,
            height: 1,
            grid: Some(Grid::new(2, 1, vec![0, 0x28])),
            ..MapModel::default()
        };
        let theme = Theme {
            scale: 3,
            ..Theme::default()
        };
        let image = render(&model, &theme);

        assert_eq!((image.width, image.height), (6, 3));
        assert_eq!(image.pixel(2, 2), Some(theme.background));
        assert_eq!(image.pixel(3, 0), Some(theme.obstacle));
        assert_eq!(image.pixel(5, 2), Some(theme.obstacle));
    }

    #[test]
    fn polygon_interior_is_filled() {
        let square = vec![
            Point::new(2.0, 2.0),
            Point::new(18.0, 2.0),
            Point::new(18.0, 18.0),
            Point::new(2.0, 18.0),
        ];
        let model = MapModel {
            width: 20,
            height: 20,
            rooms: vec![room(3, square)],
            ..MapModel::default()
        };
        let theme = Theme::default();
        let image = render(&model, &theme);

        assert_eq!(image.pixel(10, 10), Some(PALETTE[2]));
        assert_eq!(image.pixel(0, 0), Some(theme.background));
        assert_eq!(image.pixel(19, 10), Some(theme.background));
    }

    #[test]
    fn walls_are_stroked() {
        let model = MapModel {
            width: 10,
            height: 10,
            walls: vec![Segment {
                start: Point::new(0.0, 5.0),
                end: Point::new(9.0, 5.0),
            }],
            ..MapModel::default()
        };
        let theme = Theme::default();
        let image = render(&model, &theme);

        for x in 0..10 {
            assert_eq!(image.pixel(x, 5), Some(theme.wall));
        }
        assert_eq!(image.pixel(4, 4), Some(theme.background));
    }

    #[test]
    fn robot_drawn_over_dock() {
        let center = Point::new(20.0, 20.0);
        let model = MapModel {
            width: 40,
            height: 40,
            walls: vec![Segment {
                start: Point::new(0.0, 0.0),
                end: Point::new(1.0, 0.0),
            }],
            dock: Some(center),
            robot: Some(RobotPose {
                position: center,
                heading: None,
            }),
            ..MapModel::default()
        };
        let theme = Theme::default();
        let image = render(&model, &theme);

        assert_eq!(image.pixel(20, 20), Some(theme.robot_fill));
        assert_eq!(image.pixel(23, 20), Some(theme.robot_outline));
        // Only the dock reaches four pixels out.
        assert_eq!(image.pixel(24, 20), Some(theme.dock_outline));
    }

    #[test]
    fn large_maps_are_rendered_at_a_reduced_scale() {
        let model = MapModel {
            width: 4000,
            height: 10,
            walls: vec![
                Segment {
                    start: Point::new(0.0, 0.0),
                    end: Point::new(3.0e9, 3.0e9),
                },
                Segment {
                    start: Point::new(0.0, 5.0),
                    end: Point::new(f32::NAN, 5.0),
                },
            ],
            robot: Some(RobotPose {
                position: Point::new(f32::INFINITY, 1.0),
                heading: None,
            }),
            ..MapModel::default()
        };
        let theme = Theme {
            scale: 16,
            ..Theme::default()
        };
        let image = render(&model, &theme);

        assert_eq!((image.width, image.height), (8000, 20));
        assert_eq!(image.pixel(0, 0), Some(theme.background));
        assert_eq!(image.pixel(0, 10), Some(theme.background));
    }

    #[test]
    fn geometry_without_size_is_clipped_to_the_limit() {
        let model = MapModel {
            rooms: vec![room(
                1,
                vec![
                    Point::new(0.0, 0.0),
                    Point::new(4.0, 0.0),
                    Point::new(4.0, 1.0e7),
                ],
            )],
            ..MapModel::default()
        };
        let image = render(&model, &Theme::default());
        assert_eq!((image.width, image.height), (4, MAX_MAP_SIDE));
    }

    #[test]
    fn png_has_signature_and_header() {
        let image = RasterImage::filled(4, 2, [1, 2, 3]);
        let png = image.to_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(&png[16..24], &[0, 0, 0, 4, 0, 0, 0, 2]);
    }

    #[test]
    fn save_png_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.png");
        RasterImage::filled(2, 2, [9, 9, 9]).save_png(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 8);
    }
}
