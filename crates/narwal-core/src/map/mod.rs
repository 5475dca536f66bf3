//! Map payload decoding and rendering.
//!
//! [`decode_map`] turns a `display_map` broadcast or a `get_map` reply into
//! a [`MapModel`](crate::model::MapModel); [`render`] paints it into an RGB
//! raster with a stable colour per room.

mod decode;
mod render;

pub use decode::decode_map;
pub use render::{MAX_IMAGE_SIDE, PALETTE, RasterImage, Rgb, Theme, color_index_for, render};
