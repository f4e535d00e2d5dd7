//! Pan/zoom viewport over the slippy-map tile grid.
//!
//! The pan offset is the screen position of the grid's top-left corner
//! relative to the viewport origin. It is kept clamped so the grid always
//! covers the whole window:
//!
//! ```text
//!   offset ≤ 0   and   |offset| ≤ 2^zoom · 256 − window
//! ```

use std::f64::consts::PI;
use std::sync::Arc;

use super::streamer::TileStreamer;
use super::tile::{Tile, TileCoord, TILE_SIZE};

/// Latitude limit of the Web-Mercator projection.
const MAX_LATITUDE: f64 = 85.051_128_78;

/// Zoom levels 0..=30 keep the tile stride within `u32`.
pub const MAX_ZOOM_LEVELS: u32 = 31;

/// Half-open rectangle of tile indices at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u32,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn len(&self) -> usize {
        (self.max_x.saturating_sub(self.min_x) as usize)
            * (self.max_y.saturating_sub(self.min_y) as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.zoom == self.zoom
            && (self.min_x..self.max_x).contains(&coord.x)
            && (self.min_y..self.max_y).contains(&coord.y)
    }

    /// Row-major iteration over the range.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.min_y..self.max_y)
            .flat_map(move |y| {
                (self.min_x..self.max_x).map(move |x| TileCoord::new(x, y, self.zoom))
            })
    }
}

/// A requested tile and where to draw it.
#[derive(Debug, Clone)]
pub struct TilePlacement {
    pub tile: Arc<Tile>,
    pub screen_x: f32,
    pub screen_y: f32,
}

/// Viewport state: window size, zoom level and clamped pan offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    width: u32,
    height: u32,
    zoom: u32,
    min_zoom: u32,
    max_zoom_levels: u32,
    offset_x: i64,
    offset_y: i64,
}

impl Atlas {
    /// Create a viewport at the minimum zoom, centred on the map.
    pub fn new(width: u32, height: u32, max_zoom_levels: u32) -> Self {
        let max_zoom_levels = max_zoom_levels.clamp(1, MAX_ZOOM_LEVELS);
        let min_zoom = min_zoom_for(width, height, max_zoom_levels);
        let mut atlas = Self {
            width,
            height,
            zoom: min_zoom,
            min_zoom,
            max_zoom_levels,
            offset_x: 0,
            offset_y: 0,
        };
        atlas.center();
        atlas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    pub fn min_zoom(&self) -> u32 {
        self.min_zoom
    }

    pub fn max_zoom_levels(&self) -> u32 {
        self.max_zoom_levels
    }

    /// Pan offset in pixels, both components ≤ 0.
    pub fn offset(&self) -> (i64, i64) {
        (self.offset_x, self.offset_y)
    }

    /// Number of tiles along each axis at the current zoom.
    pub fn stride(&self) -> u32 {
        1 << self.zoom
    }

    fn grid_size(&self) -> i64 {
        i64::from(self.stride()) * i64::from(TILE_SIZE)
    }

    /// Centre the grid in the window.
    pub fn center(&mut self) {
        let grid = self.grid_size();
        self.offset_x = -(grid - i64::from(self.width)) / 2;
        self.offset_y = -(grid - i64::from(self.height)) / 2;
        self.clamp_offset();
    }

    /// Apply a new window size, raising the zoom if the grid no longer covers it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.min_zoom = min_zoom_for(width, height, self.max_zoom_levels);
        while self.zoom < self.min_zoom {
            self.zoom_in();
        }
        self.clamp_offset();
    }

    /// Move the grid by `(dx, dy)` screen pixels.
    pub fn pan(&mut self, dx: i64, dy: i64) {
        self.offset_x = self.offset_x.saturating_add(dx);
        self.offset_y = self.offset_y.saturating_add(dy);
        self.clamp_offset();
    }

    /// Zoom in one level around the window centre. Returns `false` at the
    /// maximum zoom.
    pub fn zoom_in(&mut self) -> bool {
        if self.zoom + 1 >= self.max_zoom_levels {
            return false;
        }
        self.zoom += 1;
        self.offset_x = self.offset_x * 2 - i64::from(self.width) / 2;
        self.offset_y = self.offset_y * 2 - i64::from(self.height) / 2;
        self.clamp_offset();
        true
    }

    /// Zoom out one level around the window centre. Returns `false` at the
    /// minimum zoom.
    pub fn zoom_out(&mut self) -> bool {
        if self.zoom <= self.min_zoom {
            return false;
        }
        self.zoom -= 1;
        self.offset_x = self.offset_x / 2 + i64::from(self.width) / 4;
        self.offset_y = self.offset_y / 2 + i64::from(self.height) / 4;
        self.clamp_offset();
        true
    }

    /// Step towards `zoom`, bounded to `[min_zoom, max_zoom_levels)`.
    pub fn set_zoom(&mut self, zoom: u32) {
        while self.zoom < zoom && self.zoom_in() {}
        while self.zoom > zoom && self.zoom_out() {}
    }

    fn clamp_offset(&mut self) {
        let grid = self.grid_size();
        let limit_x = (grid - i64::from(self.width)).max(0);
        let limit_y = (grid - i64::from(self.height)).max(0);
        self.offset_x = self.offset_x.clamp(-limit_x, 0);
        self.offset_y = self.offset_y.clamp(-limit_y, 0);
    }

    /// Tiles intersecting the window at the current zoom.
    pub fn visible_tiles(&self) -> TileRange {
        let tile = i64::from(TILE_SIZE);
        let stride = i64::from(self.stride());
        let left = -self.offset_x;
        let top = -self.offset_y;

        let clip = |v: i64| v.clamp(0, stride) as u32;
        TileRange {
            zoom: self.zoom,
            min_x: clip(left.div_euclid(tile)),
            max_x: clip((left + i64::from(self.width) + tile - 1).div_euclid(tile)),
            min_y: clip(top.div_euclid(tile)),
            max_y: clip((top + i64::from(self.height) + tile - 1).div_euclid(tile)),
        }
    }

    /// Request every visible tile from `streamer`.
    ///
    /// Tiles are static while the viewport sits at its minimum zoom, so the
    /// overview layer is never evicted. `origin` is the window's top-left
    /// corner in screen space.
    pub fn request_tiles(
        &self,
        streamer: &TileStreamer,
        origin: (f32, f32),
    ) -> Vec<TilePlacement> {
        let is_static = self.zoom == self.min_zoom;
        self.visible_tiles()
            .iter()
            .map(|coord| {
                let (screen_x, screen_y) =
                    self.to_screen((f64::from(coord.x), f64::from(coord.y)), origin);
                TilePlacement {
                    tile: streamer.get(coord, is_static),
                    screen_x,
                    screen_y,
                }
            })
            .collect()
    }

    /// Web-Mercator projection of a longitude/latitude into fractional
    /// tile coordinates at the current zoom.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        project(lon, lat, self.zoom)
    }

    /// Convert fractional tile coordinates to screen pixels.
    pub fn to_screen(&self, tile: (f64, f64), origin: (f32, f32)) -> (f32, f32) {
        let size = f64::from(TILE_SIZE);
        (
            (tile.0 * size + self.offset_x as f64 + f64::from(origin.0)) as f32,
            (tile.1 * size + self.offset_y as f64 + f64::from(origin.1)) as f32,
        )
    }

    /// Screen position of a longitude/latitude, e.g. for a camera pin.
    pub fn lon_lat_to_screen(&self, lon: f64, lat: f64, origin: (f32, f32)) -> (f32, f32) {
        self.to_screen(self.project(lon, lat), origin)
    }
}

/// Smallest zoom whose grid covers a `width × height` window with one
/// spare tile per axis.
pub fn min_zoom_for(width: u32, height: u32, max_zoom_levels: u32) -> u32 {
    let tiles_x = width.div_ceil(TILE_SIZE) + 1;
    let tiles_y = height.div_ceil(TILE_SIZE) + 1;
    let needed = u64::from(tiles_x.max(tiles_y));

    let top = max_zoom_levels.saturating_sub(1);
    let mut zoom = 0;
    while zoom < top && (1u64 << zoom) < needed {
        zoom += 1;
    }
    zoom
}

/// Standard slippy-map projection at `zoom`.
pub fn project(lon: f64, lat: f64, zoom: u32) -> (f64, f64) {
    let stride = f64::from(1u32 << zoom.min(31));
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (lon + 180.0) / 360.0 * stride;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * stride;
    (x, y)
}
