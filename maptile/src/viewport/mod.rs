//! Map viewport and visible tile computation.
//!
//! A [`Viewport`] is the plain value the control thread hands to the tile
//! manager on every map move. [`ScanBox`] turns the screen rectangle projected
//! onto the map into rows of visible tile columns.

mod scan_box;

pub use scan_box::ScanBox;

use crate::coord::{to_world_coords, CoordError, MAX_ZOOM};

/// Default edge length of a tile in screen pixels at integral zoom.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Current map view as seen by the control thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Map centre, normalized world x in `[0, 1)`
    pub x: f64,
    /// Map centre, normalized world y in `[0, 1)`
    pub y: f64,
    /// Map scale, `2^zoom` with fractional zoom allowed
    pub scale: f64,
    /// Screen width in pixels
    pub width: f64,
    /// Screen height in pixels
    pub height: f64,
    /// Clockwise rotation of the screen in degrees
    pub bearing: f64,
}

impl Viewport {
    /// Creates an unrotated viewport centred on normalized world coordinates.
    pub fn new(x: f64, y: f64, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            scale: 2f64.powf(zoom.clamp(0.0, MAX_ZOOM as f64)),
            width,
            height,
            bearing: 0.0,
        }
    }

    /// Creates a viewport centred on a geographic position.
    pub fn from_lat_lon(
        lat: f64,
        lon: f64,
        zoom: f64,
        width: f64,
        height: f64,
    ) -> Result<Self, CoordError> {
        let (x, y) = to_world_coords(lat, lon)?;
        Ok(Self::new(x, y, zoom, width, height))
    }

    /// Returns a copy rotated to `bearing` degrees.
    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = bearing;
        self
    }

    /// Integral zoom level the map is currently showing.
    #[inline]
    pub fn zoom_level(&self) -> u8 {
        if self.scale <= 1.0 {
            return 0;
        }
        (self.scale.log2().floor() as i64).clamp(0, MAX_ZOOM as i64) as u8
    }

    /// Corners of the screen box relative to the map centre, in pixels.
    ///
    /// Order is top-left, top-right, bottom-right, bottom-left as `x, y`
    /// pairs. `margin` grows the box on every side before rotation.
    pub fn map_extents(&self, margin: f64) -> [f64; 8] {
        let hw = self.width / 2.0 + margin;
        let hh = self.height / 2.0 + margin;
        let corners = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];

        let (sin, cos) = self.bearing.to_radians().sin_cos();
        let mut quad = [0.0; 8];
        for (i, (cx, cy)) in corners.into_iter().enumerate() {
            quad[i * 2] = cx * cos - cy * sin;
            quad[i * 2 + 1] = cx * sin + cy * cos;
        }
        quad
    }
}
