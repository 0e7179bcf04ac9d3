//! Coordinate type definitions

use std::fmt;
use thiserror::Error;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Zoom range addressable with `u32` tile columns and rows.
pub const MIN_ZOOM: u8 = 0;
pub const MAX_ZOOM: u8 = 30;

/// Identifies one tile of the quad-tree pyramid.
///
/// Equality and hashing are structural. Keys from [`TileKey::new`] or from
/// relative arithmetic on such a key have `zoom <= MAX_ZOOM`, `x < 2^zoom`
/// and `y < 2^zoom`. The fields are public, so a struct literal can break
/// that; cache code treats keys above [`MAX_ZOOM`] as infinitely far away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Zoom level, 0 is the whole world in one tile
    pub zoom: u8,
    /// Y coordinate (north-south), 0 at north
    pub y: u32,
    /// X coordinate (east-west), 0 at west
    pub x: u32,
}

impl TileKey {
    /// Creates a key, rejecting zoom levels above [`MAX_ZOOM`] and
    /// coordinates outside the tile grid of `zoom`.
    pub fn new(x: u32, y: u32, zoom: u8) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let n = Self::tiles_at_zoom(zoom);
        if u64::from(x) >= n || u64::from(y) >= n {
            return Err(CoordError::OutOfRange { x, y, zoom });
        }
        Ok(Self { x, y, zoom })
    }

    /// Number of tiles along one axis at `zoom`.
    #[inline]
    pub fn tiles_at_zoom(zoom: u8) -> u64 {
        1u64 << zoom
    }

    /// The tile one level up that contains this tile.
    #[inline]
    pub fn parent(&self) -> Option<TileKey> {
        if self.zoom == MIN_ZOOM {
            return None;
        }
        Some(TileKey {
            x: self.x >> 1,
            y: self.y >> 1,
            zoom: self.zoom - 1,
        })
    }

    /// The tile two levels up that contains this tile.
    #[inline]
    pub fn grandparent(&self) -> Option<TileKey> {
        self.parent().and_then(|p| p.parent())
    }

    /// One of the four tiles one level down.
    ///
    /// Bit 0 of `index` selects the east half, bit 1 the south half, so the
    /// order is NW, NE, SW, SE.
    #[inline]
    pub fn child(&self, index: usize) -> Option<TileKey> {
        if index > 3 || self.zoom >= MAX_ZOOM {
            return None;
        }
        Some(TileKey {
            x: (self.x << 1) | (index as u32 & 1),
            y: (self.y << 1) | ((index as u32 >> 1) & 1),
            zoom: self.zoom + 1,
        })
    }

    /// All four children in [`TileKey::child`] order.
    pub fn children(&self) -> impl Iterator<Item = TileKey> + '_ {
        (0..4).filter_map(move |i| self.child(i))
    }

    /// Index of this tile within its parent, inverse of [`TileKey::child`].
    #[inline]
    pub fn child_index(&self) -> usize {
        ((self.x & 1) | ((self.y & 1) << 1)) as usize
    }

    /// North-west corner of the tile in normalized world coordinates.
    #[inline]
    pub fn world_origin(&self) -> (f64, f64) {
        let n = Self::tiles_at_zoom(self.zoom) as f64;
        (self.x as f64 / n, self.y as f64 / n)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude is outside valid range (-85.05112878 to 85.05112878)
    #[error("Invalid latitude: {0} (must be between {min} and {max})", min = MIN_LAT, max = MAX_LAT)]
    InvalidLatitude(f64),
    /// Longitude is outside valid range (-180.0 to 180.0)
    #[error("Invalid longitude: {0} (must be between {min} and {max})", min = MIN_LON, max = MAX_LON)]
    InvalidLongitude(f64),
    /// Zoom level is outside valid range
    #[error("Invalid zoom level: {0} (must be between {min} and {max})", min = MIN_ZOOM, max = MAX_ZOOM)]
    InvalidZoom(u8),
    /// Tile column or row does not exist at this zoom level
    #[error("Tile {x}/{y} does not exist at zoom {zoom}")]
    OutOfRange { x: u32, y: u32, zoom: u8 },
}
