//! Coordinate module
//!
//! Tile keys of the quad-tree pyramid and conversions from geographic
//! coordinates (latitude/longitude) into the normalized Web Mercator world
//! square used by the viewport and the tile manager.

mod types;


pub use types::{CoordError, TileKey, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM};

use std::f64::consts::PI;

/// Projects geographic coordinates into the unit world square.
///
/// `x` grows east from the antimeridian, `y` grows south from the northern
/// Mercator limit. Both are in `[0, 1)` for valid input.
#[inline]
pub fn to_world_coords(lat: f64, lon: f64) -> Result<(f64, f64), CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }

    let x = (lon + 180.0) / 360.0;
    let lat_rad = lat * PI / 180.0;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0;

    // lon == 180.0 lands exactly on the wrap point
    Ok((x.min(1.0 - f64::EPSILON), y.clamp(0.0, 1.0 - f64::EPSILON)))
}

/// Converts geographic coordinates to the key of the containing tile.
#[inline]
pub fn to_tile_key(lat: f64, lon: f64, zoom: u8) -> Result<TileKey, CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }
    let (x, y) = to_world_coords(lat, lon)?;
    let n = TileKey::tiles_at_zoom(zoom) as f64;
    TileKey::new((x * n) as u32, (y * n) as u32, zoom)
}

/// Converts a tile key back to the latitude/longitude of its north-west corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileKey) -> (f64, f64) {
    let (x, y) = tile.world_origin();
    let lon = x * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    (lat_rad * 180.0 / PI, lon)
}
