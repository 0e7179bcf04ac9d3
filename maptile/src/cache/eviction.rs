//! Keep region and tile distance used for eviction and job priority.

use crate::coord::{TileKey, MAX_ZOOM};

/// Zoom levels above the current one kept by the sweep (grandparent).
const KEEP_ZOOM_ABOVE: u8 = 2;
/// Zoom levels below the current one kept by the sweep (children).
const KEEP_ZOOM_BELOW: u8 = 1;

/// Area around the visible tiles whose tiles survive the per-update sweep.
///
/// Stored in normalized world coordinates so tiles of any zoom level can be
/// tested. The x range may extend past `[0, 1)` when the view crosses the
/// antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct KeepRegion {
    zoom: u8,
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
}

impl KeepRegion {
    /// Region covering unwrapped columns `cols` and rows `rows` (both
    /// inclusive) at `zoom`, grown by `margin` tiles.
    pub fn new(zoom: u8, cols: (i64, i64), rows: (i64, i64), margin: u32) -> Self {
        let n = (1u64 << zoom) as f64;
        let m = margin as f64;
        Self {
            zoom,
            x0: (cols.0 as f64 - m) / n,
            x1: (cols.1 as f64 + 1.0 + m) / n,
            y0: (rows.0 as f64 - m) / n,
            y1: (rows.1 as f64 + 1.0 + m) / n,
        }
    }

    pub fn contains(&self, key: TileKey) -> bool {
        if key.zoom.saturating_add(KEEP_ZOOM_ABOVE) < self.zoom
            || key.zoom > self.zoom.saturating_add(KEEP_ZOOM_BELOW)
        {
            return false;
        }
        let n = (1u64 << key.zoom) as f64;
        let tx0 = key.x as f64 / n;
        let tx1 = (key.x as f64 + 1.0) / n;
        let ty0 = key.y as f64 / n;
        let ty1 = (key.y as f64 + 1.0) / n;

        if ty1 <= self.y0 || ty0 >= self.y1 {
            return false;
        }
        [-1.0, 0.0, 1.0]
            .iter()
            .any(|shift| tx1 + shift > self.x0 && tx0 + shift < self.x1)
    }
}

/// Priority distance of `key` from the view centre `(x, y)` at `view_zoom`.
///
/// Squared tile offset at the tile's own zoom, scaled by the squared zoom
/// difference so tiles of the current level come first, then parents, then
/// deeper children. Column offsets wrap around the antimeridian.
pub(crate) fn tile_distance(key: TileKey, x: f64, y: f64, view_zoom: u8) -> f32 {
    if key.zoom > MAX_ZOOM {
        return f32::MAX;
    }
    let n = 1i64 << key.zoom;
    let cx = ((x * n as f64).floor() as i64).clamp(0, n - 1);
    let cy = ((y * n as f64).floor() as i64).clamp(0, n - 1);

    let mut dx = (key.x as i64 - cx).abs();
    dx = dx.min(n - dx);
    let dy = key.y as i64 - cy;

    let dz = match view_zoom as i32 - key.zoom as i32 {
        0 => 1.0,
        d if d < -1 => d as f64 * 0.75,
        d => d as f64,
    };

    ((dx * dx + dy * dy) as f64 * dz * dz) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: u32, y: u32, zoom: u8) -> TileKey {
        TileKey::new(x, y, zoom).unwrap()
    }

    #[test]
    fn test_region_contains_margin_tiles() {
        let region = KeepRegion::new(10, (499, 501), (499, 501), 2);
        assert!(region.contains(key(500, 500, 10)));
        assert!(region.contains(key(497, 503, 10)));
        assert!(!region.contains(key(496, 500, 10)));
        assert!(!region.contains(key(500, 504, 10)));
    }

    #[test]
    fn test_region_keeps_relatives_of_visible_tiles() {
        let region = KeepRegion::new(10, (499, 501), (499, 501), 0);
        assert!(region.contains(key(250, 250, 9)));
        assert!(region.contains(key(125, 125, 8)));
        assert!(region.contains(key(1000, 1000, 11)));
        // too far up or down the pyramid
        assert!(!region.contains(key(62, 62, 7)));
        assert!(!region.contains(key(2000, 2000, 12)));
    }

    #[test]
    fn test_region_wraps_antimeridian() {
        // columns -1..=0 at zoom 3
        let region = KeepRegion::new(3, (-1, 0), (3, 4), 0);
        assert!(region.contains(key(7, 3, 3)));
        assert!(region.contains(key(0, 4, 3)));
        assert!(!region.contains(key(3, 3, 3)));
    }

    #[test]
    fn test_distance_orders_by_offset() {
        let (x, y) = (500.5 / 1024.0, 500.5 / 1024.0);
        let centre = tile_distance(key(500, 500, 10), x, y, 10);
        let near = tile_distance(key(501, 500, 10), x, y, 10);
        let far = tile_distance(key(503, 502, 10), x, y, 10);
        assert_eq!(centre, 0.0);
        assert_eq!(near, 1.0);
        assert!(far > near);
    }

    #[test]
    fn test_distance_penalizes_zoom_difference() {
        let (x, y) = (500.5 / 1024.0, 500.5 / 1024.0);
        let same = tile_distance(key(501, 500, 10), x, y, 10);
        let grand = tile_distance(key(126, 125, 8), x, y, 10);
        assert_eq!(same, 1.0);
        assert_eq!(grand, 4.0);
    }

    #[test]
    fn test_key_beyond_max_zoom_is_farthest() {
        let bogus = TileKey { x: 0, y: 0, zoom: 70 };
        assert_eq!(tile_distance(bogus, 0.5, 0.5, 10), f32::MAX);

        let region = KeepRegion::new(10, (499, 501), (499, 501), 2);
        assert!(!region.contains(bogus));
        assert!(!region.contains(TileKey { x: 0, y: 0, zoom: 255 }));
    }

    #[test]
    fn test_distance_wraps_columns() {
        let d = tile_distance(key(7, 4, 3), 0.01, 0.5, 3);
        assert_eq!(d, 1.0);
    }
}
