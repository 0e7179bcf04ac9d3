//! Tile manager configuration.

use std::time::Duration;

use crate::coord::MAX_ZOOM;
use crate::viewport::DEFAULT_TILE_SIZE;

/// Default number of tiles kept in the cache.
pub const DEFAULT_CACHE_LIMIT: usize = 250;

/// Default cap on loaded tiles waiting for upload.
pub const DEFAULT_MAX_TILES_IN_QUEUE: usize = 40;

/// Default keep margin around the visible tiles, in tiles.
pub const DEFAULT_KEEP_MARGIN: u32 = 2;

/// Default maximum zoom level tiles are requested at.
pub const DEFAULT_MAX_ZOOM: u8 = 20;

/// Default number of uploads per frame in `prepare_tiles`.
pub const DEFAULT_MAX_UPLOADS_PER_FRAME: usize = 4;

/// Settings for a [`super::TileManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct TileManagerConfig {
    /// Lowest zoom level tiles are requested at.
    pub min_zoom: u8,
    /// Highest zoom level tiles are requested at; deeper views overzoom.
    pub max_zoom: u8,
    /// Zoom levels the source provides. The view zoom snaps down to the
    /// nearest entry; parent prefetch is disabled when set.
    pub zoom_table: Option<Vec<u8>>,
    /// Tiles kept before least recently visible tiles are evicted.
    pub cache_limit: usize,
    /// Tiles around the visible area kept by the per-update sweep.
    pub keep_margin: u32,
    /// Loaded tiles waiting for upload before the farthest are dropped.
    pub max_tiles_in_queue: usize,
    /// Uploads performed per frame by `prepare_tiles`.
    pub max_uploads_per_frame: usize,
    /// Also load the parent of every visible tile.
    pub prefetch_parents: bool,
    /// Failed tiles become loadable again after this long. `None` keeps
    /// them failed until `retry_failed`.
    pub retry_cooldown: Option<Duration>,
    /// Tile edge in pixels.
    pub tile_size: u32,
    /// Extra pixels scanned around the screen.
    pub scan_margin: f64,
}

impl TileManagerConfig {
    /// Effective tile zoom for a view zoom, or `None` if no tiles apply.
    pub fn tile_zoom(&self, zoom: u8) -> Option<u8> {
        if zoom < self.min_zoom {
            return None;
        }
        let zoom = zoom.clamp(self.min_zoom, self.max_zoom.min(MAX_ZOOM));
        match &self.zoom_table {
            Some(table) => table.iter().copied().filter(|&z| z <= zoom).max(),
            None => Some(zoom),
        }
    }

    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom.max(min_zoom);
        self
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = Some(cooldown);
        self
    }
}

impl Default for TileManagerConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: DEFAULT_MAX_ZOOM,
            zoom_table: None,
            cache_limit: DEFAULT_CACHE_LIMIT,
            keep_margin: DEFAULT_KEEP_MARGIN,
            max_tiles_in_queue: DEFAULT_MAX_TILES_IN_QUEUE,
            max_uploads_per_frame: DEFAULT_MAX_UPLOADS_PER_FRAME,
            prefetch_parents: false,
            retry_cooldown: None,
            tile_size: DEFAULT_TILE_SIZE,
            scan_margin: (DEFAULT_TILE_SIZE / 2) as f64,
        }
    }
}
