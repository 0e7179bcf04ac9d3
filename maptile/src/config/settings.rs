//! Settings structs, one per `[section]` of the INI file.

use std::path::PathBuf;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Tile request settings
    pub tiles: TileSettings,
    /// Cache size and eviction settings
    pub cache: CacheSettings,
    /// Loader thread settings
    pub loader: LoaderSettings,
    /// Failed tile retry settings
    pub retry: RetrySettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// `[tiles]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSettings {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Zoom levels the source provides; empty means every level.
    pub zoom_table: Option<Vec<u8>>,
    /// Tile edge in pixels
    pub tile_size: u32,
    /// Extra pixels scanned around the screen
    pub scan_margin: u32,
    /// Load the parent of every visible tile as well
    pub prefetch_parents: bool,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Tiles kept before the least recently visible are evicted
    pub cache_limit: usize,
    /// Tiles kept around the visible area
    pub keep_margin: u32,
    /// Loaded tiles waiting for upload before the farthest are dropped
    pub max_tiles_in_queue: usize,
    /// Uploads per rendered frame
    pub max_uploads_per_frame: usize,
}

/// `[loader]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    /// Loader threads; 0 picks from the available parallelism
    pub threads: usize,
    /// Milliseconds teardown waits for loaders to stop
    pub join_timeout_ms: u64,
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Seconds before a failed tile is requested again; `None` disables it
    pub cooldown_secs: Option<u64>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory the log file is written to
    pub directory: PathBuf,
    /// Log file name, truncated on every start
    pub file: String,
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
}
