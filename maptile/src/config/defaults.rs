//! Default values for all configuration settings.

use std::path::PathBuf;
use std::time::Duration;

use super::file::config_directory;
use super::settings::*;
use crate::cache::{
    TileManagerConfig, DEFAULT_CACHE_LIMIT, DEFAULT_KEEP_MARGIN, DEFAULT_MAX_TILES_IN_QUEUE,
    DEFAULT_MAX_UPLOADS_PER_FRAME, DEFAULT_MAX_ZOOM,
};
use crate::coord::MAX_ZOOM;
use crate::loader::{default_threads, LoaderConfig, DEFAULT_JOIN_TIMEOUT};
use crate::viewport::DEFAULT_TILE_SIZE;

/// Default extra pixels scanned around the screen.
pub const DEFAULT_SCAN_MARGIN: u32 = DEFAULT_TILE_SIZE / 2;

/// Largest accepted tile edge in pixels.
pub const MAX_TILE_SIZE: u32 = 4096;

/// Largest accepted loader thread count.
pub const MAX_LOADER_THREADS: usize = 64;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "maptile.log";

/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory, next to the config file.
pub fn default_log_dir() -> PathBuf {
    config_directory().join("logs")
}

/// Clamps a zoom level read from the file into the supported range.
pub(super) fn clamp_zoom(value: u8) -> u8 {
    if value > MAX_ZOOM {
        tracing::warn!(
            requested = value,
            max = MAX_ZOOM,
            "zoom level above maximum, clamping to {}",
            MAX_ZOOM
        );
        return MAX_ZOOM;
    }
    value
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            tiles: TileSettings {
                min_zoom: 0,
                max_zoom: DEFAULT_MAX_ZOOM,
                zoom_table: None,
                tile_size: DEFAULT_TILE_SIZE,
                scan_margin: DEFAULT_SCAN_MARGIN,
                prefetch_parents: false,
            },
            cache: CacheSettings {
                cache_limit: DEFAULT_CACHE_LIMIT,
                keep_margin: DEFAULT_KEEP_MARGIN,
                max_tiles_in_queue: DEFAULT_MAX_TILES_IN_QUEUE,
                max_uploads_per_frame: DEFAULT_MAX_UPLOADS_PER_FRAME,
            },
            loader: LoaderSettings {
                threads: 0,
                join_timeout_ms: DEFAULT_JOIN_TIMEOUT.as_millis() as u64,
            },
            retry: RetrySettings {
                cooldown_secs: None,
            },
            logging: LoggingSettings {
                directory: default_log_dir(),
                file: DEFAULT_LOG_FILE.to_string(),
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}

impl From<&ConfigFile> for TileManagerConfig {
    fn from(file: &ConfigFile) -> Self {
        let tiles = &file.tiles;
        let cache = &file.cache;
        TileManagerConfig {
            zoom_table: tiles.zoom_table.clone(),
            cache_limit: cache.cache_limit,
            keep_margin: cache.keep_margin,
            max_tiles_in_queue: cache.max_tiles_in_queue,
            max_uploads_per_frame: cache.max_uploads_per_frame,
            prefetch_parents: tiles.prefetch_parents,
            retry_cooldown: file.retry.cooldown_secs.map(Duration::from_secs),
            tile_size: tiles.tile_size,
            scan_margin: f64::from(tiles.scan_margin),
            ..TileManagerConfig::default()
        }
        .with_zoom_range(tiles.min_zoom, tiles.max_zoom)
    }
}

impl From<&ConfigFile> for LoaderConfig {
    fn from(file: &ConfigFile) -> Self {
        let threads = match file.loader.threads {
            0 => default_threads(),
            n => n,
        };
        LoaderConfig {
            join_timeout: Duration::from_millis(file.loader.join_timeout_ms),
            ..LoaderConfig::default()
        }
        .with_threads(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let file = ConfigFile::default();
        assert_eq!(TileManagerConfig::from(&file), TileManagerConfig::default());

        let loader = LoaderConfig::from(&file);
        assert_eq!(loader, LoaderConfig::default());
    }

    #[test]
    fn test_retry_cooldown_conversion() {
        let mut file = ConfigFile::default();
        file.retry.cooldown_secs = Some(30);
        let config = TileManagerConfig::from(&file);
        assert_eq!(config.retry_cooldown, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_explicit_thread_count() {
        let mut file = ConfigFile::default();
        file.loader.threads = 7;
        file.loader.join_timeout_ms = 250;
        let loader = LoaderConfig::from(&file);
        assert_eq!(loader.threads, 7);
        assert_eq!(loader.join_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_inverted_zoom_range_is_fixed() {
        let mut file = ConfigFile::default();
        file.tiles.min_zoom = 12;
        file.tiles.max_zoom = 8;
        let config = TileManagerConfig::from(&file);
        assert_eq!(config.min_zoom, 12);
        assert_eq!(config.max_zoom, 12);
    }

    #[test]
    fn test_clamp_zoom() {
        assert_eq!(clamp_zoom(10), 10);
        assert_eq!(clamp_zoom(200), MAX_ZOOM);
    }
}
