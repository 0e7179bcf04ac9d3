//! INI serialization: `ConfigFile` to a commented INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let zoom_table = config
        .tiles
        .zoom_table
        .as_ref()
        .map(|table| {
            table
                .iter()
                .map(|z| z.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let cooldown = config
        .retry
        .cooldown_secs
        .map(|s| s.to_string())
        .unwrap_or_else(|| "never".to_string());

    format!(
        r#"[tiles]
; Zoom range tiles are requested for. Views below min_zoom show no tiles,
; views above max_zoom scale up max_zoom tiles.
min_zoom = {}
max_zoom = {}
; Zoom levels the source provides, comma separated (e.g. 2, 4, 8, 12).
; The view zoom snaps down to the nearest entry. Empty means every level.
zoom_table = {}
; Tile edge in pixels (default: 256)
tile_size = {}
; Extra pixels loaded around the screen edges (default: 128)
scan_margin = {}
; Also load the parent of every visible tile so zooming out has a fallback
; (ignored when zoom_table is set)
prefetch_parents = {}

[cache]
; Tiles kept in memory before the least recently visible are evicted (default: 250)
cache_limit = {}
; Tiles kept around the visible area when panning (default: 2)
keep_margin = {}
; Loaded tiles waiting for upload before the farthest are dropped (default: 40)
max_tiles_in_queue = {}
; Tiles uploaded to the renderer per frame (default: 4)
max_uploads_per_frame = {}

[loader]
; Background loader threads (default: 0 = available cores, between 2 and 4)
threads = {}
; Milliseconds teardown waits for loaders to stop (default: 2000)
join_timeout_ms = {}

[retry]
; Seconds before a failed tile is requested again, or 'never' to keep it
; failed until retried explicitly (default: never)
cooldown_secs = {}

[logging]
; Directory for the log file
directory = {}
; Log file name, cleared on every start
file = {}
; Log filter used when RUST_LOG is not set (error, warn, info, debug, trace)
level = {}
"#,
        config.tiles.min_zoom,
        config.tiles.max_zoom,
        zoom_table,
        config.tiles.tile_size,
        config.tiles.scan_margin,
        config.tiles.prefetch_parents,
        config.cache.cache_limit,
        config.cache.keep_margin,
        config.cache.max_tiles_in_queue,
        config.cache.max_uploads_per_frame,
        config.loader.threads,
        config.loader.join_timeout_ms,
        cooldown,
        path_to_string(&config.logging.directory),
        config.logging.file,
        config.logging.level,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
