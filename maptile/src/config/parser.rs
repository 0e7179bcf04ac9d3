//! INI parsing: `Ini` to `ConfigFile`.
//!
//! The single place INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::defaults::{clamp_zoom, MAX_LOADER_THREADS, MAX_TILE_SIZE};
use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [tiles] section
    if let Some(section) = ini.section(Some("tiles")) {
        if let Some(v) = parse_number::<u8>(section, "tiles", "min_zoom", "must be a zoom level (0-30)")? {
            config.tiles.min_zoom = clamp_zoom(v);
        }
        if let Some(v) = parse_number::<u8>(section, "tiles", "max_zoom", "must be a zoom level (0-30)")? {
            config.tiles.max_zoom = clamp_zoom(v);
        }
        if let Some(v) = section.get("zoom_table") {
            config.tiles.zoom_table = parse_zoom_table(v)?;
        }
        if let Some(v) = parse_number::<u32>(section, "tiles", "tile_size", "must be a positive integer (pixels)")? {
            if v == 0 || v > MAX_TILE_SIZE {
                return Err(invalid(
                    "tiles",
                    "tile_size",
                    &v.to_string(),
                    &format!("must be between 1 and {}", MAX_TILE_SIZE),
                ));
            }
            config.tiles.tile_size = v;
        }
        if let Some(v) = parse_number::<u32>(section, "tiles", "scan_margin", "must be a non-negative integer (pixels)")? {
            config.tiles.scan_margin = v;
        }
        if let Some(v) = section.get("prefetch_parents") {
            config.tiles.prefetch_parents = parse_bool(v);
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = parse_number::<usize>(section, "cache", "cache_limit", "must be a positive integer (tiles)")? {
            if v == 0 {
                return Err(invalid("cache", "cache_limit", "0", "must be at least 1"));
            }
            config.cache.cache_limit = v;
        }
        if let Some(v) = parse_number(section, "cache", "keep_margin", "must be a non-negative integer (tiles)")? {
            config.cache.keep_margin = v;
        }
        if let Some(v) = parse_number(section, "cache", "max_tiles_in_queue", "must be a non-negative integer (tiles)")? {
            config.cache.max_tiles_in_queue = v;
        }
        if let Some(v) = parse_number::<usize>(section, "cache", "max_uploads_per_frame", "must be a positive integer")? {
            config.cache.max_uploads_per_frame = v.max(1);
        }
    }

    // [loader] section
    if let Some(section) = ini.section(Some("loader")) {
        if let Some(v) = parse_number::<usize>(section, "loader", "threads", "must be a non-negative integer (0 = auto)")? {
            if v > MAX_LOADER_THREADS {
                tracing::warn!(
                    requested = v,
                    max = MAX_LOADER_THREADS,
                    "loader threads above maximum, clamping to {}",
                    MAX_LOADER_THREADS
                );
            }
            config.loader.threads = v.min(MAX_LOADER_THREADS);
        }
        if let Some(v) = parse_number(section, "loader", "join_timeout_ms", "must be a non-negative integer (milliseconds)")? {
            config.loader.join_timeout_ms = v;
        }
    }

    // [retry] section
    if let Some(section) = ini.section(Some("retry")) {
        if let Some(v) = section.get("cooldown_secs") {
            let v = v.trim();
            config.retry.cooldown_secs = if v.is_empty() || v.eq_ignore_ascii_case("never") {
                None
            } else {
                Some(v.parse().map_err(|_| {
                    invalid(
                        "retry",
                        "cooldown_secs",
                        v,
                        "must be a non-negative integer (seconds) or 'never'",
                    )
                })?)
            };
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
        if let Some(v) = section.get("level") {
            let v = v.trim().to_lowercase();
            if !v.is_empty() {
                config.logging.level = v;
            }
        }
    }

    Ok(config)
}

fn parse_number<T: FromStr>(
    section: &Properties,
    name: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    match section.get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, key, v, reason)),
        None => Ok(None),
    }
}

/// Comma separated zoom levels, sorted and deduplicated. Empty clears it.
fn parse_zoom_table(value: &str) -> Result<Option<Vec<u8>>, ConfigFileError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let mut table = value
        .split(',')
        .map(|z| z.trim().parse::<u8>().map(clamp_zoom))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| {
            invalid(
                "tiles",
                "zoom_table",
                value,
                "expected comma separated zoom levels like '2, 4, 8, 12'",
            )
        })?;
    table.sort_unstable();
    table.dedup();
    Ok(Some(table))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a boolean value from config.
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_partial_config() {
        let config = load(
            r#"
[cache]
cache_limit = 500
"#,
        )
        .unwrap();

        assert_eq!(config.cache.cache_limit, 500);
        assert_eq!(config.cache.keep_margin, crate::cache::DEFAULT_KEEP_MARGIN);
        assert_eq!(config.tiles.scan_margin, DEFAULT_SCAN_MARGIN);
        assert!(config.retry.cooldown_secs.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = load(
            r#"
[tiles]
min_zoom = 2
max_zoom = 17
zoom_table = 12, 2, 8, 8
tile_size = 512
scan_margin = 0
prefetch_parents = yes

[loader]
threads = 3
join_timeout_ms = 500

[retry]
cooldown_secs = 15

[logging]
file = layer.log
level = DEBUG
"#,
        )
        .unwrap();

        assert_eq!(config.tiles.min_zoom, 2);
        assert_eq!(config.tiles.max_zoom, 17);
        assert_eq!(config.tiles.zoom_table, Some(vec![2, 8, 12]));
        assert_eq!(config.tiles.tile_size, 512);
        assert_eq!(config.tiles.scan_margin, 0);
        assert!(config.tiles.prefetch_parents);
        assert_eq!(config.loader.threads, 3);
        assert_eq!(config.loader.join_timeout_ms, 500);
        assert_eq!(config.retry.cooldown_secs, Some(15));
        assert_eq!(config.logging.file, "layer.log");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_number() {
        let err = load(
            r#"
[cache]
cache_limit = lots
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cache.cache_limit"));
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn test_zero_cache_limit_rejected() {
        assert!(load("[cache]\ncache_limit = 0\n").is_err());
    }

    #[test]
    fn test_invalid_zoom_table() {
        let err = load("[tiles]\nzoom_table = 4, x\n").unwrap_err();
        assert!(err.to_string().contains("zoom_table"));
    }

    #[test]
    fn test_retry_never() {
        let config = load("[retry]\ncooldown_secs = never\n").unwrap();
        assert!(config.retry.cooldown_secs.is_none());
    }

    #[test]
    fn test_thread_count_clamped() {
        let config = load("[loader]\nthreads = 1000\n").unwrap();
        assert_eq!(config.loader.threads, MAX_LOADER_THREADS);
    }

    #[test]
    fn test_oversized_tile_rejected() {
        assert!(load("[tiles]\ntile_size = 100000\n").is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/logs");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join("logs"));
        }
        assert_eq!(expand_tilde("/var/log"), PathBuf::from("/var/log"));
    }

    #[test]
    fn test_parse_bool_values() {
        for v in ["true", "1", "yes", "ON"] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["false", "0", "no", "off", ""] {
            assert!(!parse_bool(v), "{v}");
        }
    }
}
