//! Configuration file for tile layers.
//!
//! Settings are read from an INI file (default `<config dir>/maptile/config.ini`)
//! and converted into [`TileManagerConfig`](crate::cache::TileManagerConfig)
//! and [`LoaderConfig`](crate::loader::LoaderConfig).
//!
//! ```
//! use maptile::cache::TileManagerConfig;
//! use maptile::config::ConfigFile;
//!
//! let file = ConfigFile::default();
//! let config = TileManagerConfig::from(&file);
//! assert_eq!(config.cache_limit, file.cache.cache_limit);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CacheSettings, ConfigFile, LoaderSettings, LoggingSettings, RetrySettings, TileSettings,
};
