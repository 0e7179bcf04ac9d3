//! maptile - Tile lifecycle and caching for tiled map renderers
//!
//! This library decides which map tiles a viewport needs, loads them on
//! background threads, and hands them to the render thread without ever
//! freeing a tile that is still on screen or standing in for one.
//!
//! # High-Level API
//!
//! The [`layer`] module ties the pieces together:
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use maptile::cache::TileSet;
//! use maptile::layer::TileLayer;
//! use maptile::config::ConfigFile;
//! use maptile::events::TracingEventSink;
//! use maptile::viewport::Viewport;
//!
//! let config = ConfigFile::load()?;
//! let layer = TileLayer::from_config(&config, Arc::new(my_source), Arc::new(TracingEventSink))?;
//!
//! // control thread, on every map move
//! layer.update(&Viewport::from_lat_lon(52.52, 13.40, 12.0, 1280.0, 720.0)?)?;
//!
//! // render thread, once per frame
//! let mut tiles = TileSet::new();
//! layer.manager().get_active_tiles(&mut tiles);
//! layer.manager().prepare_tiles(&tiles, 4);
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod events;
pub mod jobs;
pub mod layer;
pub mod loader;
pub mod logging;
pub mod tile;
pub mod viewport;

/// Version of the maptile library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
