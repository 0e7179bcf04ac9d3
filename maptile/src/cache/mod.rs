//! Tile cache: the key to tile arena, proxy locking, the tile manager and
//! the tile sets it hands to the render thread.

mod config;
mod eviction;
mod index;
mod manager;
mod stats;
mod tileset;

pub use config::{
    TileManagerConfig, DEFAULT_CACHE_LIMIT, DEFAULT_KEEP_MARGIN, DEFAULT_MAX_TILES_IN_QUEUE,
    DEFAULT_MAX_UPLOADS_PER_FRAME, DEFAULT_MAX_ZOOM,
};
pub use manager::TileManager;
pub use stats::CacheStats;
pub use tileset::{Placeholder, TileSet};
