//! Frame snapshots of the visible tiles.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::manager::CacheState;
use crate::coord::TileKey;
use crate::tile::Tile;

/// A visible column outside `[0, 2^zoom)` drawn with the tile from the
/// other side of the antimeridian.
#[derive(Debug, Clone)]
pub struct Placeholder {
    /// Unwrapped column, negative or `>= 2^zoom`.
    pub x: i64,
    pub y: u32,
    pub zoom: u8,
    pub tile: Arc<Tile>,
}

/// Which manager call last filled a tile set, and the serial it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fill {
    /// Every visible tile, at a visible set serial.
    Visible(u64),
    /// Ready visible tiles, at an upload serial.
    Ready(u64),
}

/// Locked tiles handed to the render thread.
///
/// Filled by [`super::TileManager::get_active_tiles`] or
/// [`super::TileManager::acquire_visible_tiles`]. Every tile in the set is
/// locked until the set is refilled, released, or dropped; dropping a set
/// releases its locks.
#[derive(Default)]
pub struct TileSet {
    pub(crate) tiles: Vec<Arc<Tile>>,
    pub(crate) placeholders: Vec<Placeholder>,
    pub(crate) filled: Option<Fill>,
    /// Cache epoch the locks belong to
    pub(crate) epoch: u64,
    pub(crate) owner: Option<Weak<Mutex<CacheState>>>,
}

impl TileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiles sorted by key.
    pub fn tiles(&self) -> &[Arc<Tile>] {
        &self.tiles
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Tile>> {
        self.tiles.iter()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Changes whenever the set of tiles it was filled from changes.
    pub fn serial(&self) -> u64 {
        match self.filled {
            Some(Fill::Visible(serial) | Fill::Ready(serial)) => serial,
            None => 0,
        }
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.tiles
            .binary_search_by(|t| t.key().cmp(key))
            .is_ok()
    }

    pub fn get(&self, key: &TileKey) -> Option<&Arc<Tile>> {
        self.tiles
            .binary_search_by(|t| t.key().cmp(key))
            .ok()
            .map(|i| &self.tiles[i])
    }

    /// Empties the set without touching locks.
    pub(crate) fn clear(&mut self) {
        self.tiles.clear();
        self.placeholders.clear();
        self.filled = None;
    }
}

impl std::fmt::Debug for TileSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSet")
            .field("tiles", &self.tiles.len())
            .field("placeholders", &self.placeholders.len())
            .field("filled", &self.filled)
            .finish()
    }
}

impl<'a> IntoIterator for &'a TileSet {
    type Item = &'a Arc<Tile>;
    type IntoIter = std::slice::Iter<'a, Arc<Tile>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tiles.iter()
    }
}

impl Drop for TileSet {
    fn drop(&mut self) {
        if self.tiles.is_empty() {
            return;
        }
        let Some(cache) = self.owner.take().and_then(|w| w.upgrade()) else {
            return;
        };
        let state = cache.lock();
        state.release_set(self);
    }
}
