//! Arena of cached tiles keyed by [`TileKey`].
//!
//! Quad-tree relatives are not stored; they are looked up by key
//! arithmetic, so removing a tile is a plain map removal. Absence of a key
//! means the tile is not cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::coord::TileKey;
use crate::tile::{Proxy, ProxyMask, Tile, TileState};

#[derive(Debug)]
pub(crate) struct TileEntry {
    pub tile: Arc<Tile>,
    /// Update generation in which the tile was last in the visible set.
    pub last_visible: u64,
    /// When the tile was last seen failed, for retry cooldown.
    pub failed_at: Option<Instant>,
    /// Kept only until its in-flight load finishes.
    pub detached: bool,
}

#[derive(Debug, Default)]
pub(crate) struct TileIndex {
    entries: HashMap<TileKey, TileEntry>,
}

impl TileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &TileKey) -> Option<&Arc<Tile>> {
        self.entries.get(key).map(|e| &e.tile)
    }

    pub fn entry_mut(&mut self, key: &TileKey) -> Option<&mut TileEntry> {
        self.entries.get_mut(key)
    }

    /// True if `tile` is the instance cached under its key.
    pub fn holds(&self, tile: &Arc<Tile>) -> bool {
        self.get(&tile.key())
            .is_some_and(|cached| Arc::ptr_eq(cached, tile))
    }

    /// True if `tile` is cached but was released while loading.
    pub fn is_detached(&self, tile: &Arc<Tile>) -> bool {
        self.entries
            .get(&tile.key())
            .is_some_and(|e| e.detached && Arc::ptr_eq(&e.tile, tile))
    }

    pub fn insert(&mut self, entry: TileEntry) {
        self.entries.insert(entry.tile.key(), entry);
    }

    /// Returns the cached tile for `key`, creating it if needed.
    pub fn get_or_insert(&mut self, key: TileKey, generation: u64) -> (Arc<Tile>, bool) {
        let mut created = false;
        let entry = self.entries.entry(key).or_insert_with(|| {
            created = true;
            TileEntry {
                tile: Arc::new(Tile::new(key)),
                last_visible: generation,
                failed_at: None,
                detached: false,
            }
        });
        (Arc::clone(&entry.tile), created)
    }

    pub fn remove(&mut self, key: &TileKey) -> Option<TileEntry> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TileEntry> {
        self.entries.values_mut()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = TileEntry> + '_ {
        self.entries.drain().map(|(_, e)| e)
    }

    pub fn relative_key(key: TileKey, proxy: Proxy) -> Option<TileKey> {
        match proxy {
            Proxy::Parent => key.parent(),
            Proxy::Grandparent => key.grandparent(),
            Proxy::Child(i) => key.child(i),
        }
    }

    /// Cached relative of `tile`, if any.
    pub fn relative(&self, tile: &Tile, proxy: Proxy) -> Option<&Arc<Tile>> {
        Self::relative_key(tile.key(), proxy).and_then(|k| self.get(&k))
    }

    /// Locks `tile` and, on its first lock, pins every cached relative that
    /// is not in [`TileState::None`].
    pub fn lock(&self, tile: &Tile) {
        if tile.inc_lock() > 1 {
            return;
        }
        let mut pinned = ProxyMask::empty();
        for proxy in Proxy::ALL {
            let Some(relative) = self.relative(tile, proxy) else {
                continue;
            };
            if relative.state() == TileState::None {
                continue;
            }
            relative.inc_ref();
            pinned |= proxy.mask();
        }
        if !pinned.is_empty() {
            tile.add_proxy(pinned);
        }
    }

    /// Unlocks `tile`; the last unlock releases its pinned relatives.
    ///
    /// Unlocking a tile that is not locked is logged and ignored.
    pub fn unlock(&self, tile: &Tile) {
        match tile.dec_lock() {
            None => {
                tracing::warn!(tile = %tile.key(), "Unlock of tile that is not locked");
            }
            Some(0) => self.release_proxies(tile),
            Some(_) => {}
        }
    }

    fn release_proxies(&self, tile: &Tile) {
        let pinned = tile.take_proxies();
        if pinned.is_empty() {
            return;
        }
        for proxy in Proxy::ALL {
            if !pinned.contains(proxy.mask()) {
                continue;
            }
            match self.relative(tile, proxy) {
                Some(relative) => {
                    if relative.dec_ref().is_none() {
                        tracing::error!(tile = %tile.key(), proxy = %relative.key(), "Proxy reference count underflow");
                    }
                }
                None => {
                    tracing::error!(tile = %tile.key(), proxy = ?proxy, "Pinned proxy missing from cache");
                }
            }
        }
    }
}
