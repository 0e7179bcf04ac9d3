//! Tile manager: visible set computation, job submission, eviction and the
//! render thread hand-off.
//!
//! The key to tile map, the lock counts and the current visible set live in
//! one [`CacheState`] behind a cache-wide mutex. The control thread takes it
//! in [`TileManager::update`], loader threads in the completion callbacks
//! and the render thread when it refreshes a [`TileSet`]. Decoding and GPU
//! uploads never run under it, and the job queue has its own lock that is
//! never taken while the cache lock is held.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::config::TileManagerConfig;
use super::eviction::{tile_distance, KeepRegion};
use super::index::{TileEntry, TileIndex};
use super::stats::{CacheStats, Counters};
use super::tileset::{Fill, Placeholder, TileSet};
use crate::coord::TileKey;
use crate::events::{TileEvent, TileEventSink};
use crate::jobs::{Job, JobQueue};
use crate::loader::{JobCompletion, LoadError};
use crate::tile::{Proxy, Tile, TileState};
use crate::viewport::{ScanBox, Viewport};

/// Zoom levels below the minimum at which the visible set is released.
const RELEASE_BELOW_MIN_ZOOM: u16 = 4;

/// State guarded by the cache-wide lock.
#[derive(Debug, Default)]
pub(crate) struct CacheState {
    pub index: TileIndex,
    /// Visible tiles, locked on behalf of the manager.
    pub current: TileSet,
    /// Bumped whenever `current` changes.
    pub serial: u64,
    /// Bumped once per update.
    pub generation: u64,
    /// Bumped when every tile is released; older tile sets hold no locks.
    pub epoch: u64,
}

impl CacheState {
    /// Unlocks the tiles of `set` and empties it.
    pub fn release_set(&self, set: &mut TileSet) {
        if set.epoch == self.epoch {
            for tile in &set.tiles {
                self.index.unlock(tile);
            }
        }
        set.clear();
    }

    fn lock_all(&self, tiles: &[Arc<Tile>]) {
        for tile in tiles {
            self.index.lock(tile);
        }
    }
}

/// Result of scanning the viewport.
struct ScanResult {
    changed: bool,
    loads: Vec<Arc<Tile>>,
    region: KeepRegion,
}

/// Owner of every cached tile of a layer.
pub struct TileManager {
    config: TileManagerConfig,
    cache: Arc<Mutex<CacheState>>,
    jobs: Arc<JobQueue>,
    events: Arc<dyn TileEventSink>,
    scan_box: ScanBox,
    counters: Counters,
    /// Bumped on visible set changes and uploads.
    upload_serial: AtomicU64,
    redraw: AtomicBool,
}

impl TileManager {
    pub fn new(
        config: TileManagerConfig,
        jobs: Arc<JobQueue>,
        events: Arc<dyn TileEventSink>,
    ) -> Self {
        let scan_box = ScanBox::new(config.tile_size);
        Self {
            config,
            cache: Arc::new(Mutex::new(CacheState::default())),
            jobs,
            events,
            scan_box,
            counters: Counters::default(),
            upload_serial: AtomicU64::new(0),
            redraw: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TileManagerConfig {
        &self.config
    }

    /// Queue loaders of this manager poll.
    pub fn jobs(&self) -> &Arc<JobQueue> {
        &self.jobs
    }

    /// Recomputes the visible tiles for `viewport` and queues missing ones.
    ///
    /// Called by the control thread on every map move. Returns `true` when
    /// jobs were queued and loaders should be woken.
    pub fn update(&self, viewport: &Viewport) -> bool {
        // loaders must not pick up stale jobs while the new batch is built
        self.jobs.clear();

        let view_zoom = viewport.zoom_level();
        let Some(tile_zoom) = self.config.tile_zoom(view_zoom) else {
            if u16::from(view_zoom) + RELEASE_BELOW_MIN_ZOOM < u16::from(self.config.min_zoom) {
                self.release_current();
            }
            return false;
        };

        let quad = viewport.map_extents(self.config.scan_margin);
        let mut spans = Vec::new();
        self.scan_box.scan(
            viewport.x,
            viewport.y,
            viewport.scale,
            tile_zoom,
            &quad,
            |row, x1, x2| spans.push((row, x1, x2)),
        );

        let Some(scan) = self.apply_scan(viewport, tile_zoom, &spans) else {
            return false;
        };

        if scan.changed {
            self.upload_serial.fetch_add(1, Ordering::AcqRel);
            self.request_redraw();
        }

        let queued = if scan.loads.is_empty() {
            0
        } else {
            self.jobs.set_jobs(&scan.loads)
        };

        {
            let mut cache = self.cache.lock();
            self.limit_cache(&mut cache, &scan.region);
        }

        tracing::debug!(
            zoom = tile_zoom,
            spans = spans.len(),
            queued = queued,
            changed = scan.changed,
            "Tile update"
        );
        queued > 0
    }

    /// Builds the new visible set from scanned spans and swaps it in.
    fn apply_scan(
        &self,
        viewport: &Viewport,
        zoom: u8,
        spans: &[(i64, i64, i64)],
    ) -> Option<ScanResult> {
        let n = 1i64 << zoom;
        let now = Instant::now();

        let mut cache = self.cache.lock();
        let state = &mut *cache;
        state.generation += 1;
        let generation = state.generation;

        let mut next = TileSet::new();
        let mut seen = HashSet::new();
        let mut seen_placeholders = HashSet::new();
        let mut loads = Vec::new();
        let (mut col_min, mut col_max) = (i64::MAX, i64::MIN);
        let (mut row_min, mut row_max) = (i64::MAX, i64::MIN);

        for &(row, x1, x2) in spans {
            for col in x1..x2 {
                // more than one world away
                if col < -n || col >= 2 * n {
                    continue;
                }
                let wrapped = col.rem_euclid(n);
                let Ok(key) = TileKey::new(wrapped as u32, row as u32, zoom) else {
                    continue;
                };

                col_min = col_min.min(col);
                col_max = col_max.max(col);
                row_min = row_min.min(row);
                row_max = row_max.max(row);

                let tile = if seen.insert(key) {
                    let tile = self.touch(state, key, generation, now);
                    if tile.state() == TileState::None {
                        loads.push(Arc::clone(&tile));
                    }
                    next.tiles.push(Arc::clone(&tile));
                    tile
                } else if col != wrapped {
                    match state.index.get(&key) {
                        Some(tile) => Arc::clone(tile),
                        None => continue,
                    }
                } else {
                    continue;
                };

                if col != wrapped && seen_placeholders.insert((col, row)) {
                    next.placeholders.push(Placeholder {
                        x: col,
                        y: row as u32,
                        zoom,
                        tile,
                    });
                }
            }
        }

        if next.tiles.is_empty() {
            return None;
        }

        if self.config.prefetch_parents && self.config.zoom_table.is_none() && zoom > self.config.min_zoom {
            let parents: HashSet<TileKey> = next.tiles.iter().filter_map(|t| t.key().parent()).collect();
            for key in parents {
                let tile = self.touch(state, key, generation, now);
                if tile.state() == TileState::None {
                    loads.push(tile);
                }
            }
        }

        next.tiles.sort_by_key(|t| t.key());
        next.placeholders.sort_by_key(|p| (p.y, p.x));

        let changed = next.tiles.len() != state.current.tiles.len()
            || next
                .tiles
                .iter()
                .zip(&state.current.tiles)
                .any(|(a, b)| !Arc::ptr_eq(a, b))
            || next
                .placeholders
                .iter()
                .map(|p| (p.x, p.y))
                .ne(state.current.placeholders.iter().map(|p| (p.x, p.y)));

        if changed {
            state.lock_all(&next.tiles);
            let mut previous = std::mem::replace(&mut state.current, next);
            state.release_set(&mut previous);
            state.current.epoch = state.epoch;
            state.serial += 1;
        }

        let view_zoom = viewport.zoom_level();
        for entry in state.index.iter() {
            let d = tile_distance(entry.tile.key(), viewport.x, viewport.y, view_zoom);
            entry.tile.set_distance(d);
        }

        let region = KeepRegion::new(
            zoom,
            (col_min, col_max),
            (row_min, row_max),
            self.config.keep_margin,
        );

        Some(ScanResult {
            changed,
            loads,
            region,
        })
    }

    /// Returns the tile for `key`, creating it and marking it visible.
    ///
    /// Failed tiles whose cooldown has passed go back to
    /// [`TileState::None`].
    fn touch(&self, state: &mut CacheState, key: TileKey, generation: u64, now: Instant) -> Arc<Tile> {
        let (tile, created) = state.index.get_or_insert(key, generation);
        if created {
            Counters::bump(&self.counters.tiles_created);
        }
        if let Some(entry) = state.index.entry_mut(&key) {
            entry.last_visible = generation;
            entry.detached = false;
            self.retry_if_due(entry, now);
        }
        tile
    }

    fn retry_if_due(&self, entry: &mut TileEntry, now: Instant) {
        let Some(cooldown) = self.config.retry_cooldown else {
            return;
        };
        let due = entry
            .failed_at
            .is_some_and(|at| now.saturating_duration_since(at) >= cooldown);
        if due && entry.tile.try_transition(TileState::Error, TileState::None) {
            entry.failed_at = None;
            tracing::debug!(tile = %entry.tile.key(), "Retrying failed tile");
        }
    }

    /// Evicts tiles the view no longer needs.
    ///
    /// Never removes a locked, referenced or loading tile.
    fn limit_cache(&self, state: &mut CacheState, region: &KeepRegion) {
        // tiles outside the keep region
        let outside: Vec<TileKey> = state
            .index
            .iter()
            .filter(|e| e.tile.is_evictable() && !region.contains(e.tile.key()))
            .map(|e| e.tile.key())
            .collect();
        for key in &outside {
            self.evict(state, key);
        }

        // least recently visible, farthest first on ties
        let excess = state.index.len().saturating_sub(self.config.cache_limit);
        if excess > 0 {
            let mut candidates: Vec<(u64, f32, TileKey)> = state
                .index
                .iter()
                .filter(|e| e.tile.is_evictable())
                .map(|e| (e.last_visible, e.tile.distance(), e.tile.key()))
                .collect();
            candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.total_cmp(&a.1)));
            for (_, _, key) in candidates.iter().take(excess) {
                self.evict(state, key);
            }
            if state.index.len() > self.config.cache_limit {
                tracing::debug!(
                    tiles = state.index.len(),
                    limit = self.config.cache_limit,
                    "Cache over limit, remaining tiles in use"
                );
            }
        }

        // loaded tiles nobody uploads
        let mut new_data: Vec<(f32, TileKey)> = state
            .index
            .iter()
            .filter(|e| e.tile.state() == TileState::NewData)
            .map(|e| (e.tile.distance(), e.tile.key()))
            .collect();
        if new_data.len() > self.config.max_tiles_in_queue {
            let mut over = new_data.len() - self.config.max_tiles_in_queue;
            new_data.sort_by(|a, b| b.0.total_cmp(&a.0));
            for (_, key) in &new_data {
                if over == 0 {
                    break;
                }
                let evictable = state.index.get(key).is_some_and(|t| t.is_evictable());
                if evictable {
                    self.evict(state, key);
                    over -= 1;
                }
            }
        }

        if !outside.is_empty() || excess > 0 {
            tracing::trace!(
                swept = outside.len(),
                tiles = state.index.len(),
                "Cache limited"
            );
        }
    }

    fn evict(&self, state: &mut CacheState, key: &TileKey) {
        let Some(entry) = state.index.remove(key) else {
            return;
        };
        let tile = entry.tile;
        let previous = tile.state();
        if previous != TileState::None {
            tile.try_transition(previous, TileState::None);
        }
        tile.clear_payload();
        Counters::bump(&self.counters.tiles_evicted);
        self.events.emit(TileEvent::TileRemoved {
            key: *key,
            state: previous,
        });
    }

    fn release_current(&self) {
        let mut cache = self.cache.lock();
        if cache.current.is_empty() {
            return;
        }
        let state = &mut *cache;
        let mut previous = std::mem::take(&mut state.current);
        state.release_set(&mut previous);
        state.current.epoch = state.epoch;
        state.serial += 1;
        drop(cache);

        self.upload_serial.fetch_add(1, Ordering::AcqRel);
        self.request_redraw();
        tracing::debug!("Released visible tiles below minimum zoom");
    }

    /// Refreshes `tile_set` with the current visible tiles.
    ///
    /// Returns `false` without touching the set when it already holds the
    /// current tiles. Otherwise the current tiles are locked, the previous
    /// contents unlocked, and the set's storage reused.
    pub fn get_active_tiles(&self, tile_set: &mut TileSet) -> bool {
        let cache = self.cache.lock();
        let fill = Fill::Visible(cache.serial);
        if tile_set.filled == Some(fill) && tile_set.epoch == cache.epoch {
            return false;
        }

        cache.lock_all(&cache.current.tiles);
        cache.release_set(tile_set);

        tile_set.tiles.extend(cache.current.tiles.iter().cloned());
        tile_set
            .placeholders
            .extend(cache.current.placeholders.iter().cloned());
        tile_set.filled = Some(fill);
        tile_set.epoch = cache.epoch;
        tile_set.owner = Some(Arc::downgrade(&self.cache));
        true
    }

    /// Fills `tile_set` with the ready tiles of the visible set, locked.
    ///
    /// Returns `true` when the visible set or an upload changed what the
    /// set holds since it was last filled.
    pub fn acquire_visible_tiles(&self, tile_set: &mut TileSet) -> bool {
        let cache = self.cache.lock();
        let previous = tile_set.filled;

        let ready: Vec<Arc<Tile>> = cache
            .current
            .tiles
            .iter()
            .filter(|t| t.state() == TileState::Ready)
            .cloned()
            .collect();
        cache.lock_all(&ready);
        cache.release_set(tile_set);

        tile_set.tiles = ready;
        tile_set.placeholders.extend(
            cache
                .current
                .placeholders
                .iter()
                .filter(|p| p.tile.state() == TileState::Ready)
                .cloned(),
        );
        let fill = Fill::Ready(self.upload_serial.load(Ordering::Acquire));
        tile_set.filled = Some(fill);
        tile_set.epoch = cache.epoch;
        tile_set.owner = Some(Arc::downgrade(&self.cache));
        previous != Some(fill)
    }

    /// Unlocks every tile of `tile_set` and empties it.
    pub fn release_visible_tiles(&self, tile_set: &mut TileSet) {
        let cache = self.cache.lock();
        cache.release_set(tile_set);
        tile_set.owner = None;
    }

    /// Uploads a tile in [`TileState::NewData`]. Render thread only.
    pub fn upload_tile(&self, tile: &Tile) -> bool {
        if !tile.upload() {
            return false;
        }
        Counters::bump(&self.counters.uploads);
        self.upload_serial.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Uploads new data for the tiles of `tile_set`, at most `max_uploads`.
    ///
    /// Tiles without data get their pinned parent uploaded instead, or
    /// failing that their pinned children. Returns the number of uploads.
    pub fn prepare_tiles(&self, tile_set: &TileSet, max_uploads: usize) -> usize {
        let mut pending: Vec<Arc<Tile>> = Vec::new();
        let push = |pending: &mut Vec<Arc<Tile>>, tile: &Arc<Tile>| {
            if !pending.iter().any(|p| Arc::ptr_eq(p, tile)) {
                pending.push(Arc::clone(tile));
            }
        };
        {
            let cache = self.cache.lock();
            for tile in tile_set {
                if pending.len() >= max_uploads {
                    break;
                }
                match tile.state() {
                    TileState::Ready => continue,
                    TileState::NewData => {
                        push(&mut pending, tile);
                        continue;
                    }
                    _ => {}
                }
                if tile.has_proxy(Proxy::Parent) {
                    if let Some(parent) = cache.index.relative(tile, Proxy::Parent) {
                        if parent.state() == TileState::NewData {
                            push(&mut pending, parent);
                        }
                    }
                    continue;
                }
                for i in 0..4 {
                    let proxy = Proxy::Child(i);
                    if !tile.has_proxy(proxy) {
                        continue;
                    }
                    if let Some(child) = cache.index.relative(tile, proxy) {
                        if child.state() == TileState::NewData {
                            push(&mut pending, child);
                        }
                    }
                }
            }
        }

        pending.truncate(max_uploads);
        pending
            .iter()
            .filter(|tile| self.upload_tile(tile))
            .count()
    }

    /// The relative pinned as `proxy` for `tile`, if the tile holds it.
    pub fn proxy(&self, tile: &Tile, proxy: Proxy) -> Option<Arc<Tile>> {
        if !tile.has_proxy(proxy) {
            return None;
        }
        let cache = self.cache.lock();
        cache.index.relative(tile, proxy).cloned()
    }

    /// Pinned relatives of `tile` that are ready to draw in its place,
    /// parent first, then children, then grandparent.
    pub fn ready_proxies(&self, tile: &Tile) -> Vec<(Proxy, Arc<Tile>)> {
        const ORDER: [Proxy; 6] = [
            Proxy::Parent,
            Proxy::Child(0),
            Proxy::Child(1),
            Proxy::Child(2),
            Proxy::Child(3),
            Proxy::Grandparent,
        ];
        let pinned = tile.proxies();
        if pinned.is_empty() {
            return Vec::new();
        }
        let cache = self.cache.lock();
        ORDER
            .iter()
            .filter(|p| pinned.contains(p.mask()))
            .filter_map(|&p| {
                cache
                    .index
                    .relative(tile, p)
                    .filter(|t| t.state() == TileState::Ready)
                    .map(|t| (p, Arc::clone(t)))
            })
            .collect()
    }

    pub fn get_tile(&self, key: &TileKey) -> Option<Arc<Tile>> {
        self.cache.lock().index.get(key).cloned()
    }

    /// Makes every failed tile loadable again. Returns how many were reset.
    ///
    /// The tiles are queued by the next [`TileManager::update`].
    pub fn retry_failed(&self) -> usize {
        let mut cache = self.cache.lock();
        let mut reset = 0;
        for entry in cache.index.iter_mut() {
            if entry.tile.try_transition(TileState::Error, TileState::None) {
                entry.failed_at = None;
                reset += 1;
            }
        }
        if reset > 0 {
            tracing::info!(tiles = reset, "Failed tiles reset for retry");
        }
        reset
    }

    /// Drops the data of every loaded tile, e.g. after a style change.
    ///
    /// Tiles stay cached in [`TileState::None`] and are reloaded by the next
    /// update. Loads already in flight still complete.
    pub fn invalidate_all(&self) {
        self.jobs.clear();
        let cache = self.cache.lock();
        let mut invalidated = 0;
        for entry in cache.index.iter() {
            let tile = &entry.tile;
            let state = tile.state();
            if state.has_data() && tile.try_transition(state, TileState::None) {
                tile.clear_payload();
                invalidated += 1;
            }
        }
        drop(cache);

        self.upload_serial.fetch_add(1, Ordering::AcqRel);
        self.request_redraw();
        tracing::info!(tiles = invalidated, "Tiles invalidated");
    }

    /// Releases the visible set and removes every tile from the cache.
    ///
    /// Tile sets filled earlier no longer hold locks afterwards; refilling
    /// or dropping them is safe.
    ///
    /// Tiles still loading stay cached, unlocked and detached, until their
    /// loader reports back. An update that sees one of them again reuses it
    /// instead of queueing a second load for the same key.
    pub fn release_all(&self) {
        self.jobs.clear();
        let mut cache = self.cache.lock();
        let state = &mut *cache;

        let mut current = std::mem::take(&mut state.current);
        state.release_set(&mut current);

        let entries: Vec<TileEntry> = state.index.drain().collect();
        let mut removed = 0;
        let mut detached = 0;
        for mut entry in entries {
            let previous = entry.tile.state();
            if previous == TileState::Loading {
                entry.tile.reset_locks();
                entry.detached = true;
                state.index.insert(entry);
                detached += 1;
                continue;
            }
            if previous != TileState::None {
                entry.tile.try_transition(previous, TileState::None);
            }
            entry.tile.clear_payload();
            removed += 1;
        }

        state.epoch += 1;
        state.serial += 1;
        state.current.epoch = state.epoch;
        drop(cache);

        self.upload_serial.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(tiles = removed, loading = detached, "Released all tiles");
    }

    /// Returns and clears the pending redraw request.
    pub fn take_redraw_request(&self) -> bool {
        self.redraw.swap(false, Ordering::AcqRel)
    }

    fn request_redraw(&self) {
        self.redraw.store(true, Ordering::Release);
        self.events.emit(TileEvent::RedrawRequested);
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        let mut pending_uploads = 0;
        let mut payload_bytes = 0;
        for entry in cache.index.iter() {
            if entry.tile.state() == TileState::NewData {
                pending_uploads += 1;
            }
            payload_bytes += entry.tile.payload_size();
        }
        self.counters
            .snapshot(cache.index.len(), pending_uploads, payload_bytes)
    }

    pub fn tile_count(&self) -> usize {
        self.cache.lock().index.len()
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Serial of the current visible set.
    pub fn serial(&self) -> u64 {
        self.cache.lock().serial
    }
}

impl JobCompletion for TileManager {
    fn pass_tile(&self, mut job: Job) {
        let tile = Arc::clone(job.tile());
        let key = tile.key();

        let Some(mut payload) = job.take_payload() else {
            self.job_failed(job, LoadError::MissingPayload);
            return;
        };
        let kind = payload.kind();

        let mut cache = self.cache.lock();
        if cache.index.is_detached(&tile) {
            cache.index.remove(&key);
        }
        if !cache.index.holds(&tile) {
            drop(cache);
            tracing::debug!(tile = %key, "Loaded tile no longer cached");
            payload.release();
            tile.try_transition(TileState::Loading, TileState::None);
            Counters::bump(&self.counters.loads_cancelled);
            return;
        }
        if !tile.publish(payload) {
            tracing::warn!(tile = %key, state = %tile.state(), "Loaded tile was not loading");
            return;
        }
        let visible = tile.is_locked();
        drop(cache);

        Counters::bump(&self.counters.loads_succeeded);
        self.events.emit(TileEvent::TileLoaded { key, kind });

        // locked means visible or pinned by a visible tile
        if visible {
            self.request_redraw();
        }
    }

    fn job_failed(&self, job: Job, error: LoadError) {
        let tile = job.tile();
        let key = tile.key();

        let mut cache = self.cache.lock();
        if cache.index.is_detached(tile) {
            cache.index.remove(&key);
        }
        let cached = cache.index.holds(tile);
        if !cached {
            tile.try_transition(TileState::Loading, TileState::None);
            return;
        }
        if !tile.try_transition(TileState::Loading, TileState::Error) {
            tracing::warn!(tile = %key, state = %tile.state(), "Failed tile was not loading");
            return;
        }
        if let Some(entry) = cache.index.entry_mut(&key) {
            entry.failed_at = Some(Instant::now());
        }
        drop(cache);

        Counters::bump(&self.counters.loads_failed);
        tracing::debug!(tile = %key, error = %error, transient = error.is_transient(), "Tile load failed");
        self.events.emit(TileEvent::TileFailed {
            key,
            reason: error.to_string(),
        });
    }

    fn job_cancelled(&self, job: Job) {
        let tile = job.tile();
        let mut cache = self.cache.lock();
        if cache.index.is_detached(tile) {
            cache.index.remove(&tile.key());
        }
        let cancelled = tile.try_transition(TileState::Loading, TileState::None);
        drop(cache);
        if cancelled {
            Counters::bump(&self.counters.loads_cancelled);
            self.events.emit(TileEvent::TileCancelled { key: tile.key() });
        }
    }
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("config", &self.config)
            .field("tiles", &self.tile_count())
            .finish()
    }
}
