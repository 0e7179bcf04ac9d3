//! Integration tests for loader threads driven through [`TileLayer`].
//!
//! These tests run real loader threads against in-memory sources:
//! - At-most-one-load per tile while the view keeps moving
//! - Failed and panicking sources leave tiles in error, loaders alive
//! - Teardown interrupts a blocked decode without publishing it
//!
//! Run with: `cargo test --test loader_integration`

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use maptile::cache::{TileManagerConfig, TileSet};
use maptile::coord::TileKey;
use maptile::events::{TileEvent, TileEventSink};
use maptile::jobs::Job;
use maptile::layer::TileLayer;
use maptile::loader::{LoadError, LoaderConfig, LoaderState, TileSource};
use maptile::tile::{PayloadKind, TilePayload, TileState};
use maptile::viewport::Viewport;

// ============================================================================
// Test Helpers
// ============================================================================

struct VectorPayload;

impl TilePayload for VectorPayload {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Vector
    }

    fn upload(&mut self) -> bool {
        true
    }

    fn release(&mut self) {}
}

/// Source that records which keys are being decoded at any instant.
#[derive(Default)]
struct TrackingSource {
    in_flight: Mutex<HashSet<TileKey>>,
    overlaps: AtomicUsize,
    executed: AtomicUsize,
}

impl TileSource for TrackingSource {
    fn execute_job(&self, job: &mut Job) -> Result<(), LoadError> {
        let key = job.key();
        if !self.in_flight.lock().insert(key) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(1));
        self.in_flight.lock().remove(&key);

        self.executed.fetch_add(1, Ordering::SeqCst);
        job.set_payload(Box::new(VectorPayload));
        Ok(())
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<TileEvent>>);

impl EventLog {
    fn failures(&self) -> Vec<TileKey> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| match e {
                TileEvent::TileFailed { key, .. } => Some(*key),
                _ => None,
            })
            .collect()
    }
}

impl TileEventSink for EventLog {
    fn emit(&self, event: TileEvent) {
        self.0.lock().push(event);
    }
}

fn loader_config(threads: usize) -> LoaderConfig {
    LoaderConfig {
        join_timeout: Duration::from_millis(500),
        ..LoaderConfig::default()
    }
    .with_threads(threads)
}

fn grid_view(col: u32, row: u32, zoom: u8) -> Viewport {
    let n = f64::from(1u32 << zoom);
    Viewport::new(
        (f64::from(col) + 0.5) / n,
        (f64::from(row) + 0.5) / n,
        f64::from(zoom),
        512.0,
        512.0,
    )
}

fn key(x: u32, y: u32, zoom: u8) -> TileKey {
    TileKey::new(x, y, zoom).unwrap()
}

fn wait_until(timeout: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_moving_view_never_loads_a_tile_twice_at_once() {
    let source = Arc::new(TrackingSource::default());
    let layer = TileLayer::new(
        TileManagerConfig::default(),
        loader_config(4),
        source.clone(),
        Arc::new(EventLog::default()),
    )
    .unwrap();

    // pan back and forth so queued jobs keep being replaced
    for step in 0..40u32 {
        let col = 500 + (step % 5);
        layer.update(&grid_view(col, 500, 10)).unwrap();
        thread::sleep(Duration::from_millis(2));
    }
    layer.update(&grid_view(502, 500, 10)).unwrap();

    let manager = Arc::clone(layer.manager());
    assert!(wait_until(Duration::from_secs(5), || {
        (501..=503).all(|x| {
            (499..=501).all(|y| {
                manager
                    .get_tile(&key(x, y, 10))
                    .is_some_and(|t| t.state() == TileState::NewData)
            })
        })
    }));
    assert_eq!(source.overlaps.load(Ordering::SeqCst), 0);
    assert!(source.executed.load(Ordering::SeqCst) >= 9);
}

#[test]
fn test_source_failures_leave_loaders_running() {
    let failing = key(500, 500, 10);
    let panicking = key(501, 500, 10);
    let source = move |job: &mut Job| -> Result<(), LoadError> {
        if job.key() == failing {
            return Err(LoadError::Decode("bad header".to_string()));
        }
        if job.key() == panicking {
            panic!("decoder bug");
        }
        job.set_payload(Box::new(VectorPayload));
        Ok(())
    };
    let events = Arc::new(EventLog::default());
    let layer = TileLayer::new(
        TileManagerConfig::default(),
        loader_config(2),
        Arc::new(source),
        events.clone(),
    )
    .unwrap();

    layer.update(&grid_view(500, 500, 10)).unwrap();
    let manager = Arc::clone(layer.manager());
    assert!(wait_until(Duration::from_secs(5), || {
        let stats = manager.stats();
        stats.loads_succeeded == 7 && stats.loads_failed == 2
    }));

    assert_eq!(manager.get_tile(&failing).unwrap().state(), TileState::Error);
    assert_eq!(manager.get_tile(&panicking).unwrap().state(), TileState::Error);
    let mut failed = events.failures();
    failed.sort();
    assert_eq!(failed, vec![failing, panicking]);
    assert!(layer.is_running());

    // only the seven loaded tiles have data to upload
    let mut tiles = TileSet::new();
    manager.get_active_tiles(&mut tiles);
    assert_eq!(manager.prepare_tiles(&tiles, usize::MAX), 7);
}

#[test]
fn test_teardown_interrupts_blocked_decode() {
    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);
    // blocks until the job is cancelled
    let source = move |job: &mut Job| -> Result<(), LoadError> {
        counter.fetch_add(1, Ordering::SeqCst);
        job.set_payload(Box::new(VectorPayload));
        while !job.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
        Err(LoadError::Cancelled)
    };
    let mut layer = TileLayer::new(
        TileManagerConfig::default(),
        loader_config(2),
        Arc::new(source),
        Arc::new(EventLog::default()),
    )
    .unwrap();

    layer.update(&grid_view(500, 500, 10)).unwrap();
    assert!(wait_until(Duration::from_secs(5), || started.load(Ordering::SeqCst) == 2));
    let in_flight: Vec<_> = (499..=501)
        .flat_map(|y| (499..=501).map(move |x| key(x, y, 10)))
        .filter_map(|k| layer.manager().get_tile(&k))
        .collect();

    let start = Instant::now();
    layer.teardown().unwrap();
    assert!(start.elapsed() < Duration::from_secs(3));

    assert!(!layer.is_running());
    assert_eq!(layer.manager().tile_count(), 0);
    for tile in in_flight {
        assert_eq!(tile.state(), TileState::None, "{}", tile.key());
        assert!(tile.with_payload(|_| ()).is_none());
    }
    assert_eq!(layer.manager().stats().loads_succeeded, 0);
}

#[test]
fn test_pause_and_resume() {
    let source = Arc::new(TrackingSource::default());
    let layer = TileLayer::new(
        TileManagerConfig::default(),
        loader_config(2),
        source.clone(),
        Arc::new(EventLog::default()),
    )
    .unwrap();

    layer.pause();
    assert!(wait_until(Duration::from_secs(5), || layer
        .loader_states()
        .iter()
        .all(|s| *s == LoaderState::Paused)));

    layer.update(&grid_view(500, 500, 10)).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(source.executed.load(Ordering::SeqCst), 0);
    assert_eq!(layer.manager().jobs().len(), 9);

    layer.resume();
    assert!(wait_until(Duration::from_secs(5), || {
        layer.manager().stats().loads_succeeded == 9
    }));
    assert!(wait_until(Duration::from_secs(5), || layer
        .loader_states()
        .iter()
        .all(|s| *s == LoaderState::Waiting)));
}
