//! Tile cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Snapshot of tile manager activity.
#[derive(Debug, Clone)]
pub struct CacheStats {
    // Cache contents
    pub tile_count: usize,
    pub pending_uploads: usize,
    pub payload_bytes: usize,

    // Lifetime counters
    pub tiles_created: u64,
    pub tiles_evicted: u64,
    pub loads_succeeded: u64,
    pub loads_failed: u64,
    pub loads_cancelled: u64,
    pub uploads: u64,

    pub created_at: Instant,
}

impl CacheStats {
    /// Failed share of finished loads (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        let total = self.loads_succeeded + self.loads_failed;
        if total == 0 {
            0.0
        } else {
            self.loads_failed as f64 / total as f64
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

/// Counters updated from the control, loader and render threads.
#[derive(Debug)]
pub(crate) struct Counters {
    pub tiles_created: AtomicU64,
    pub tiles_evicted: AtomicU64,
    pub loads_succeeded: AtomicU64,
    pub loads_failed: AtomicU64,
    pub loads_cancelled: AtomicU64,
    pub uploads: AtomicU64,
    pub created_at: Instant,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            tiles_created: AtomicU64::new(0),
            tiles_evicted: AtomicU64::new(0),
            loads_succeeded: AtomicU64::new(0),
            loads_failed: AtomicU64::new(0),
            loads_cancelled: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }
}

impl Counters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, tile_count: usize, pending_uploads: usize, payload_bytes: usize) -> CacheStats {
        CacheStats {
            tile_count,
            pending_uploads,
            payload_bytes,
            tiles_created: self.tiles_created.load(Ordering::Relaxed),
            tiles_evicted: self.tiles_evicted.load(Ordering::Relaxed),
            loads_succeeded: self.loads_succeeded.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            loads_cancelled: self.loads_cancelled.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_rate() {
        let counters = Counters::default();
        assert_eq!(counters.snapshot(0, 0, 0).failure_rate(), 0.0);

        Counters::bump(&counters.loads_succeeded);
        Counters::bump(&counters.loads_succeeded);
        Counters::bump(&counters.loads_succeeded);
        Counters::bump(&counters.loads_failed);
        let stats = counters.snapshot(4, 1, 0);
        assert!((stats.failure_rate() - 0.25).abs() < 1e-9);
        assert_eq!(stats.tile_count, 4);
    }
}
