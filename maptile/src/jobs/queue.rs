//! Priority queue of pending tile loads.
//!
//! The control thread replaces the whole batch on every viewport change
//! while loader threads poll concurrently, so every operation runs inside
//! one mutex. A tile accepted into the queue is moved to
//! [`TileState::Loading`] immediately; only tiles in [`TileState::None`] are
//! accepted, which makes a second pending or in-flight job for the same key
//! impossible.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Job;
use crate::coord::TileKey;
use crate::tile::{Tile, TileState};

#[derive(Default)]
struct QueueInner {
    /// Sorted by ascending priority, ties in insertion order.
    jobs: VecDeque<Job>,
    next_sequence: u64,
}

/// Shared job queue polled by every loader of a layer.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<QueueInner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pending batch with `tiles`.
    ///
    /// Tiles already pending stay queued with their priority refreshed.
    /// Other tiles are accepted only when they are in [`TileState::None`].
    /// Pending tiles missing from the new batch go back to
    /// [`TileState::None`]. Returns the number of jobs now pending.
    pub fn set_jobs(&self, tiles: &[Arc<Tile>]) -> usize {
        let mut inner = self.inner.lock();

        let mut previous: HashMap<TileKey, Job> = inner
            .jobs
            .drain(..)
            .map(|job| (job.key(), job))
            .collect();

        let mut seen = HashSet::with_capacity(tiles.len());
        let mut jobs = Vec::with_capacity(tiles.len());

        for tile in tiles {
            let key = tile.key();
            if !seen.insert(key) {
                continue;
            }
            if let Some(mut job) = previous.remove(&key) {
                job.refresh_priority();
                jobs.push(job);
                continue;
            }
            if tile.try_transition(TileState::None, TileState::Loading) {
                let sequence = inner.next_sequence;
                inner.next_sequence += 1;
                jobs.push(Job::new(Arc::clone(tile), sequence));
            }
        }

        for (key, job) in previous {
            if !job.tile().try_transition(TileState::Loading, TileState::None) {
                tracing::warn!(tile = %key, state = %job.tile().state(), "Dropped job was not loading");
            }
        }

        // stable: equal priorities keep batch order
        jobs.sort_by(|a, b| {
            a.priority()
                .partial_cmp(&b.priority())
                .unwrap_or(Ordering::Equal)
        });

        inner.jobs = jobs.into();
        tracing::trace!(pending = inner.jobs.len(), "Job batch replaced");
        inner.jobs.len()
    }

    /// Removes and returns the highest priority job.
    ///
    /// The returned tile is in [`TileState::Loading`] and owned by the
    /// caller until it hands the job back to the tile manager. Entries whose
    /// tile left `Loading` while queued are skipped.
    pub fn poll(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        while let Some(job) = inner.jobs.pop_front() {
            if job.tile().state() == TileState::Loading {
                return Some(job);
            }
            tracing::debug!(tile = %job.key(), state = %job.tile().state(), "Skipping stale job");
        }
        None
    }

    /// Drops every pending job. Jobs already polled are not affected.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for job in inner.jobs.drain(..) {
            job.tile().try_transition(TileState::Loading, TileState::None);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    /// Keys of the pending jobs in poll order.
    pub fn pending_keys(&self) -> Vec<TileKey> {
        self.inner.lock().jobs.iter().map(Job::key).collect()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").field("pending", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn tile(x: u32, distance: f32) -> Arc<Tile> {
        let tile = Arc::new(Tile::new(TileKey::new(x, 0, 8).unwrap()));
        tile.set_distance(distance);
        tile
    }

    #[test]
    fn test_poll_returns_lowest_distance_first() {
        let queue = JobQueue::new();
        let tiles = [tile(0, 5.0), tile(1, 1.0), tile(2, 3.0)];
        assert_eq!(queue.set_jobs(&tiles), 3);

        let order: Vec<f32> = std::iter::from_fn(|| queue.poll())
            .map(|job| job.priority())
            .collect();
        assert_eq!(order, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_equal_priorities_keep_insertion_order() {
        let queue = JobQueue::new();
        let tiles = [tile(4, 2.0), tile(1, 2.0), tile(3, 2.0)];
        queue.set_jobs(&tiles);

        let xs: Vec<u32> = queue.pending_keys().iter().map(|k| k.x).collect();
        assert_eq!(xs, vec![4, 1, 3]);
    }

    #[test]
    fn test_accepted_tiles_become_loading() {
        let queue = JobQueue::new();
        let a = tile(0, 1.0);
        queue.set_jobs(&[Arc::clone(&a)]);
        assert_eq!(a.state(), TileState::Loading);
    }

    #[test]
    fn test_set_jobs_replaces_pending_batch() {
        let queue = JobQueue::new();
        let (a, b, c) = (tile(0, 1.0), tile(1, 2.0), tile(2, 3.0));

        queue.set_jobs(&[Arc::clone(&a), Arc::clone(&b)]);
        queue.set_jobs(&[Arc::clone(&b), Arc::clone(&c)]);

        let keys = queue.pending_keys();
        assert_eq!(keys, vec![b.key(), c.key()]);
        assert_eq!(a.state(), TileState::None);
        assert_eq!(b.state(), TileState::Loading);
        assert_eq!(c.state(), TileState::Loading);
    }

    #[test]
    fn test_retained_job_takes_new_priority() {
        let queue = JobQueue::new();
        let (a, b) = (tile(0, 1.0), tile(1, 2.0));
        queue.set_jobs(&[Arc::clone(&a), Arc::clone(&b)]);

        a.set_distance(10.0);
        queue.set_jobs(&[Arc::clone(&a), Arc::clone(&b)]);
        assert_eq!(queue.pending_keys(), vec![b.key(), a.key()]);
    }

    #[test]
    fn test_error_and_ready_tiles_rejected() {
        let queue = JobQueue::new();
        let failed = tile(0, 1.0);
        failed.try_transition(TileState::None, TileState::Loading);
        failed.try_transition(TileState::Loading, TileState::Error);

        assert_eq!(queue.set_jobs(&[Arc::clone(&failed)]), 0);
        assert!(queue.is_empty());
        assert_eq!(failed.state(), TileState::Error);
    }

    #[test]
    fn test_in_flight_tile_not_requeued() {
        let queue = JobQueue::new();
        let a = tile(0, 1.0);
        queue.set_jobs(&[Arc::clone(&a)]);
        let job = queue.poll().unwrap();

        // still loading in a worker, must not be queued twice
        assert_eq!(queue.set_jobs(&[Arc::clone(&a)]), 0);
        assert!(queue.poll().is_none());
        assert_eq!(job.tile().state(), TileState::Loading);
    }

    #[test]
    fn test_duplicate_tiles_in_batch_queued_once() {
        let queue = JobQueue::new();
        let a = tile(0, 1.0);
        assert_eq!(queue.set_jobs(&[Arc::clone(&a), Arc::clone(&a)]), 1);
    }

    #[test]
    fn test_clear_reverts_pending_tiles() {
        let queue = JobQueue::new();
        let (a, b) = (tile(0, 1.0), tile(1, 2.0));
        queue.set_jobs(&[Arc::clone(&a), Arc::clone(&b)]);
        let polled = queue.poll().unwrap();

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(b.state(), TileState::None);
        // already dequeued, untouched
        assert_eq!(polled.tile().state(), TileState::Loading);
    }

    #[test]
    fn test_poll_skips_withdrawn_tiles() {
        let queue = JobQueue::new();
        let (a, b) = (tile(0, 1.0), tile(1, 2.0));
        queue.set_jobs(&[Arc::clone(&a), Arc::clone(&b)]);
        a.try_transition(TileState::Loading, TileState::None);

        let job = queue.poll().unwrap();
        assert_eq!(job.key(), b.key());
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_concurrent_polls_never_share_a_key() {
        let queue = Arc::new(JobQueue::new());
        let tiles: Vec<_> = (0..200).map(|x| tile(x, x as f32)).collect();
        queue.set_jobs(&tiles);

        let workers = 4;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut keys = Vec::new();
                    while let Some(job) = queue.poll() {
                        keys.push(job.key());
                    }
                    keys
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for key in handle.join().unwrap() {
                assert!(all.insert(key), "{key} polled twice");
            }
        }
        assert_eq!(all.len(), 200);
    }
}
