//! Tile records shared between the control, loader and render threads.
//!
//! A [`Tile`] is created by the tile manager when its key first becomes
//! visible and is shared as `Arc<Tile>` with the job queue, one loader and
//! the render thread's tile sets. Its state is an atomic published with
//! release/acquire ordering: a loader stores the payload before the tile
//! becomes [`TileState::NewData`], so a render thread that observes the new
//! state also observes the payload.
//!
//! Lock and reference counts and the proxy mask are stored atomically for
//! lock-free reads, but every mutation happens under the tile manager's
//! cache lock.

mod payload;
mod proxy;
mod state;

pub use payload::{PayloadKind, TilePayload};
pub use proxy::{Proxy, ProxyMask};
pub use state::TileState;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::coord::TileKey;

type PayloadSlot = Option<Box<dyn TilePayload>>;

/// A cached map tile.
pub struct Tile {
    key: TileKey,
    state: AtomicU8,
    payload: Mutex<PayloadSlot>,
    /// f32 bits
    distance: AtomicU32,
    lock_count: AtomicU32,
    ref_count: AtomicU32,
    proxies: AtomicU8,
}

impl Tile {
    pub fn new(key: TileKey) -> Self {
        Self {
            key,
            state: AtomicU8::new(TileState::None as u8),
            payload: Mutex::new(None),
            distance: AtomicU32::new(0f32.to_bits()),
            lock_count: AtomicU32::new(0),
            ref_count: AtomicU32::new(0),
            proxies: AtomicU8::new(0),
        }
    }

    #[inline]
    pub fn key(&self) -> TileKey {
        self.key
    }

    #[inline]
    pub fn state(&self) -> TileState {
        TileState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Proximity to the viewport centre from the last update. Sort key only.
    #[inline]
    pub fn distance(&self) -> f32 {
        f32::from_bits(self.distance.load(Ordering::Relaxed))
    }

    pub(crate) fn set_distance(&self, distance: f32) {
        self.distance.store(distance.to_bits(), Ordering::Relaxed);
    }

    /// Direct holders, such as the render thread's current tile set.
    #[inline]
    pub fn lock_count(&self) -> u32 {
        self.lock_count.load(Ordering::Acquire)
    }

    /// Other tiles currently using this one as a proxy.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Relatives pinned while this tile is locked.
    #[inline]
    pub fn proxies(&self) -> ProxyMask {
        ProxyMask::from_bits_truncate(self.proxies.load(Ordering::Acquire))
    }

    #[inline]
    pub fn has_proxy(&self, proxy: Proxy) -> bool {
        let mask = proxy.mask();
        !mask.is_empty() && self.proxies().contains(mask)
    }

    /// Locked directly or pinned as a proxy.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock_count() > 0 || self.ref_count() > 0
    }

    /// May be removed from the cache.
    pub fn is_evictable(&self) -> bool {
        !self.is_locked() && self.state() != TileState::Loading
    }

    /// Atomically moves the tile from `from` to `to`.
    ///
    /// Returns `false` when the tile was not in `from` or when `from -> to`
    /// is not an edge of the state machine. Invalid edges are logged and
    /// otherwise ignored.
    pub fn try_transition(&self, from: TileState, to: TileState) -> bool {
        if !from.can_transition(to) {
            tracing::error!(tile = %self.key, from = %from, to = %to, "Invalid tile state transition");
            return false;
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs `f` with the payload if the tile holds readable data.
    ///
    /// Returns `None` while the tile is not in [`TileState::NewData`] or
    /// [`TileState::Ready`].
    pub fn with_payload<R>(&self, f: impl FnOnce(&dyn TilePayload) -> R) -> Option<R> {
        if !self.state().has_data() {
            return None;
        }
        let guard = self.payload.lock();
        guard.as_deref().map(f)
    }

    pub fn payload_kind(&self) -> Option<PayloadKind> {
        self.with_payload(|p| p.kind())
    }

    /// Uploads a freshly loaded payload and marks the tile ready.
    ///
    /// Called by the render thread. Returns `true` if this call moved the
    /// tile from [`TileState::NewData`] to [`TileState::Ready`].
    pub fn upload(&self) -> bool {
        let mut guard = self.payload.lock();
        if self.state() != TileState::NewData {
            return false;
        }
        let Some(payload) = guard.as_mut() else {
            tracing::error!(tile = %self.key, "New data tile without payload");
            return false;
        };
        if !payload.upload() {
            tracing::warn!(tile = %self.key, kind = %payload.kind(), "Payload upload failed");
        }
        self.try_transition(TileState::NewData, TileState::Ready)
    }

    /// Publishes a decoded payload. Caller must own the tile in `Loading`.
    ///
    /// A rejected payload is released before it is dropped.
    pub(crate) fn publish(&self, mut payload: Box<dyn TilePayload>) -> bool {
        let mut guard = self.payload.lock();
        if self.state() != TileState::Loading {
            payload.release();
            return false;
        }
        if let Some(mut old) = guard.replace(payload) {
            old.release();
        }
        if self.try_transition(TileState::Loading, TileState::NewData) {
            return true;
        }
        if let Some(mut p) = guard.take() {
            p.release();
        }
        false
    }

    /// Drops the payload, releasing its resources.
    pub(crate) fn clear_payload(&self) {
        if let Some(mut payload) = self.payload.lock().take() {
            payload.release();
        }
    }

    pub(crate) fn payload_size(&self) -> usize {
        self.payload
            .lock()
            .as_deref()
            .map(|p| p.size_bytes())
            .unwrap_or(0)
    }

    pub(crate) fn inc_lock(&self) -> u32 {
        self.lock_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the lock count unless it is already zero.
    pub(crate) fn dec_lock(&self) -> Option<u32> {
        self.lock_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|prev| prev - 1)
    }

    pub(crate) fn inc_ref(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the reference count unless it is already zero.
    pub(crate) fn dec_ref(&self) -> Option<u32> {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|prev| prev - 1)
    }

    pub(crate) fn add_proxy(&self, mask: ProxyMask) {
        self.proxies.fetch_or(mask.bits(), Ordering::AcqRel);
    }

    pub(crate) fn take_proxies(&self) -> ProxyMask {
        ProxyMask::from_bits_truncate(self.proxies.swap(0, Ordering::AcqRel))
    }

    /// Forgets every lock, reference and pinned proxy.
    pub(crate) fn reset_locks(&self) {
        self.lock_count.store(0, Ordering::Release);
        self.ref_count.store(0, Ordering::Release);
        self.proxies.store(0, Ordering::Release);
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("distance", &self.distance())
            .field("lock_count", &self.lock_count())
            .field("ref_count", &self.ref_count())
            .field("proxies", &self.proxies())
            .finish()
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        if let Some(mut payload) = self.payload.get_mut().take() {
            payload.release();
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Payload that counts uploads and releases.
    #[derive(Default)]
    pub struct CountingPayload {
        pub uploads: Arc<AtomicUsize>,
        pub releases: Arc<AtomicUsize>,
    }

    impl TilePayload for CountingPayload {
        fn kind(&self) -> PayloadKind {
            PayloadKind::Bitmap
        }

        fn upload(&mut self) -> bool {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn size_bytes(&self) -> usize {
            256 * 256 * 4
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CountingPayload;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn key() -> TileKey {
        TileKey::new(3, 5, 4).unwrap()
    }

    #[test]
    fn test_new_tile_is_none_and_unlocked() {
        let tile = Tile::new(key());
        assert_eq!(tile.state(), TileState::None);
        assert_eq!(tile.lock_count(), 0);
        assert_eq!(tile.ref_count(), 0);
        assert!(tile.proxies().is_empty());
        assert!(tile.is_evictable());
    }

    #[test]
    fn test_transition_requires_expected_state() {
        let tile = Tile::new(key());
        assert!(!tile.try_transition(TileState::Loading, TileState::NewData));
        assert!(tile.try_transition(TileState::None, TileState::Loading));
        assert!(!tile.is_evictable());
        assert!(!tile.try_transition(TileState::None, TileState::Loading));
    }

    #[test]
    fn test_invalid_edge_rejected() {
        let tile = Tile::new(key());
        assert!(tile.try_transition(TileState::None, TileState::Loading));
        assert!(tile.try_transition(TileState::Loading, TileState::NewData));
        assert!(tile.try_transition(TileState::NewData, TileState::Ready));
        assert!(!tile.try_transition(TileState::Ready, TileState::Loading));
        assert_eq!(tile.state(), TileState::Ready);
    }

    #[test]
    fn test_publish_then_upload() {
        let uploads = Arc::new(AtomicUsize::new(0));
        let tile = Tile::new(key());
        tile.try_transition(TileState::None, TileState::Loading);

        let payload = CountingPayload {
            uploads: uploads.clone(),
            ..Default::default()
        };
        assert!(tile.publish(Box::new(payload)));
        assert_eq!(tile.state(), TileState::NewData);
        assert_eq!(tile.payload_kind(), Some(PayloadKind::Bitmap));

        assert!(tile.upload());
        assert_eq!(tile.state(), TileState::Ready);
        assert!(!tile.upload());
        assert_eq!(uploads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publish_rejected_unless_loading() {
        let releases = Arc::new(AtomicUsize::new(0));
        let tile = Tile::new(key());
        let payload = CountingPayload {
            releases: releases.clone(),
            ..Default::default()
        };
        assert!(!tile.publish(Box::new(payload)));
        assert_eq!(tile.state(), TileState::None);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(tile.with_payload(|_| ()).is_none());
    }

    #[test]
    fn test_payload_hidden_while_loading() {
        let tile = Tile::new(key());
        tile.try_transition(TileState::None, TileState::Loading);
        assert!(tile.with_payload(|_| ()).is_none());
    }

    #[test]
    fn test_counts_never_negative() {
        let tile = Tile::new(key());
        assert_eq!(tile.dec_lock(), None);
        assert_eq!(tile.dec_ref(), None);
        assert_eq!(tile.inc_lock(), 1);
        assert_eq!(tile.dec_lock(), Some(0));
        assert_eq!(tile.dec_lock(), None);
        assert_eq!(tile.lock_count(), 0);
    }

    #[test]
    fn test_out_of_range_child_is_never_pinned() {
        let tile = Tile::new(key());
        assert!(!tile.has_proxy(Proxy::Child(5)));
        tile.add_proxy(ProxyMask::CHILDREN | ProxyMask::PARENT);
        assert!(tile.has_proxy(Proxy::Child(3)));
        assert!(!tile.has_proxy(Proxy::Child(4)));
        assert!(!tile.has_proxy(Proxy::Child(9)));
    }

    #[test]
    fn test_reset_locks_forgets_holders() {
        let tile = Tile::new(key());
        tile.inc_lock();
        tile.inc_ref();
        tile.add_proxy(ProxyMask::PARENT);

        tile.reset_locks();
        assert_eq!(tile.lock_count(), 0);
        assert_eq!(tile.ref_count(), 0);
        assert!(tile.proxies().is_empty());
    }

    #[test]
    fn test_drop_releases_payload() {
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let tile = Tile::new(key());
            tile.try_transition(TileState::None, TileState::Loading);
            tile.publish(Box::new(CountingPayload {
                releases: releases.clone(),
                ..Default::default()
            }));
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_payload_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let tile = Tile::new(key());
        tile.try_transition(TileState::None, TileState::Loading);
        tile.publish(Box::new(CountingPayload {
            releases: releases.clone(),
            ..Default::default()
        }));
        tile.clear_payload();
        drop(tile);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
