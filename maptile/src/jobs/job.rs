//! A pending request to load one tile.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::coord::TileKey;
use crate::tile::{Tile, TilePayload};

/// Load request for a single tile.
///
/// Two jobs are equal when they refer to the same [`TileKey`]. The loader
/// writes the decoded payload into the job with [`Job::set_payload`]; the
/// tile manager publishes it to the tile only once the load has succeeded.
pub struct Job {
    tile: Arc<Tile>,
    priority: f32,
    sequence: u64,
    payload: Option<Box<dyn TilePayload>>,
    cancel: CancellationToken,
}

impl Job {
    pub(crate) fn new(tile: Arc<Tile>, sequence: u64) -> Self {
        let priority = tile.distance();
        Self {
            tile,
            priority,
            sequence,
            payload: None,
            cancel: CancellationToken::new(),
        }
    }

    #[inline]
    pub fn key(&self) -> TileKey {
        self.tile.key()
    }

    #[inline]
    pub fn tile(&self) -> &Arc<Tile> {
        &self.tile
    }

    /// Distance from the view centre when the job was queued. Lower is sooner.
    #[inline]
    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn refresh_priority(&mut self) {
        self.priority = self.tile.distance();
    }

    /// Stores the decoded content for this tile.
    pub fn set_payload(&mut self, payload: Box<dyn TilePayload>) {
        if let Some(mut old) = self.payload.replace(payload) {
            old.release();
        }
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub(crate) fn take_payload(&mut self) -> Option<Box<dyn TilePayload>> {
        self.payload.take()
    }

    /// Token cancelled when the loader running this job is interrupted.
    ///
    /// Sources doing long I/O should check it between steps.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn attach_cancel(&mut self, token: CancellationToken) {
        self.cancel = token;
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Job {}

impl Drop for Job {
    fn drop(&mut self) {
        if let Some(mut payload) = self.payload.take() {
            payload.release();
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("key", &self.key())
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}
