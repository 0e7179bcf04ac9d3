//! Tile lifecycle events.
//!
//! The tile manager and loaders emit events through a [`TileEventSink`] and
//! never decide how they are presented. A UI can count them, a test can
//! record them, and [`TracingEventSink`] turns them into log lines.
//!
//! # Example
//!
//! ```ignore
//! use maptile::events::{TileEvent, TileEventSink};
//!
//! struct RedrawSink(std::sync::mpsc::Sender<()>);
//!
//! impl TileEventSink for RedrawSink {
//!     fn emit(&self, event: TileEvent) {
//!         if matches!(event, TileEvent::RedrawRequested) {
//!             let _ = self.0.send(());
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::coord::TileKey;
use crate::loader::LoaderState;
use crate::tile::{PayloadKind, TileState};

/// Something observable happened to a tile or a loader.
#[derive(Clone, Debug, PartialEq)]
pub enum TileEvent {
    /// A loader produced new data for a tile.
    TileLoaded { key: TileKey, kind: PayloadKind },

    /// A load failed; the tile is now in error.
    TileFailed { key: TileKey, reason: String },

    /// A load was interrupted; the tile went back to none.
    TileCancelled { key: TileKey },

    /// A tile was evicted from the cache.
    TileRemoved { key: TileKey, state: TileState },

    /// Visible content changed and the map should be redrawn.
    RedrawRequested,

    /// A loader thread changed state.
    LoaderStateChanged { loader: usize, state: LoaderState },
}

/// Receiver of [`TileEvent`]s.
///
/// Called from loader threads and the control thread, possibly while cache
/// locks are held. Implementations must be quick and must not call back
/// into the tile manager.
pub trait TileEventSink: Send + Sync {
    fn emit(&self, event: TileEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl TileEventSink for NullEventSink {
    fn emit(&self, _event: TileEvent) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl TileEventSink for TracingEventSink {
    fn emit(&self, event: TileEvent) {
        match event {
            TileEvent::TileLoaded { key, kind } => {
                tracing::debug!(tile = %key, kind = %kind, "Tile loaded");
            }
            TileEvent::TileFailed { key, reason } => {
                tracing::warn!(tile = %key, reason = %reason, "Tile load failed");
            }
            TileEvent::TileCancelled { key } => {
                tracing::debug!(tile = %key, "Tile load cancelled");
            }
            TileEvent::TileRemoved { key, state } => {
                tracing::trace!(tile = %key, state = %state, "Tile evicted");
            }
            TileEvent::RedrawRequested => {
                tracing::trace!("Redraw requested");
            }
            TileEvent::LoaderStateChanged { loader, state } => {
                tracing::debug!(loader = loader, state = %state, "Loader state changed");
            }
        }
    }
}

/// Forwards events to several sinks.
pub struct MultiplexEventSink {
    sinks: Vec<Arc<dyn TileEventSink>>,
}

impl MultiplexEventSink {
    pub fn new(sinks: Vec<Arc<dyn TileEventSink>>) -> Self {
        Self { sinks }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn TileEventSink>) {
        self.sinks.push(sink);
    }
}

impl TileEventSink for MultiplexEventSink {
    fn emit(&self, event: TileEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for MultiplexEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexEventSink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}
