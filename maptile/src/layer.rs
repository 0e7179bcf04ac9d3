//! Tile layer facade.
//!
//! Ties one [`TileManager`], its [`JobQueue`] and a [`LoaderPool`] together
//! and owns their shutdown order. The control thread calls
//! [`TileLayer::update`] on map moves; the render thread works on
//! [`TileLayer::manager`] directly.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{TileManager, TileManagerConfig};
use crate::config::ConfigFile;
use crate::events::TileEventSink;
use crate::jobs::JobQueue;
use crate::loader::{LoaderConfig, LoaderError, LoaderPool, LoaderState, TileSource};
use crate::viewport::Viewport;

/// Errors starting or stopping a tile layer.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Tile layer already torn down")]
    TornDown,
}

/// A map layer backed by cached tiles and background loaders.
pub struct TileLayer {
    manager: Arc<TileManager>,
    jobs: Arc<JobQueue>,
    pool: Option<LoaderPool>,
    join_timeout: Duration,
}

impl TileLayer {
    /// Builds the manager and starts the loader threads.
    pub fn new(
        config: TileManagerConfig,
        loader: LoaderConfig,
        source: Arc<dyn TileSource>,
        events: Arc<dyn TileEventSink>,
    ) -> Result<Self, LayerError> {
        let jobs = Arc::new(JobQueue::new());
        let manager = Arc::new(TileManager::new(config, Arc::clone(&jobs), Arc::clone(&events)));
        let pool = LoaderPool::start(&loader, Arc::clone(&jobs), manager.clone(), source, events)?;

        tracing::info!(
            loaders = pool.len(),
            cache_limit = manager.config().cache_limit,
            "Tile layer started"
        );

        Ok(Self {
            manager,
            jobs,
            pool: Some(pool),
            join_timeout: loader.join_timeout,
        })
    }

    /// Builds a layer from the settings of a configuration file.
    pub fn from_config(
        config: &ConfigFile,
        source: Arc<dyn TileSource>,
        events: Arc<dyn TileEventSink>,
    ) -> Result<Self, LayerError> {
        Self::new(config.into(), config.into(), source, events)
    }

    pub fn manager(&self) -> &Arc<TileManager> {
        &self.manager
    }

    /// Recomputes the visible tiles and wakes loaders if anything was queued.
    pub fn update(&self, viewport: &Viewport) -> Result<bool, LayerError> {
        let pool = self.pool.as_ref().ok_or(LayerError::TornDown)?;
        let queued = self.manager.update(viewport);
        if queued {
            pool.notify();
        }
        Ok(queued)
    }

    /// Lets loaders finish their current job, then blocks them.
    pub fn pause(&self) {
        if let Some(pool) = &self.pool {
            pool.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(pool) = &self.pool {
            pool.resume();
        }
    }

    pub fn loader_states(&self) -> Vec<LoaderState> {
        self.pool.as_ref().map(LoaderPool::states).unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.pool.as_ref().is_some_and(LoaderPool::is_running)
    }

    /// Stops every loader and releases all tiles.
    ///
    /// Loaders are paused, then interrupted, then joined. The queue is
    /// cleared and the cache emptied only after that, so no loader can
    /// publish into a released tile. Calling it twice is a no-op.
    pub fn teardown(&mut self) -> Result<(), LayerError> {
        let Some(mut pool) = self.pool.take() else {
            return Ok(());
        };

        pool.pause();
        if !pool.await_paused(self.join_timeout) {
            tracing::debug!("Loaders still busy, interrupting");
        }
        pool.interrupt();
        let joined = pool.join(self.join_timeout);

        self.jobs.clear();
        self.manager.release_all();

        match joined {
            Ok(()) => {
                tracing::info!("Tile layer torn down");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Tile layer torn down with loaders still running");
                Err(e.into())
            }
        }
    }
}

impl Drop for TileLayer {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!(error = %e, "Tile layer teardown on drop failed");
        }
    }
}

impl std::fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLayer")
            .field("manager", &self.manager)
            .field("loaders", &self.loader_states())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use crate::jobs::Job;
    use crate::loader::LoadError;
    use crate::tile::test_support::CountingPayload;
    use crate::tile::TileState;
    use std::time::Instant;

    fn loading_source(job: &mut Job) -> Result<(), LoadError> {
        job.set_payload(Box::new(CountingPayload::default()));
        Ok(())
    }

    fn layer() -> TileLayer {
        TileLayer::new(
            TileManagerConfig::default(),
            LoaderConfig::default().with_threads(2),
            Arc::new(loading_source),
            Arc::new(NullEventSink),
        )
        .unwrap()
    }

    fn view() -> Viewport {
        Viewport::new(500.5 / 1024.0, 500.5 / 1024.0, 10.0, 512.0, 512.0)
    }

    fn wait_until(done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_update_loads_visible_tiles() {
        let layer = layer();
        assert!(layer.update(&view()).unwrap());
        assert!(wait_until(|| layer.manager().stats().loads_succeeded == 9));
        assert_eq!(layer.manager().stats().pending_uploads, 9);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut layer = layer();
        layer.update(&view()).unwrap();
        let tile = layer
            .manager()
            .get_tile(&crate::coord::TileKey::new(500, 500, 10).unwrap())
            .unwrap();

        layer.teardown().unwrap();
        assert!(!layer.is_running());
        assert_eq!(layer.manager().tile_count(), 0);
        assert_eq!(tile.lock_count(), 0);
        assert_ne!(tile.state(), TileState::Loading);
        assert!(matches!(layer.update(&view()), Err(LayerError::TornDown)));

        // second teardown is a no-op
        layer.teardown().unwrap();
    }

    #[test]
    fn test_paused_layer_loads_nothing() {
        let layer = layer();
        layer.pause();
        assert!(wait_until(|| layer
            .loader_states()
            .iter()
            .all(|s| *s == LoaderState::Paused)));

        layer.update(&view()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(layer.manager().stats().loads_succeeded, 0);

        layer.resume();
        assert!(wait_until(|| layer.manager().stats().loads_succeeded == 9));
    }
}
