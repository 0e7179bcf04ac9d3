//! Fixed pool of loader threads sharing one job queue.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::control::LoaderControl;
use super::worker::Loader;
use super::{JobCompletion, LoaderConfig, LoaderError, LoaderSignal, LoaderState, TileSource};
use crate::events::TileEventSink;
use crate::jobs::JobQueue;

struct LoaderHandle {
    name: String,
    control: Arc<LoaderControl>,
    thread: Option<JoinHandle<()>>,
}

/// Loader threads pulling from a shared [`JobQueue`].
///
/// Loaders block while the queue is empty; call [`LoaderPool::notify`]
/// after every `set_jobs`. Dropping the pool interrupts and joins every
/// loader with the configured timeout.
pub struct LoaderPool {
    loaders: Vec<LoaderHandle>,
    join_timeout: Duration,
}

impl LoaderPool {
    /// Spawns `config.threads` loaders.
    ///
    /// If a thread cannot be spawned the loaders already started are
    /// stopped again before the error is returned.
    pub fn start(
        config: &LoaderConfig,
        queue: Arc<JobQueue>,
        completion: Arc<dyn JobCompletion>,
        source: Arc<dyn TileSource>,
        events: Arc<dyn TileEventSink>,
    ) -> Result<Self, LoaderError> {
        let mut pool = Self {
            loaders: Vec::with_capacity(config.threads),
            join_timeout: config.join_timeout,
        };

        for id in 0..config.threads.max(1) {
            let name = format!("{}-{}", config.thread_name, id);
            let control = Arc::new(LoaderControl::new());
            let loader = Loader {
                id,
                control: Arc::clone(&control),
                queue: Arc::clone(&queue),
                completion: Arc::clone(&completion),
                source: Arc::clone(&source),
                events: Arc::clone(&events),
            };

            let thread = thread::Builder::new()
                .name(name.clone())
                .spawn(move || loader.run())
                .map_err(|source| LoaderError::Spawn {
                    name: name.clone(),
                    source,
                })?;

            pool.loaders.push(LoaderHandle {
                name,
                control,
                thread: Some(thread),
            });
        }

        tracing::info!(threads = pool.loaders.len(), "Loader pool started");
        Ok(pool)
    }

    /// Wakes loaders waiting on an empty queue.
    pub fn notify(&self) {
        for loader in &self.loaders {
            loader.control.notify();
        }
    }

    /// Asks every loader to pause after its current job.
    pub fn pause(&self) {
        self.signal(LoaderSignal::Pause);
    }

    /// Waits until every loader is paused or stopped.
    ///
    /// Returns `false` if some loader was still running at the timeout.
    pub fn await_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.loaders.iter().all(|loader| {
            loader.control.wait_for_state(deadline, |s| {
                matches!(s, LoaderState::Paused | LoaderState::Stopped)
            })
        })
    }

    pub fn resume(&self) {
        self.signal(LoaderSignal::Resume);
    }

    /// Stops every loader and cancels jobs in flight.
    pub fn interrupt(&self) {
        for loader in &self.loaders {
            loader.control.interrupt();
        }
    }

    /// Waits for loaders to stop, then joins their threads.
    ///
    /// Call after [`LoaderPool::interrupt`]. Loaders still running at the
    /// timeout are detached and counted in the error.
    pub fn join(&mut self, timeout: Duration) -> Result<(), LoaderError> {
        let deadline = Instant::now() + timeout;
        let mut pending = 0;

        for loader in &mut self.loaders {
            let Some(thread) = loader.thread.take() else {
                continue;
            };
            let stopped = loader
                .control
                .wait_for_state(deadline, |s| s == LoaderState::Stopped);

            if !stopped {
                tracing::warn!(loader = %loader.name, "Loader did not stop in time, detaching");
                pending += 1;
                continue;
            }
            if thread.join().is_err() {
                tracing::warn!(loader = %loader.name, "Loader thread panicked");
            }
        }

        if pending > 0 {
            return Err(LoaderError::JoinTimeout { pending });
        }
        tracing::debug!("Loader pool joined");
        Ok(())
    }

    pub fn states(&self) -> Vec<LoaderState> {
        self.loaders.iter().map(|l| l.control.state()).collect()
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// True while any loader thread has not been joined.
    pub fn is_running(&self) -> bool {
        self.loaders
            .iter()
            .any(|l| l.thread.as_ref().is_some_and(|t| !t.is_finished()))
    }

    fn signal(&self, signal: LoaderSignal) {
        for loader in &self.loaders {
            loader.control.signal(signal);
        }
    }
}

impl Drop for LoaderPool {
    fn drop(&mut self) {
        if self.loaders.iter().all(|l| l.thread.is_none()) {
            return;
        }
        self.interrupt();
        if let Err(e) = self.join(self.join_timeout) {
            tracing::warn!(error = %e, "Loader pool dropped with running loaders");
        }
    }
}

impl std::fmt::Debug for LoaderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderPool")
            .field("loaders", &self.loaders.len())
            .field("states", &self.states())
            .finish()
    }
}
