//! Per-loader control block.
//!
//! Signals are delivered as messages under the block's mutex and wake the
//! loader through its condition variable. The loader checks its queue while
//! holding the same mutex, so a [`LoaderControl::notify`] issued after
//! `set_jobs` can never fall between the emptiness check and the wait.

use std::fmt;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// What a loader thread is doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoaderState {
    /// Executing a job, or about to poll for one.
    #[default]
    Running,
    /// Blocked until resumed.
    Paused,
    /// Blocked on an empty queue.
    Waiting,
    /// Left its loop; the thread is exiting.
    Stopped,
}

impl LoaderState {
    /// Not executing a job and not about to.
    pub fn is_idle(&self) -> bool {
        !matches!(self, LoaderState::Running)
    }
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderState::Running => write!(f, "Running"),
            LoaderState::Paused => write!(f, "Paused"),
            LoaderState::Waiting => write!(f, "Waiting"),
            LoaderState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Control message for a loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoaderSignal {
    /// Finish the current job, then block.
    Pause,
    /// Continue after a pause.
    Resume,
    /// Leave the loop after the current job.
    Stop,
}

#[derive(Debug, Default)]
pub(crate) struct ControlState {
    pub state: LoaderState,
    pub pause_requested: bool,
    pub stop_requested: bool,
    /// Token of the job in flight, if any.
    pub current: Option<CancellationToken>,
}

#[derive(Debug, Default)]
pub(crate) struct LoaderControl {
    inner: Mutex<ControlState>,
    cond: Condvar,
}

impl LoaderControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock()
    }

    pub fn wait(&self, guard: &mut MutexGuard<'_, ControlState>) {
        self.cond.wait(guard);
    }

    pub fn notify(&self) {
        // taking the lock orders this wakeup after the loader's queue check
        let _guard = self.inner.lock();
        self.cond.notify_all();
    }

    pub fn notify_locked(&self) {
        self.cond.notify_all();
    }

    pub fn signal(&self, signal: LoaderSignal) {
        let mut inner = self.inner.lock();
        match signal {
            LoaderSignal::Pause => inner.pause_requested = true,
            LoaderSignal::Resume => inner.pause_requested = false,
            LoaderSignal::Stop => inner.stop_requested = true,
        }
        self.cond.notify_all();
    }

    /// Requests a stop and cancels the job in flight.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.stop_requested = true;
        if let Some(token) = &inner.current {
            token.cancel();
        }
        self.cond.notify_all();
    }

    pub fn state(&self) -> LoaderState {
        self.inner.lock().state
    }

    /// Blocks until `done` holds for the loader state or `deadline` passes.
    pub fn wait_for_state(&self, deadline: Instant, done: impl Fn(LoaderState) -> bool) -> bool {
        let mut inner = self.inner.lock();
        while !done(inner.state) {
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                return done(inner.state);
            }
        }
        true
    }
}
