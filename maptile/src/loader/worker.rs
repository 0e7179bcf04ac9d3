//! Loader thread body.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::MutexGuard;
use tokio_util::sync::CancellationToken;

use super::control::{ControlState, LoaderControl};
use super::{JobCompletion, LoadError, LoaderState, TileSource};
use crate::events::{TileEvent, TileEventSink};
use crate::jobs::{Job, JobQueue};

pub(crate) struct Loader {
    pub id: usize,
    pub control: Arc<LoaderControl>,
    pub queue: Arc<JobQueue>,
    pub completion: Arc<dyn JobCompletion>,
    pub source: Arc<dyn TileSource>,
    pub events: Arc<dyn TileEventSink>,
}

/// Marks the loader stopped however the thread exits.
struct StoppedOnExit<'a>(&'a Loader);

impl Drop for StoppedOnExit<'_> {
    fn drop(&mut self) {
        let loader = self.0;
        let mut inner = loader.control.lock();
        inner.current = None;
        loader.set_state(&mut inner, LoaderState::Stopped);
    }
}

impl Loader {
    pub fn run(self) {
        tracing::debug!(loader = self.id, "Loader started");
        let _stopped = StoppedOnExit(&self);

        while let Some(job) = self.next_job() {
            self.execute(job);
        }

        tracing::debug!(loader = self.id, "Loader stopped");
    }

    /// Blocks until a job is available. `None` once a stop is requested.
    fn next_job(&self) -> Option<Job> {
        let mut inner = self.control.lock();
        loop {
            if inner.stop_requested {
                return None;
            }
            if inner.pause_requested {
                self.set_state(&mut inner, LoaderState::Paused);
                self.control.wait(&mut inner);
                continue;
            }
            if self.queue.is_empty() {
                self.set_state(&mut inner, LoaderState::Waiting);
                self.control.wait(&mut inner);
                continue;
            }

            self.set_state(&mut inner, LoaderState::Running);
            if let Some(mut job) = self.queue.poll() {
                let token = CancellationToken::new();
                job.attach_cancel(token.clone());
                inner.current = Some(token);
                return Some(job);
            }
        }
    }

    fn execute(&self, mut job: Job) {
        let key = job.key();
        tracing::trace!(loader = self.id, tile = %key, "Executing job");

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.source.execute_job(&mut job)))
            .unwrap_or_else(|payload| Err(LoadError::Panicked(panic_message(payload.as_ref()))));

        self.control.lock().current = None;

        if job.is_cancelled() {
            self.completion.job_cancelled(job);
            return;
        }

        match result {
            Ok(()) if job.has_payload() => self.completion.pass_tile(job),
            Ok(()) => self.completion.job_failed(job, LoadError::MissingPayload),
            Err(LoadError::Cancelled) => self.completion.job_cancelled(job),
            Err(e) => {
                tracing::debug!(loader = self.id, tile = %key, error = %e, "Job failed");
                self.completion.job_failed(job, e);
            }
        }
    }

    fn set_state(&self, inner: &mut MutexGuard<'_, ControlState>, state: LoaderState) {
        if inner.state == state {
            return;
        }
        inner.state = state;
        self.control.notify_locked();
        self.events.emit(TileEvent::LoaderStateChanged {
            loader: self.id,
            state,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
