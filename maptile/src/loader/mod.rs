//! Loader threads.
//!
//! Each loader is a small state machine on its own OS thread: it waits for
//! work on the shared [`JobQueue`](crate::jobs::JobQueue), runs one job at a
//! time through the [`TileSource`], and hands the finished job to a
//! [`JobCompletion`] (the tile manager). Pause, resume and stop are explicit
//! [`LoaderSignal`]s; interrupting a loader also cancels the
//! [`CancellationToken`](tokio_util::sync::CancellationToken) of the job in
//! flight.
//!
//! Failures never leave a loader: source errors and panics are caught per
//! job and reported through [`JobCompletion::job_failed`].

mod config;
mod control;
mod pool;
mod source;
mod worker;

pub use config::{
    default_threads, LoaderConfig, DEFAULT_JOIN_TIMEOUT, MAX_DEFAULT_THREADS, MIN_DEFAULT_THREADS,
};
pub use control::{LoaderSignal, LoaderState};
pub use pool::LoaderPool;
pub use source::{LoadError, TileSource};

use thiserror::Error;

use crate::jobs::Job;

/// Receives jobs once a loader is done with them.
///
/// Exactly one of the three methods is called for every polled job.
pub trait JobCompletion: Send + Sync {
    /// The source stored a payload in the job.
    fn pass_tile(&self, job: Job);

    /// The source failed or panicked.
    fn job_failed(&self, job: Job, error: LoadError);

    /// The loader was interrupted while the job ran.
    fn job_cancelled(&self, job: Job);
}

/// Errors managing loader threads.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to spawn loader thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{pending} loader(s) did not stop before the timeout")]
    JoinTimeout { pending: usize },
}
