//! Tile load jobs and the shared queue loaders pull them from.

mod job;
mod queue;

pub use job::Job;
pub use queue::JobQueue;
