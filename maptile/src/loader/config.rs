//! Loader pool configuration.

use std::time::Duration;

/// Lower bound for the default thread count.
pub const MIN_DEFAULT_THREADS: usize = 2;

/// Upper bound for the default thread count.
pub const MAX_DEFAULT_THREADS: usize = 4;

/// Default time to wait for loaders to finish on teardown.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings for a [`super::LoaderPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Number of loader threads.
    pub threads: usize,
    /// How long teardown waits for loaders to stop.
    pub join_timeout: Duration,
    /// Thread name prefix, suffixed with the loader index.
    pub thread_name: String,
}

impl LoaderConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            thread_name: "tile-loader".to_string(),
        }
    }
}

/// Available parallelism clamped to a small fixed pool.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_DEFAULT_THREADS)
        .clamp(MIN_DEFAULT_THREADS, MAX_DEFAULT_THREADS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threads_in_range() {
        let n = default_threads();
        assert!((MIN_DEFAULT_THREADS..=MAX_DEFAULT_THREADS).contains(&n));
    }

    #[test]
    fn test_with_threads_never_zero() {
        assert_eq!(LoaderConfig::default().with_threads(0).threads, 1);
        assert_eq!(LoaderConfig::default().with_threads(3).threads, 3);
    }
}
