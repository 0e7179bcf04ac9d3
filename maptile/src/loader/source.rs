//! Contract between loaders and the data source that fetches and decodes
//! tile content.

use thiserror::Error;

use crate::coord::TileKey;
use crate::jobs::Job;

/// Why a tile could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Tile {0} not available from source")]
    NotFound(TileKey),

    #[error("Load cancelled")]
    Cancelled,

    #[error("Source reported success without a payload")]
    MissingPayload,

    #[error("Source panicked: {0}")]
    Panicked(String),
}

impl LoadError {
    /// Failures worth retrying after a cooldown.
    pub fn is_transient(&self) -> bool {
        matches!(self, LoadError::Io(_) | LoadError::Panicked(_))
    }
}

/// Fetches and decodes tiles.
///
/// Implementations are shared by every loader thread of a layer. On success
/// `execute_job` must store the decoded content with
/// [`Job::set_payload`]; the tile itself is published by the tile manager.
/// Long running sources should watch [`Job::cancel_token`] and return
/// [`LoadError::Cancelled`] once it fires.
pub trait TileSource: Send + Sync {
    fn execute_job(&self, job: &mut Job) -> Result<(), LoadError>;
}

impl<F> TileSource for F
where
    F: Fn(&mut Job) -> Result<(), LoadError> + Send + Sync,
{
    fn execute_job(&self, job: &mut Job) -> Result<(), LoadError> {
        self(job)
    }
}
