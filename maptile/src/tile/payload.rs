//! Renderable tile content.
//!
//! Decoding is done by the [`crate::loader::TileSource`] collaborator. The
//! tile subsystem only needs two capabilities from the result: hand it to
//! the GPU once, and free it when the tile goes away.

use std::fmt;

/// Broad category of a payload, for logging and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Bitmap,
    Vector,
    Other,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Bitmap => f.write_str("bitmap"),
            PayloadKind::Vector => f.write_str("vector"),
            PayloadKind::Other => f.write_str("other"),
        }
    }
}

/// Decoded content of a tile.
///
/// Written by exactly one loader thread, then owned by the render thread
/// once the tile is published as new data.
pub trait TilePayload: Send + Sync {
    fn kind(&self) -> PayloadKind;

    /// Uploads the content to the renderer.
    ///
    /// Returns `false` when the upload failed; the tile is still marked
    /// ready so it is not uploaded again every frame.
    fn upload(&mut self) -> bool;

    /// Frees renderer and decoder resources. Called once before drop.
    fn release(&mut self);

    /// Approximate memory held, used for statistics only.
    fn size_bytes(&self) -> usize {
        0
    }
}
