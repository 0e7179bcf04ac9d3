//! Tile state machine.
//!
//! ```text
//! None --[queued / dequeued by a loader]--> Loading
//! Loading --[decode succeeds]--> NewData
//! Loading --[decode fails]--> Error
//! Loading --[job withdrawn or interrupted]--> None
//! NewData --[render thread uploads payload]--> Ready
//! NewData --[invalidated before upload]--> None
//! Ready --[invalidated]--> None
//! Error --[retry]--> None
//! ```
//!
//! `Loading` tiles belong to the job queue or to exactly one loader thread.
//! `NewData` and `Ready` tiles belong to the render thread while locked.

use std::fmt;

/// Lifecycle state of a [`super::Tile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TileState {
    /// No data and no job outstanding.
    #[default]
    None = 0,
    /// Queued for loading or being loaded by a loader thread.
    Loading = 1,
    /// Decoded payload waiting for upload by the render thread.
    NewData = 2,
    /// Payload uploaded and shared read-only with the render thread.
    Ready = 3,
    /// Last load failed.
    Error = 4,
}

impl TileState {
    /// Returns whether `self -> to` is an edge of the state machine.
    pub fn can_transition(self, to: TileState) -> bool {
        use TileState::*;
        matches!(
            (self, to),
            (None, Loading)
                | (Loading, NewData)
                | (Loading, Error)
                | (Loading, None)
                | (NewData, Ready)
                | (NewData, None)
                | (Ready, None)
                | (Error, None)
        )
    }

    /// Loading, new data or ready.
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TileState::Loading | TileState::NewData | TileState::Ready
        )
    }

    /// True when the tile holds a payload the render thread may read.
    #[inline]
    pub fn has_data(self) -> bool {
        matches!(self, TileState::NewData | TileState::Ready)
    }

    pub(crate) fn from_u8(value: u8) -> TileState {
        match value {
            1 => TileState::Loading,
            2 => TileState::NewData,
            3 => TileState::Ready,
            4 => TileState::Error,
            _ => TileState::None,
        }
    }
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TileState::None => "none",
            TileState::Loading => "loading",
            TileState::NewData => "new_data",
            TileState::Ready => "ready",
            TileState::Error => "error",
        };
        f.write_str(s)
    }
}
