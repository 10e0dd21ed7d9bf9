//! Error types for the room layer.

use duelsync_transport::AdapterError;

use crate::RoomState;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// `create`/`join` was called on a room that already started (or
    /// already left). A `Room` is single-use.
    #[error("room already started (state: {0})")]
    AlreadyStarted(RoomState),

    /// An action was attempted before `create`/`join` or after `leave`.
    #[error("room is not connected (state: {0})")]
    NotConnected(RoomState),

    /// The remote log refused the operation or could not be reached.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl RoomError {
    /// The adapter failure behind this error, if any.
    pub fn adapter(&self) -> Option<&AdapterError> {
        match self {
            Self::Adapter(e) => Some(e),
            _ => None,
        }
    }
}
