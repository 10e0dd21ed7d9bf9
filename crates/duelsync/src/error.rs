//! Unified error type for duelsync.

use duelsync_protocol::ProtocolError;
use duelsync_room::RoomError;
use duelsync_session::SessionError;
use duelsync_transport::{AdapterError, TransportError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `duelsync` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls `?` relies on.
#[derive(Debug, thiserror::Error)]
pub enum DuelsyncError {
    /// A connection-level failure (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode/decode failures and invalid room codes.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The remote log refused an operation.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Room lifecycle misuse, or an adapter failure during a room action.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A state snapshot could not be applied.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Connection options are incomplete.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DuelsyncError {
    /// The adapter failure behind this error, looking through room errors.
    pub fn adapter_error(&self) -> Option<&AdapterError> {
        match self {
            Self::Adapter(e) => Some(e),
            Self::Room(e) => e.adapter(),
            _ => None,
        }
    }

    /// Returns `true` for connection failures, the only class worth
    /// offering a "retry" for. Nothing in duelsync retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_)) || self.adapter_error().is_some_and(AdapterError::is_transport)
    }

    /// A short message suitable for showing to a player.
    pub fn user_message(&self) -> &'static str {
        if let Some(adapter) = self.adapter_error() {
            return match adapter {
                AdapterError::HostTaken => "this room already has a host",
                AdapterError::GuestTaken => "this room already has a guest",
                AdapterError::RoomNotFound(_) => "room not found",
                AdapterError::AlreadyExistsDifferentOwner(_) => "that room code belongs to another game",
                AdapterError::EpochRegression { .. } => "the game moved on, please rejoin",
                AdapterError::Transport(_) => "connection problem, please retry",
                AdapterError::Rejected(_) | AdapterError::Protocol(_) => "the server refused that move",
            };
        }
        match self {
            Self::Transport(_) => "connection problem, please retry",
            Self::Protocol(ProtocolError::InvalidRoomCode(_)) => "that doesn't look like a room code",
            Self::Protocol(_) => "received something this version doesn't understand",
            Self::Room(RoomError::AlreadyStarted(_)) => "already in a room",
            Self::Room(_) => "not connected to a room",
            Self::Session(_) => "could not restore the game, please rejoin",
            Self::Config(_) => "no game server configured",
            Self::Adapter(_) => "the server refused that move",
        }
    }
}

#[cfg(test)]
mod tests {
    use duelsync_protocol::RoomCode;
    use duelsync_room::RoomState;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let duelsync_err: DuelsyncError = err.into();
        assert!(matches!(duelsync_err, DuelsyncError::Transport(_)));
        assert!(duelsync_err.to_string().contains("gone"));
        assert!(duelsync_err.is_retryable());
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let duelsync_err: DuelsyncError = err.into();
        assert!(matches!(duelsync_err, DuelsyncError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::UnsupportedSnapshotVersion { found: 2, expected: 1 };
        let duelsync_err: DuelsyncError = err.into();
        assert!(matches!(duelsync_err, DuelsyncError::Session(_)));
    }

    #[test]
    fn test_user_message_distinguishes_occupancy_and_not_found() {
        let host: DuelsyncError = RoomError::from(AdapterError::HostTaken).into();
        let guest: DuelsyncError = AdapterError::GuestTaken.into();
        let missing: DuelsyncError = AdapterError::RoomNotFound(RoomCode::parse("ZZZZ").unwrap()).into();

        assert_eq!(host.user_message(), "this room already has a host");
        assert_eq!(guest.user_message(), "this room already has a guest");
        assert_eq!(missing.user_message(), "room not found");
        assert!(!host.is_retryable());
    }

    #[test]
    fn test_user_message_for_transport_through_room() {
        let err: DuelsyncError = RoomError::from(AdapterError::from(TransportError::ConnectionClosed(
            "reset".into(),
        )))
        .into();
        assert_eq!(err.user_message(), "connection problem, please retry");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_user_message_for_logic_errors() {
        let err: DuelsyncError = RoomError::AlreadyStarted(RoomState::Connected).into();
        assert_eq!(err.user_message(), "already in a room");
    }
}
