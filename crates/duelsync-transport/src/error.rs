//! Error types for the transport layer.

use duelsync_protocol::{ProtocolError, Role, RoomCode};

/// Failures of the underlying connection.
///
/// These are propagated to callers unchanged. Retry policy interacts with
/// idempotency, so it is left to whoever knows the game's tolerance for
/// duplicate or late events.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Opening a connection to the remote log failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}

/// Errors returned by a [`LogAdapter`](crate::LogAdapter).
///
/// The first group are refusals by the log itself (recoverable, surfaced
/// to the caller, never retried automatically). `Transport` and `Protocol`
/// wrap lower-level failures.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// `join`/`append`/`subscribe` against a room that was never created.
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// `create` found the room already registered with conflicting metadata.
    #[error("room {0} already exists under a different owner")]
    AlreadyExistsDifferentOwner(RoomCode),

    /// Another live connection holds the host slot.
    #[error("host slot is already taken")]
    HostTaken,

    /// Another live connection holds the guest slot.
    #[error("guest slot is already taken")]
    GuestTaken,

    /// An `epoch{n}` that does not advance past the room's current epoch.
    #[error("epoch {requested} does not advance past current epoch {current}")]
    EpochRegression { current: u64, requested: u64 },

    /// The remote log refused the request for a reason it only described.
    #[error("rejected by remote log: {0}")]
    Rejected(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl AdapterError {
    /// The occupancy conflict for `role`.
    pub fn taken(role: Role) -> Self {
        match role {
            Role::Host => Self::HostTaken,
            Role::Guest => Self::GuestTaken,
        }
    }

    /// Returns `true` for `HostTaken` / `GuestTaken`.
    pub fn is_occupancy_conflict(&self) -> bool {
        matches!(self, Self::HostTaken | Self::GuestTaken)
    }

    /// Returns `true` if the failure came from the connection rather than
    /// from the log's rules.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
