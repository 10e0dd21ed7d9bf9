//! Frames exchanged between [`WebSocketAdapter`](crate::WebSocketAdapter)
//! and [`LogServer`](crate::LogServer).
//!
//! Every client request carries an `id` that the matching reply echoes, so
//! requests can be pipelined. Entry frames are pushed unsolicited and name
//! the client-chosen subscription they belong to.

use duelsync_protocol::{Presence, RawEntry, RoomCode};
use serde::{Deserialize, Serialize};

use crate::AdapterError;

/// Client → relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ClientFrame {
    Request { id: u64, op: Op },
    /// Keep-alive. Also refreshes nothing by itself; presence is refreshed
    /// by `Heartbeat`.
    Ping,
}

/// A log operation, mirroring [`LogAdapter`](crate::LogAdapter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Op {
    Create { room: RoomCode, namespace: String },
    Join { room: RoomCode },
    Leave { room: RoomCode },
    Append {
        room: RoomCode,
        epoch: u64,
        event: serde_json::Value,
    },
    Subscribe { room: RoomCode, sub: u64 },
    Presence { room: RoomCode },
    Heartbeat { room: RoomCode },
}

/// Relay → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ServerFrame {
    Reply {
        id: u64,
        result: Result<Reply, WireError>,
    },
    Entry { sub: u64, entry: RawEntry },
    /// The relay stopped feeding `sub` (the client left the room).
    SubscriptionClosed { sub: u64 },
    Pong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Reply {
    Epoch { epoch: u64 },
    Appended { seq: u64 },
    Presence { presence: Presence },
    Done,
}

/// Adapter errors as they cross the wire.
///
/// Transport and codec failures are local to each side, so they collapse
/// into `Rejected` with a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum WireError {
    RoomNotFound { room: RoomCode },
    AlreadyExistsDifferentOwner { room: RoomCode },
    HostTaken,
    GuestTaken,
    EpochRegression { current: u64, requested: u64 },
    Rejected { message: String },
}

impl From<&AdapterError> for WireError {
    fn from(err: &AdapterError) -> Self {
        match err {
            AdapterError::RoomNotFound(room) => Self::RoomNotFound { room: room.clone() },
            AdapterError::AlreadyExistsDifferentOwner(room) => {
                Self::AlreadyExistsDifferentOwner { room: room.clone() }
            }
            AdapterError::HostTaken => Self::HostTaken,
            AdapterError::GuestTaken => Self::GuestTaken,
            AdapterError::EpochRegression { current, requested } => Self::EpochRegression {
                current: *current,
                requested: *requested,
            },
            other => Self::Rejected {
                message: other.to_string(),
            },
        }
    }
}

impl From<WireError> for AdapterError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::RoomNotFound { room } => Self::RoomNotFound(room),
            WireError::AlreadyExistsDifferentOwner { room } => {
                Self::AlreadyExistsDifferentOwner(room)
            }
            WireError::HostTaken => Self::HostTaken,
            WireError::GuestTaken => Self::GuestTaken,
            WireError::EpochRegression { current, requested } => {
                Self::EpochRegression { current, requested }
            }
            WireError::Rejected { message } => Self::Rejected(message),
        }
    }
}
