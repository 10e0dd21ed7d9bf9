//! Error types for the protocol layer.
//!
//! Each crate in duelsync defines its own error enum. When you see a
//! `ProtocolError`, the problem is in the shape of the data, not in the
//! network or in room occupancy.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes or JSON).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes or JSON into a Rust type).
    ///
    /// Common causes: a peer on a different schema, missing fields, or a
    /// truncated frame.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A string that is not a well-formed room code.
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),
}
