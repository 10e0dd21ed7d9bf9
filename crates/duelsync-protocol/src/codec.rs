//! Codec trait and implementations for framing messages as bytes.
//!
//! The relay transport doesn't care HOW frames are serialized; it just
//! needs something that implements [`Codec`]. [`JsonCodec`] is the only
//! implementation: browser peers already speak JSON and the frames are small.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside long-running relay
/// tasks that Tokio may move between threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use duelsync_protocol::{Codec, Event, JsonCodec, Role};
///
/// let codec = JsonCodec;
/// let event = Event::Hello { by: Role::Host, at: 5000 };
///
/// let bytes = codec.encode(&event).unwrap();
/// let decoded: Event = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, RawEntry, Role};

    #[test]
    fn test_json_codec_frames_raw_entry() {
        let codec = JsonCodec;
        let entry = RawEntry::new(3, 1, &Event::Bye { by: Role::Guest, at: 2 }).unwrap();
        let bytes = codec.encode(&entry).unwrap();
        let back: RawEntry = codec.decode(&bytes).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_json_codec_decode_garbage_is_decode_error() {
        let result: Result<RawEntry, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
