//! Wire vocabulary for duelsync.
//!
//! This crate defines what two peers say to each other through the shared
//! event log:
//!
//! - **Types** ([`Event`], [`Role`], [`Phase`], [`RawEntry`], [`LogEntry`]):
//!   the tagged event union and the records a log stores.
//! - **Room codes** ([`RoomCode`], [`build_invite`], [`parse_room_code`]):
//!   the short human-shareable addresses and their invite links.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! The protocol layer has no I/O and no business logic. It doesn't know
//! about connections, presence, or turns, only about the shape of the
//! messages.
//!
//! ```text
//! Room orchestrator (Event) → Protocol (RawEntry / bytes) → Transport (log)
//! ```

mod code;
mod codec;
mod error;
mod types;

pub use code::{build_invite, parse_room_code, RoomCode, CODE_ALPHABET, CODE_LEN, INVITE_PREFIX};
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    now_millis, Event, LogEntry, Phase, Presence, RawEntry, RematchAction, Role,
    ShotOutcome,
};
