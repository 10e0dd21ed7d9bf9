//! Room orchestration for duelsync.
//!
//! A [`Room`] is one peer's handle on one shared room log. It claims a
//! role, turns game actions into appended events, and routes incoming
//! entries to the [`RoomHandlers`] game logic registered.
//!
//! # Key types
//!
//! - [`Room`]: lifecycle (`create`/`join`/`leave`), actions, dispatch
//! - [`RoomHandlers`]: named callback slots, one per event tag
//! - [`Dispatched`]: what happened to each entry (delivered or why not)
//! - [`RoomConfig`]: epoch fencing and `bye` announcement switches
//! - [`RoomState`]: `Idle → Connected → Left`

mod config;
mod error;
mod handlers;
mod room;

pub use config::{RoomConfig, RoomState};
pub use error::RoomError;
pub use handlers::RoomHandlers;
pub use room::{Dispatched, IgnoreReason, Room};
