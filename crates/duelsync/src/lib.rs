//! # duelsync
//!
//! Two-party turn-based game synchronization over a shared, append-only
//! event log.
//!
//! There is no game server. A host and a guest each append events to the
//! same per-room log and both replay it in the same order, so each side's
//! copy of the game converges without anyone arbitrating. duelsync handles
//! the parts every such game needs:
//!
//! - rooms addressed by short codes and invite links
//! - presence, so a room holds at most one host and one guest
//! - ordered dispatch of everyone's events, including your own
//! - a ready gate, turn passing, rematches and epoch fencing
//! - state snapshots for peers that join late or reload
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duelsync::prelude::*;
//!
//! # async fn run() -> Result<(), DuelsyncError> {
//! let code = RoomCode::generate();
//! println!("invite: {}", build_invite(&code));
//!
//! let adapter = connect().await?; // reads DUELSYNC_RELAY_URL
//! let mut room = Room::new(adapter, code, Role::Host);
//! let mut game = GameSession::new(Role::Host);
//! room.create().await?;
//!
//! room.ready(true).await?;
//! while let Some(Dispatched::Delivered { .. }) = room.dispatch_next().await {
//!     // feed entries into `game` from an `on_entry` handler, render, etc.
//!     # break;
//! }
//! # let _ = &mut game;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | crate | re-exported as |
//! |---|---|
//! | `duelsync-protocol` | [`protocol`] |
//! | `duelsync-transport` | [`transport`] |
//! | `duelsync-room` | [`room`] |
//! | `duelsync-session` | [`session`] |

mod connect;
mod error;
mod logging;
mod relay;

pub use connect::{connect, AnyAdapter, ConnectOptions, NAMESPACE_ENV, RELAY_URL_ENV};
pub use error::DuelsyncError;
pub use logging::{init_tracing, DEFAULT_LOG_FILTER};
pub use relay::{RelayServer, RelayServerBuilder};

pub use duelsync_protocol as protocol;
pub use duelsync_room as room;
pub use duelsync_session as session;
pub use duelsync_transport as transport;

/// Everything a game needs in one import.
pub mod prelude {
    pub use crate::{
        connect, init_tracing, AnyAdapter, ConnectOptions, DuelsyncError, RelayServer,
    };
    pub use duelsync_protocol::{
        build_invite, parse_room_code, Event, LogEntry, Phase, Presence, RematchAction, Role,
        RoomCode, ShotOutcome,
    };
    pub use duelsync_room::{Dispatched, Room, RoomConfig, RoomError, RoomHandlers, RoomState};
    pub use duelsync_session::{
        GameSession, PeerStatus, RematchState, SessionConfig, SessionSnapshot,
    };
    pub use duelsync_transport::{LogAdapter, MemoryAdapter, MemoryLog};
    pub use std::time::Duration;
}
