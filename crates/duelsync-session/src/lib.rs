//! Game session state for duelsync peers.
//!
//! The room layer only delivers events. This crate holds the contract both
//! peers must implement identically on top of that delivery to agree on
//! the game without a central arbiter:
//!
//! 1. **Ready gate**: `place → play` once both sides said `ready`, host first
//! 2. **Turns**: the defender moves after reporting a `result`
//! 3. **Rematch and epochs**: negotiated restarts and fresh generations
//! 4. **Presence grace**: how long to wait for a vanished peer
//! 5. **Resync**: versioned snapshots for `state` events
//!
//! # How it fits in the stack
//!
//! ```text
//! Game logic (above)   ← reads turn/phase, renders boards
//!     ↕
//! Session (this crate) ← folds events into agreed state
//!     ↕
//! Room (below)         ← dispatches log entries in order
//! ```

mod config;
mod error;
mod session;
mod snapshot;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{GameSession, PeerStatus, RematchState, Revealed};
pub use snapshot::{Readiness, ResultRecord, SessionSnapshot, ShotRecord, SNAPSHOT_VERSION};
