//! Remote event log adapters for duelsync.
//!
//! Provides the [`LogAdapter`] trait that abstracts an ordered, append-only,
//! multi-reader log keyed by room code, plus two implementations:
//!
//! - [`MemoryLog`] / [`MemoryAdapter`]: the in-process reference log. Each
//!   adapter is one independent connection to a shared hub.
//! - [`LogServer`] / [`WebSocketAdapter`]: the same log served over
//!   WebSocket, so two peers on different machines can share a room.
//!
//! # Feature Flags
//!
//! - `websocket` (default): relay server and client via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod relay;
#[cfg(feature = "websocket")]
mod websocket;
#[cfg(feature = "websocket")]
mod wire;

pub use error::{AdapterError, TransportError};
pub use memory::{MemoryAdapter, MemoryLog, DEFAULT_NAMESPACE, DEFAULT_PRESENCE_TTL};
#[cfg(feature = "websocket")]
pub use relay::{LogServer, DEFAULT_IDLE_TIMEOUT};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketAdapter, PING_INTERVAL};

use std::fmt;

use duelsync_protocol::{Event, Presence, RawEntry, RoomCode};
use tokio::sync::mpsc;

/// Opaque identifier for one connection to a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The contract every remote log backend fulfils.
///
/// The room orchestrator depends only on this trait, never on a concrete
/// transport, so a different backing store can be substituted without
/// touching it.
///
/// # Presence and disconnect cleanup
///
/// Appending `hello{by}` atomically checks and claims `by`'s presence slot.
/// A successful claim also registers a best-effort cleanup: if the
/// connection vanishes without `leave`, the slot is released and a
/// `bye{by}` is appended on its behalf. Backends that cannot detect
/// disconnects natively fall back to presence freshness: a claim not
/// refreshed (by any append or [`heartbeat`](Self::heartbeat)) within the
/// backend's TTL counts as free.
pub trait LogAdapter: Send + Sync + 'static {
    /// Idempotently ensures the room exists and returns its current epoch.
    ///
    /// # Errors
    /// [`AdapterError::AlreadyExistsDifferentOwner`] if the room exists with
    /// conflicting metadata.
    async fn create(&self, room: &RoomCode) -> Result<u64, AdapterError>;

    /// Checks that the room exists and returns its current epoch.
    ///
    /// # Errors
    /// [`AdapterError::RoomNotFound`] if the room was never created.
    async fn join(&self, room: &RoomCode) -> Result<u64, AdapterError>;

    /// Detaches this connection's subscriptions to the room and releases its
    /// presence slots there. Safe to call any number of times.
    async fn leave(&self, room: &RoomCode) -> Result<(), AdapterError>;

    /// Appends an event stamped with the appender's observed `epoch` and
    /// returns its sequence number.
    ///
    /// # Errors
    /// - [`AdapterError::HostTaken`] / [`AdapterError::GuestTaken`] for a
    ///   `hello` whose slot is held by another live connection; nothing is
    ///   appended.
    /// - [`AdapterError::EpochRegression`] for an `epoch{n}` that does not
    ///   exceed the room's current epoch.
    /// - [`AdapterError::RoomNotFound`] if the room doesn't exist.
    async fn append(&self, room: &RoomCode, epoch: u64, event: &Event)
        -> Result<u64, AdapterError>;

    /// Streams every entry of the room: the backlog first, then live
    /// appends, in append order, including this connection's own appends.
    async fn subscribe(&self, room: &RoomCode) -> Result<Subscription, AdapterError>;

    /// Current occupancy of the room. Stale claims read as free.
    async fn presence(&self, room: &RoomCode) -> Result<Presence, AdapterError>;

    /// Refreshes this connection's presence claims in the room.
    ///
    /// Default: no-op, for backends whose disconnect detection is exact.
    async fn heartbeat(&self, _room: &RoomCode) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// A live stream of a room's log entries.
///
/// Dropping the subscription unsubscribes; [`unsubscribe`](Self::unsubscribe)
/// does the same explicitly.
#[derive(Debug)]
pub struct Subscription {
    room: RoomCode,
    rx: mpsc::UnboundedReceiver<RawEntry>,
}

impl Subscription {
    /// Wraps the receiving half of a backend's delivery channel.
    pub fn new(room: RoomCode, rx: mpsc::UnboundedReceiver<RawEntry>) -> Self {
        Self { room, rx }
    }

    /// The room this subscription follows.
    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    /// Waits for the next entry. Returns `None` once the backend has
    /// detached the subscription (leave, disconnect).
    ///
    /// Cancel-safe: dropping the future never loses an entry.
    pub async fn recv(&mut self) -> Option<RawEntry> {
        self.rx.recv().await
    }

    /// Returns the next entry if one has already arrived.
    pub fn try_recv(&mut self) -> Option<RawEntry> {
        self.rx.try_recv().ok()
    }

    /// Stops delivery. Entries already buffered are discarded.
    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}
