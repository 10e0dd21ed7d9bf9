//! In-process reference implementation of the remote log.
//!
//! [`MemoryLog`] is the shared "database": a map from room code to an
//! ordered entry list and a presence map. [`MemoryAdapter`] is one
//! connection to it. Two adapters from the same log behave like two
//! browsers talking to the same backend, which is what the tests (and the
//! WebSocket relay) need.
//!
//! # Locking
//!
//! One `std::sync::Mutex` guards the whole hub. Every operation is a short,
//! synchronous critical section that never spans an `.await`, which is what
//! makes the `hello` check-and-claim atomic: no two connections can both
//! observe a free slot.
//!
//! # Presence
//!
//! The log knows exactly which connections are attached, so a claim held by
//! an attached connection never expires, however quiet it is. The presence
//! TTL only governs claims whose connection went away without the log
//! being told (see [`MemoryAdapter::vanish`]).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use duelsync_protocol::{
    now_millis, Event, Presence, ProtocolError, RawEntry, Role, RoomCode,
};
use tokio::sync::mpsc;

use crate::{AdapterError, ConnectionId, LogAdapter, Subscription};

/// How long a presence claim stays valid without a refresh.
pub const DEFAULT_PRESENCE_TTL: Duration = Duration::from_secs(90);

/// Metadata tag rooms are created under unless the caller picks another.
pub const DEFAULT_NAMESPACE: &str = "battleship";

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Hub internals
// ---------------------------------------------------------------------------

struct Claim {
    conn: ConnectionId,
    last_seen: Instant,
}

/// Decides whether a claim still holds its slot.
#[derive(Clone, Copy)]
struct Liveness<'a> {
    attached: &'a HashSet<ConnectionId>,
    ttl: Duration,
}

impl Liveness<'_> {
    fn holds(&self, claim: &Claim) -> bool {
        self.attached.contains(&claim.conn) || claim.last_seen.elapsed() < self.ttl
    }
}

struct Subscriber {
    conn: ConnectionId,
    tx: mpsc::UnboundedSender<RawEntry>,
}

struct RoomLog {
    namespace: String,
    entries: Vec<RawEntry>,
    /// Highest epoch marker appended so far. Rooms start at epoch 1.
    epoch: u64,
    host: Option<Claim>,
    guest: Option<Claim>,
    subscribers: Vec<Subscriber>,
}

impl RoomLog {
    fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            entries: Vec::new(),
            epoch: 1,
            host: None,
            guest: None,
            subscribers: Vec::new(),
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Claim> {
        match role {
            Role::Host => &mut self.host,
            Role::Guest => &mut self.guest,
        }
    }

    /// Check-and-set on a presence slot. The caller holds the hub lock.
    fn claim(&mut self, role: Role, conn: ConnectionId, live: Liveness<'_>) -> Result<(), AdapterError> {
        let slot = self.slot_mut(role);
        let held_by_other = slot
            .as_ref()
            .is_some_and(|claim| claim.conn != conn && live.holds(claim));
        if held_by_other {
            return Err(AdapterError::taken(role));
        }
        if slot.as_ref().is_some_and(|claim| claim.conn != conn) {
            tracing::warn!(%role, %conn, "taking over stale presence claim");
        }
        *slot = Some(Claim {
            conn,
            last_seen: Instant::now(),
        });
        Ok(())
    }

    fn refresh(&mut self, conn: ConnectionId) {
        for claim in [&mut self.host, &mut self.guest].into_iter().flatten() {
            if claim.conn == conn {
                claim.last_seen = Instant::now();
            }
        }
    }

    /// Releases every slot `conn` holds and returns the roles it held.
    fn release(&mut self, conn: ConnectionId) -> Vec<Role> {
        let mut released = Vec::new();
        for role in [Role::Host, Role::Guest] {
            let slot = self.slot_mut(role);
            if slot.as_ref().is_some_and(|claim| claim.conn == conn) {
                *slot = None;
                released.push(role);
            }
        }
        released
    }

    fn presence(&self, live: Liveness<'_>) -> Presence {
        Presence {
            host: self.host.as_ref().is_some_and(|c| live.holds(c)),
            guest: self.guest.as_ref().is_some_and(|c| live.holds(c)),
        }
    }

    /// Appends a record and fans it out to live subscribers, dropping any
    /// whose receiver is gone.
    fn push(&mut self, epoch: u64, event: serde_json::Value) -> u64 {
        let seq = self.entries.len() as u64 + 1;
        let entry = RawEntry { seq, epoch, event };
        self.subscribers.retain(|sub| sub.tx.send(entry.clone()).is_ok());
        self.entries.push(entry);
        seq
    }
}

struct Hub {
    rooms: HashMap<RoomCode, RoomLog>,
    /// Connections opened and not yet disconnected.
    attached: HashSet<ConnectionId>,
    presence_ttl: Duration,
}

// ---------------------------------------------------------------------------
// MemoryLog
// ---------------------------------------------------------------------------

/// The shared in-memory log. Cheap to clone; clones share the same rooms.
///
/// The `pub` methods taking a [`ConnectionId`] are the primitive operations
/// both [`MemoryAdapter`] and the WebSocket relay are built from.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<Mutex<Hub>>,
}

impl MemoryLog {
    /// Creates an empty log with the default presence TTL.
    pub fn new() -> Self {
        Self::with_presence_ttl(DEFAULT_PRESENCE_TTL)
    }

    /// Creates an empty log where claims of connections that vanished
    /// unannounced expire after `ttl` without a refresh.
    pub fn with_presence_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Hub {
                rooms: HashMap::new(),
                attached: HashSet::new(),
                presence_ttl: ttl,
            })),
        }
    }

    /// Opens a new connection under [`DEFAULT_NAMESPACE`].
    pub fn connect(&self) -> MemoryAdapter {
        self.connect_as(DEFAULT_NAMESPACE)
    }

    /// Opens a new connection that creates rooms under `namespace`.
    pub fn connect_as(&self, namespace: &str) -> MemoryAdapter {
        MemoryAdapter {
            log: self.clone(),
            conn: self.open_connection(),
            namespace: namespace.to_string(),
        }
    }

    /// Allocates a connection identity without wrapping it in an adapter.
    ///
    /// The connection counts as attached until [`disconnect`](Self::disconnect)
    /// or [`detach`](Self::detach).
    pub fn open_connection(&self) -> ConnectionId {
        let conn = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        self.lock().attached.insert(conn);
        tracing::debug!(%conn, "memory log connection opened");
        conn
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        // A panic while holding the lock can't leave a room half-written:
        // every mutation is a single push or slot assignment.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensures `room` exists under `namespace`; returns its epoch.
    pub fn create_room(&self, namespace: &str, room: &RoomCode) -> Result<u64, AdapterError> {
        let mut hub = self.lock();
        if let Some(existing) = hub.rooms.get(room) {
            if existing.namespace != namespace {
                return Err(AdapterError::AlreadyExistsDifferentOwner(room.clone()));
            }
            return Ok(existing.epoch);
        }
        hub.rooms.insert(room.clone(), RoomLog::new(namespace));
        tracing::info!(%room, namespace, "room created");
        Ok(1)
    }

    /// Returns the epoch of an existing room.
    pub fn join_room(&self, room: &RoomCode) -> Result<u64, AdapterError> {
        let hub = self.lock();
        hub.rooms
            .get(room)
            .map(|log| log.epoch)
            .ok_or_else(|| AdapterError::RoomNotFound(room.clone()))
    }

    /// Releases `conn`'s slots in `room` and detaches its subscriptions
    /// there. Unknown rooms are not an error.
    pub fn leave_room(&self, conn: ConnectionId, room: &RoomCode) {
        let mut hub = self.lock();
        if let Some(log) = hub.rooms.get_mut(room) {
            let released = log.release(conn);
            log.subscribers.retain(|sub| sub.conn != conn);
            tracing::info!(%room, %conn, ?released, "connection left room");
        }
    }

    /// Appends a typed event. See [`LogAdapter::append`] for the rules.
    pub fn append(
        &self,
        conn: ConnectionId,
        room: &RoomCode,
        epoch: u64,
        event: &Event,
    ) -> Result<u64, AdapterError> {
        let body = serde_json::to_value(event).map_err(ProtocolError::Encode)?;
        self.append_body(conn, room, epoch, event, body)
    }

    /// Appends `body`, applying the presence and epoch rules of `event`
    /// (its decoded form). The relay uses this to store exactly what the
    /// client sent, including fields this build doesn't know.
    pub fn append_body(
        &self,
        conn: ConnectionId,
        room: &RoomCode,
        epoch: u64,
        event: &Event,
        body: serde_json::Value,
    ) -> Result<u64, AdapterError> {
        let mut hub = self.lock();
        let Hub {
            rooms,
            attached,
            presence_ttl,
        } = &mut *hub;
        let live = Liveness {
            attached: &*attached,
            ttl: *presence_ttl,
        };
        let log = rooms
            .get_mut(room)
            .ok_or_else(|| AdapterError::RoomNotFound(room.clone()))?;

        let stamp = match event {
            Event::Hello { by, .. } => {
                if let Err(e) = log.claim(*by, conn, live) {
                    tracing::info!(%room, %conn, role = %by, "presence claim refused");
                    return Err(e);
                }
                tracing::debug!(%room, %conn, role = %by, "presence claimed");
                epoch
            }
            Event::Epoch { n, .. } => {
                if *n <= log.epoch {
                    return Err(AdapterError::EpochRegression {
                        current: log.epoch,
                        requested: *n,
                    });
                }
                log.refresh(conn);
                log.epoch = *n;
                tracing::info!(%room, epoch = *n, "epoch advanced");
                *n
            }
            _ => {
                log.refresh(conn);
                epoch
            }
        };

        Ok(log.push(stamp, body))
    }

    /// Appends an arbitrary record without any checks, as a foreign writer
    /// (an older client, a hand-edited database) might.
    pub fn append_raw(
        &self,
        room: &RoomCode,
        epoch: u64,
        body: serde_json::Value,
    ) -> Result<u64, AdapterError> {
        let mut hub = self.lock();
        let log = hub
            .rooms
            .get_mut(room)
            .ok_or_else(|| AdapterError::RoomNotFound(room.clone()))?;
        Ok(log.push(epoch, body))
    }

    /// Opens a subscription for `conn`: backlog first, then live entries.
    ///
    /// The backlog is copied and the subscriber registered under the same
    /// lock, so no entry is missed or delivered twice.
    pub fn subscribe(&self, conn: ConnectionId, room: &RoomCode) -> Result<Subscription, AdapterError> {
        let mut hub = self.lock();
        let log = hub
            .rooms
            .get_mut(room)
            .ok_or_else(|| AdapterError::RoomNotFound(room.clone()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        for entry in &log.entries {
            // `rx` is alive in this scope, so sends can't fail.
            let _ = tx.send(entry.clone());
        }
        log.subscribers.push(Subscriber { conn, tx });
        Ok(Subscription::new(room.clone(), rx))
    }

    /// Current occupancy of `room`.
    pub fn presence(&self, room: &RoomCode) -> Result<Presence, AdapterError> {
        let hub = self.lock();
        let live = Liveness {
            attached: &hub.attached,
            ttl: hub.presence_ttl,
        };
        hub.rooms
            .get(room)
            .map(|log| log.presence(live))
            .ok_or_else(|| AdapterError::RoomNotFound(room.clone()))
    }

    /// Refreshes `conn`'s claims in `room`.
    pub fn touch(&self, conn: ConnectionId, room: &RoomCode) -> Result<(), AdapterError> {
        let mut hub = self.lock();
        let log = hub
            .rooms
            .get_mut(room)
            .ok_or_else(|| AdapterError::RoomNotFound(room.clone()))?;
        log.refresh(conn);
        Ok(())
    }

    /// Runs the on-disconnect cleanup for `conn` in every room: release
    /// its slots, append `bye` for each one, drop its subscriptions.
    ///
    /// Runs once per connection; later calls, and calls for a detached
    /// connection, do nothing.
    pub fn disconnect(&self, conn: ConnectionId) {
        let mut hub = self.lock();
        if !hub.attached.remove(&conn) {
            return;
        }
        for (room, log) in hub.rooms.iter_mut() {
            log.subscribers.retain(|sub| sub.conn != conn);
            for role in log.release(conn) {
                let bye = Event::Bye {
                    by: role,
                    at: now_millis(),
                };
                match serde_json::to_value(&bye) {
                    Ok(body) => {
                        let epoch = log.epoch;
                        log.push(epoch, body);
                        tracing::info!(%room, %conn, %role, "presence released on disconnect");
                    }
                    Err(e) => {
                        tracing::warn!(%room, %conn, error = %e, "failed to encode disconnect bye");
                    }
                }
            }
        }
    }

    /// Forgets `conn` without any cleanup, as if its socket died and the
    /// log never heard. Its subscriptions end, but its claims stay until the
    /// presence TTL runs out.
    pub fn detach(&self, conn: ConnectionId) {
        let mut hub = self.lock();
        if !hub.attached.remove(&conn) {
            return;
        }
        for log in hub.rooms.values_mut() {
            log.subscribers.retain(|sub| sub.conn != conn);
        }
        tracing::debug!(%conn, "connection detached without cleanup");
    }

    /// A copy of every record in `room`, for inspection.
    pub fn entries(&self, room: &RoomCode) -> Result<Vec<RawEntry>, AdapterError> {
        let hub = self.lock();
        hub.rooms
            .get(room)
            .map(|log| log.entries.clone())
            .ok_or_else(|| AdapterError::RoomNotFound(room.clone()))
    }

    /// Returns `true` if `room` has been created.
    pub fn contains(&self, room: &RoomCode) -> bool {
        self.lock().rooms.contains_key(room)
    }
}

impl fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hub = self.lock();
        f.debug_struct("MemoryLog")
            .field("rooms", &hub.rooms.len())
            .field("presence_ttl", &hub.presence_ttl)
            .finish()
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// MemoryAdapter
// ---------------------------------------------------------------------------

/// One connection to a [`MemoryLog`].
///
/// Dropping the adapter is an abrupt disconnect: claims it still holds are
/// released and `bye` is appended for them.
pub struct MemoryAdapter {
    log: MemoryLog,
    conn: ConnectionId,
    namespace: String,
}

impl MemoryAdapter {
    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    /// The log this adapter is connected to.
    pub fn log(&self) -> &MemoryLog {
        &self.log
    }

    /// Drops the connection without a graceful `leave`.
    pub fn disconnect(self) {
        drop(self);
    }

    /// Loses the connection without the log noticing. Claims it holds go
    /// stale after the presence TTL instead of being released.
    pub fn vanish(self) {
        self.log.detach(self.conn);
    }
}

impl fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("conn", &self.conn)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl Drop for MemoryAdapter {
    fn drop(&mut self) {
        self.log.disconnect(self.conn);
    }
}

impl LogAdapter for MemoryAdapter {
    async fn create(&self, room: &RoomCode) -> Result<u64, AdapterError> {
        self.log.create_room(&self.namespace, room)
    }

    async fn join(&self, room: &RoomCode) -> Result<u64, AdapterError> {
        self.log.join_room(room)
    }

    async fn leave(&self, room: &RoomCode) -> Result<(), AdapterError> {
        self.log.leave_room(self.conn, room);
        Ok(())
    }

    async fn append(&self, room: &RoomCode, epoch: u64, event: &Event) -> Result<u64, AdapterError> {
        self.log.append(self.conn, room, epoch, event)
    }

    async fn subscribe(&self, room: &RoomCode) -> Result<Subscription, AdapterError> {
        self.log.subscribe(self.conn, room)
    }

    async fn presence(&self, room: &RoomCode) -> Result<Presence, AdapterError> {
        self.log.presence(room)
    }

    async fn heartbeat(&self, room: &RoomCode) -> Result<(), AdapterError> {
        self.log.touch(self.conn, room)
    }
}
