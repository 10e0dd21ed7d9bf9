//! Picking a log backend at runtime.
//!
//! Game code holds a `Room<AnyAdapter>` and doesn't care whether the log is
//! in-process (tests, hot-seat) or a remote relay.

use duelsync_protocol::{Event, Presence, RoomCode};
use duelsync_transport::{
    AdapterError, DEFAULT_NAMESPACE, LogAdapter, MemoryAdapter, MemoryLog, Subscription,
    WebSocketAdapter,
};
use serde::{Deserialize, Serialize};

use crate::DuelsyncError;

/// Environment variable holding the relay URL (`ws://host:port`).
pub const RELAY_URL_ENV: &str = "DUELSYNC_RELAY_URL";

/// Environment variable overriding the room namespace.
pub const NAMESPACE_ENV: &str = "DUELSYNC_NAMESPACE";

/// Where to find the shared log.
///
/// Deserializes from a config file with any field omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Relay to connect to. `None` means no remote log is configured.
    pub relay_url: Option<String>,
    /// Game namespace rooms are created under. Two games sharing a relay
    /// can't claim each other's room codes.
    pub namespace: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            relay_url: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl ConnectOptions {
    /// Reads [`RELAY_URL_ENV`] and [`NAMESPACE_ENV`]; unset or empty
    /// variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            relay_url: non_empty(RELAY_URL_ENV),
            namespace: non_empty(NAMESPACE_ENV).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        }
    }

    /// Connects to the configured relay.
    ///
    /// # Errors
    /// [`DuelsyncError::Config`] when no relay URL is set, or a transport
    /// error if the relay can't be reached.
    pub async fn connect(&self) -> Result<AnyAdapter, DuelsyncError> {
        let url = self
            .relay_url
            .as_deref()
            .ok_or_else(|| DuelsyncError::Config(format!("{RELAY_URL_ENV} is not set")))?;
        let adapter = WebSocketAdapter::connect_with_namespace(url, &self.namespace).await?;
        Ok(AnyAdapter::WebSocket(adapter))
    }

    /// Opens a connection to an in-process log under this namespace.
    pub fn connect_memory(&self, log: &MemoryLog) -> AnyAdapter {
        AnyAdapter::Memory(log.connect_as(&self.namespace))
    }
}

/// Shorthand for `ConnectOptions::from_env().connect()`.
pub async fn connect() -> Result<AnyAdapter, DuelsyncError> {
    ConnectOptions::from_env().connect().await
}

/// Either log backend, behind one [`LogAdapter`] impl.
#[derive(Debug)]
pub enum AnyAdapter {
    Memory(MemoryAdapter),
    WebSocket(WebSocketAdapter),
}

impl AnyAdapter {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::WebSocket(_))
    }
}

impl From<MemoryAdapter> for AnyAdapter {
    fn from(adapter: MemoryAdapter) -> Self {
        Self::Memory(adapter)
    }
}

impl From<WebSocketAdapter> for AnyAdapter {
    fn from(adapter: WebSocketAdapter) -> Self {
        Self::WebSocket(adapter)
    }
}

impl LogAdapter for AnyAdapter {
    async fn create(&self, room: &RoomCode) -> Result<u64, AdapterError> {
        match self {
            Self::Memory(a) => a.create(room).await,
            Self::WebSocket(a) => a.create(room).await,
        }
    }

    async fn join(&self, room: &RoomCode) -> Result<u64, AdapterError> {
        match self {
            Self::Memory(a) => a.join(room).await,
            Self::WebSocket(a) => a.join(room).await,
        }
    }

    async fn leave(&self, room: &RoomCode) -> Result<(), AdapterError> {
        match self {
            Self::Memory(a) => a.leave(room).await,
            Self::WebSocket(a) => a.leave(room).await,
        }
    }

    async fn append(&self, room: &RoomCode, epoch: u64, event: &Event) -> Result<u64, AdapterError> {
        match self {
            Self::Memory(a) => a.append(room, epoch, event).await,
            Self::WebSocket(a) => a.append(room, epoch, event).await,
        }
    }

    async fn subscribe(&self, room: &RoomCode) -> Result<Subscription, AdapterError> {
        match self {
            Self::Memory(a) => a.subscribe(room).await,
            Self::WebSocket(a) => a.subscribe(room).await,
        }
    }

    async fn presence(&self, room: &RoomCode) -> Result<Presence, AdapterError> {
        match self {
            Self::Memory(a) => a.presence(room).await,
            Self::WebSocket(a) => a.presence(room).await,
        }
    }

    async fn heartbeat(&self, room: &RoomCode) -> Result<(), AdapterError> {
        match self {
            Self::Memory(a) => a.heartbeat(room).await,
            Self::WebSocket(a) => a.heartbeat(room).await,
        }
    }
}
