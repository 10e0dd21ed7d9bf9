//! `RelayServer` builder.
//!
//! Hosts the shared room log over WebSocket so two peers on different
//! machines can play. The relay is a dumb log: it stores and fans out
//! entries and enforces presence and epoch rules, nothing more.

use std::net::SocketAddr;
use std::time::Duration;

use duelsync_transport::{DEFAULT_IDLE_TIMEOUT, DEFAULT_PRESENCE_TTL, LogServer, MemoryLog};

use crate::DuelsyncError;

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,ignore
/// use duelsync::prelude::*;
///
/// let relay = RelayServer::builder()
///     .bind("0.0.0.0:9000")
///     .presence_ttl(Duration::from_secs(60))
///     .build()
///     .await?;
/// relay.run().await
/// ```
#[derive(Debug)]
pub struct RelayServerBuilder {
    bind_addr: String,
    presence_ttl: Duration,
    idle_timeout: Duration,
    log: Option<MemoryLog>,
}

impl RelayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            presence_ttl: DEFAULT_PRESENCE_TTL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            log: None,
        }
    }

    /// Sets the address to bind the relay to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// How long a presence claim stays valid without a refresh.
    pub fn presence_ttl(mut self, ttl: Duration) -> Self {
        self.presence_ttl = ttl;
        self
    }

    /// How long a silent client is kept before its socket is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Serves an existing log instead of a fresh one. `presence_ttl` is
    /// ignored in that case; the log keeps its own.
    pub fn log(mut self, log: MemoryLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Binds the listener. The relay doesn't accept clients until
    /// [`RelayServer::run`] is called.
    pub async fn build(self) -> Result<RelayServer, DuelsyncError> {
        let log = self
            .log
            .unwrap_or_else(|| MemoryLog::with_presence_ttl(self.presence_ttl));
        let server = LogServer::bind(&self.bind_addr, log)
            .await?
            .with_idle_timeout(self.idle_timeout);
        tracing::debug!(
            bind = %self.bind_addr,
            presence_ttl = ?self.presence_ttl,
            idle_timeout = ?self.idle_timeout,
            "relay configured"
        );
        Ok(RelayServer { server })
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound relay.
#[derive(Debug)]
pub struct RelayServer {
    server: LogServer,
}

impl RelayServer {
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.server.local_addr()
    }

    /// The `ws://` URL clients should connect to.
    pub fn url(&self) -> std::io::Result<String> {
        Ok(format!("ws://{}", self.local_addr()?))
    }

    /// The log behind the relay, for inspection in tests and tools.
    pub fn log(&self) -> &MemoryLog {
        self.server.log()
    }

    /// Runs the accept loop until the process ends.
    pub async fn run(self) -> Result<(), DuelsyncError> {
        self.server.run().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_on_ephemeral_port() {
        let relay = RelayServer::builder().bind("127.0.0.1:0").build().await.unwrap();
        let url = relay.url().unwrap();
        assert!(url.starts_with("ws://127.0.0.1:"));
        assert!(!url.ends_with(":0"));
    }

    #[tokio::test]
    async fn test_build_serves_the_given_log() {
        let log = MemoryLog::new();
        let relay = RelayServer::builder()
            .bind("127.0.0.1:0")
            .log(log.clone())
            .build()
            .await
            .unwrap();

        let code = duelsync_protocol::RoomCode::parse("LOGS").unwrap();
        log.create_room("battleship", &code).unwrap();
        assert!(relay.log().contains(&code));
    }

    #[tokio::test]
    async fn test_build_bind_failure_is_transport_error() {
        let err = RelayServer::builder().bind("not an address").build().await.unwrap_err();
        assert!(matches!(err, DuelsyncError::Transport(_)));
    }
}
