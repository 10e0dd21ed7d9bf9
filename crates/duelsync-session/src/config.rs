//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`GameSession`](crate::GameSession).
///
/// Sensible defaults are provided; override just the fields you care about:
///
/// ```rust
/// use std::time::Duration;
/// use duelsync_session::SessionConfig;
///
/// let config = SessionConfig {
///     rejoin_grace: Duration::from_secs(10),
///     ..SessionConfig::default()
/// };
/// assert!(!config.validate_results);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a peer that said `bye` has to come back before the game
    /// is abandoned (and the host opens a fresh epoch).
    ///
    /// Default: 30 seconds.
    pub rejoin_grace: Duration,

    /// Minimum gap between two `hello` acknowledgements sent in answer to
    /// the peer's `hello`. Without it two peers would ack each other's
    /// acks forever.
    ///
    /// Default: 2 seconds.
    pub hello_ack_interval: Duration,

    /// Ignore `result` events for coordinates the addressed side never
    /// fired at in the current epoch.
    ///
    /// Default: off. The defender is trusted, as it is in every deployed
    /// client.
    pub validate_results: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rejoin_grace: Duration::from_secs(30),
            hello_ack_interval: Duration::from_secs(2),
            validate_results: false,
        }
    }
}
