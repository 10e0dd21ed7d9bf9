//! Room configuration and lifecycle state.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Room`](crate::Room).
///
/// Override individual fields with struct-update syntax:
///
/// ```rust
/// use duelsync_room::RoomConfig;
///
/// let config = RoomConfig {
///     announce_bye_on_leave: false,
///     ..RoomConfig::default()
/// };
/// assert!(config.fence_stale_epochs);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Skip game commands stamped with an epoch older than the one this
    /// room has observed. Turning this off hands every entry to the
    /// handlers and leaves fencing to them.
    pub fence_stale_epochs: bool,

    /// Append `bye` on a graceful [`leave`](crate::Room::leave) so the
    /// peer learns about it without waiting for presence to go stale.
    pub announce_bye_on_leave: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            fence_stale_epochs: true,
            announce_bye_on_leave: true,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// Where a [`Room`](crate::Room) is in its one-shot lifecycle.
///
/// ```text
/// Idle ──create/join──→ Connected ──leave──→ Left
/// ```
///
/// There is no way back: a room that has left stays left, and a second
/// `create`/`join` on the same instance is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Idle,
    Connected,
    Left,
}

impl RoomState {
    /// Returns `true` if actions may be appended.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connected => write!(f, "Connected"),
            Self::Left => write!(f, "Left"),
        }
    }
}
