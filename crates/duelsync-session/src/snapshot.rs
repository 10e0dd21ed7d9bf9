//! Versioned full-state snapshots carried by `state` events.
//!
//! The room treats a `state` payload as opaque. This module gives it a
//! shape: a JSON object with an explicit `version` field, checked before
//! anything else is read, so a peer on a newer schema is refused instead
//! of silently half-applied.

use duelsync_protocol::{Phase, Role, ShotOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{RematchState, SessionError};

/// Schema version written into every snapshot this build produces.
pub const SNAPSHOT_VERSION: u64 = 1;

/// Readiness flags for both seats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub host: bool,
    pub guest: bool,
}

impl Readiness {
    pub fn get(&self, role: Role) -> bool {
        match role {
            Role::Host => self.host,
            Role::Guest => self.guest,
        }
    }

    pub fn set(&mut self, role: Role, ready: bool) {
        match role {
            Role::Host => self.host = ready,
            Role::Guest => self.guest = ready,
        }
    }

    pub fn both(&self) -> bool {
        self.host && self.guest
    }
}

/// A shot fired in the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShotRecord {
    pub by: Role,
    pub r: u8,
    pub c: u8,
}

/// The known outcome at one cell, addressed `to` the attacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub to: Role,
    pub r: u8,
    pub c: u8,
    pub result: ShotOutcome,
}

/// Everything two peers must agree on to resume a game.
///
/// Lists are kept in a canonical order (by role, then row, then column),
/// so two sessions in the same state produce equal snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u64,
    pub epoch: u64,
    pub phase: Phase,
    pub turn: Option<Role>,
    pub ready: Readiness,
    pub shots: Vec<ShotRecord>,
    pub results: Vec<ResultRecord>,
    pub winner: Option<Role>,
    pub rematch: RematchState,
}

#[derive(Deserialize)]
struct Versioned {
    version: u64,
}

impl SessionSnapshot {
    /// Serializes into a `state` event payload.
    pub fn to_value(&self) -> Result<Value, SessionError> {
        serde_json::to_value(self).map_err(SessionError::MalformedSnapshot)
    }

    /// Parses a `state` event payload.
    ///
    /// # Errors
    /// - [`SessionError::UnsupportedSnapshotVersion`] if `version` is not
    ///   [`SNAPSHOT_VERSION`]. Checked first, so a future schema with
    ///   different fields still reports its version.
    /// - [`SessionError::MalformedSnapshot`] if there is no `version` or
    ///   the rest doesn't fit.
    pub fn from_value(value: &Value) -> Result<Self, SessionError> {
        let Versioned { version } =
            Versioned::deserialize(value).map_err(SessionError::MalformedSnapshot)?;
        if version != SNAPSHOT_VERSION {
            return Err(SessionError::UnsupportedSnapshotVersion {
                found: version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Self::deserialize(value).map_err(SessionError::MalformedSnapshot)
    }
}

pub(crate) fn role_order(role: Role) -> u8 {
    match role {
        Role::Host => 0,
        Role::Guest => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            epoch: 3,
            phase: Phase::Play,
            turn: Some(Role::Guest),
            ready: Readiness { host: true, guest: true },
            shots: vec![ShotRecord { by: Role::Host, r: 1, c: 2 }],
            results: vec![ResultRecord {
                to: Role::Host,
                r: 1,
                c: 2,
                result: ShotOutcome::Hit,
            }],
            winner: None,
            rematch: RematchState::Idle,
        }
    }

    #[test]
    fn test_snapshot_value_round_trip() {
        let snap = sample();
        let value = snap.to_value().unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(SessionSnapshot::from_value(&value).unwrap(), snap);
    }

    #[test]
    fn test_snapshot_rejects_other_versions() {
        let mut value = sample().to_value().unwrap();
        value["version"] = serde_json::json!(2);
        let err = SessionSnapshot::from_value(&value).unwrap_err();
        assert!(matches!(
            err,
            SessionError::UnsupportedSnapshotVersion { found: 2, expected: 1 }
        ));
    }

    #[test]
    fn test_snapshot_without_version_is_malformed() {
        let err = SessionSnapshot::from_value(&serde_json::json!({"phase": "play"})).unwrap_err();
        assert!(matches!(err, SessionError::MalformedSnapshot(_)));
    }

    #[test]
    fn test_readiness_both() {
        let mut ready = Readiness::default();
        ready.set(Role::Guest, true);
        assert!(!ready.both());
        ready.set(Role::Host, true);
        assert!(ready.both());
        assert!(ready.get(Role::Host));
    }
}
