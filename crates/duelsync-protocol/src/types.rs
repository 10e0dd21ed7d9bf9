//! Core protocol types: the event union and the records a log stores.
//!
//! Everything in this module travels through the shared log, so the serde
//! attributes here ARE the wire format. The JSON shapes match what browser
//! peers already write (`{"t":"shot","by":"host","r":2,"c":3,"at":...}`), so
//! renaming a field or a tag is a breaking protocol change.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Milliseconds since the Unix epoch, used for every event's `at` field.
///
/// Falls back to 0 if the system clock is set before 1970; the timestamp is
/// informational only and never used for ordering (the log's `seq` is).
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Role, Phase, outcomes
// ---------------------------------------------------------------------------

/// One of the two fixed participant identities in a room.
///
/// Roles are claimed, not assigned: a peer announces `hello{by}` and the log
/// either grants the slot or refuses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    /// The other seat at the table.
    pub fn opponent(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The global game phase broadcast with `phase{}` events.
///
/// ```text
/// place ──(both ready)──→ play ──(terminal condition)──→ over
///   ↑                                                     │
///   └──────────────(rematch, new epoch)───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Place,
    Play,
    Over,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Place => write!(f, "place"),
            Self::Play => write!(f, "play"),
            Self::Over => write!(f, "over"),
        }
    }
}

/// Outcome of a shot, computed by the defender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotOutcome {
    Miss,
    Hit,
    Sunk,
}

/// Step in a structured rematch negotiation (`rematch2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RematchAction {
    Propose,
    Accept,
    Decline,
}

// ---------------------------------------------------------------------------
// Event: the tagged union appended to a room's log
// ---------------------------------------------------------------------------

/// An immutable, timestamped event appended to a room's log.
///
/// `#[serde(tag = "t")]` produces internally tagged JSON:
///   `{ "t": "hello", "by": "host", "at": 1700000000000 }`
///
/// The `Unknown` variant carries `#[serde(other)]`: any tag this build
/// doesn't know (a newer peer's event) decodes to `Unknown` instead of
/// failing, and the dispatcher ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum Event {
    /// Peer announces presence and claims its role's occupancy slot.
    Hello { by: Role, at: u64 },

    /// Peer releases its slot voluntarily (or the log does it on the
    /// peer's behalf after an abrupt disconnect).
    Bye { by: Role, at: u64 },

    /// Peer fires at the opponent's board. Carries coordinates only.
    Shot { by: Role, r: u8, c: u8, at: u64 },

    /// Outcome of a shot, computed by the defender and addressed `to` the
    /// attacker. Never self-reported by the attacker.
    Result {
        to: Role,
        result: ShotOutcome,
        r: u8,
        c: u8,
        at: u64,
    },

    /// Global phase broadcast.
    Phase { phase: Phase, at: u64 },

    /// Readiness toggle during placement.
    Ready { by: Role, ready: bool, at: u64 },

    /// Legacy fire-and-forget rematch.
    ///
    /// Deprecated: it has no acknowledgement step and cannot be epoch-fenced
    /// safely. New peers negotiate with [`Event::RematchSignal`] instead; this
    /// variant stays so that logs written by older peers still decode.
    Rematch { at: u64 },

    /// Structured rematch negotiation (`propose → accept | decline`).
    #[serde(rename = "rematch2")]
    RematchSignal {
        action: RematchAction,
        by: Role,
        at: u64,
    },

    /// Explicit forfeiture.
    Quit { by: Role, at: u64 },

    /// Optional full-board disclosure. `fleet` is owned by game logic.
    Reveal {
        by: Role,
        grid: Vec<Vec<u8>>,
        fleet: serde_json::Value,
        at: u64,
    },

    /// Start of a new logical game generation within the same room.
    Epoch { n: u64, at: u64 },

    /// Opaque full-state snapshot used to resynchronize a peer.
    State {
        by: Role,
        state: serde_json::Value,
        at: u64,
    },

    /// Any tag this build doesn't recognize.
    #[serde(other)]
    Unknown,
}

impl Event {
    /// The wire tag (`"hello"`, `"rematch2"`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Bye { .. } => "bye",
            Self::Shot { .. } => "shot",
            Self::Result { .. } => "result",
            Self::Phase { .. } => "phase",
            Self::Ready { .. } => "ready",
            Self::Rematch { .. } => "rematch",
            Self::RematchSignal { .. } => "rematch2",
            Self::Quit { .. } => "quit",
            Self::Reveal { .. } => "reveal",
            Self::Epoch { .. } => "epoch",
            Self::State { .. } => "state",
            Self::Unknown => "unknown",
        }
    }

    /// When the event was created, if it says.
    pub fn at(&self) -> Option<u64> {
        match self {
            Self::Hello { at, .. }
            | Self::Bye { at, .. }
            | Self::Shot { at, .. }
            | Self::Result { at, .. }
            | Self::Phase { at, .. }
            | Self::Ready { at, .. }
            | Self::Rematch { at }
            | Self::RematchSignal { at, .. }
            | Self::Quit { at, .. }
            | Self::Reveal { at, .. }
            | Self::Epoch { at, .. }
            | Self::State { at, .. } => Some(*at),
            Self::Unknown => None,
        }
    }

    /// The role that produced the event, for variants that carry one.
    ///
    /// `result` is addressed *to* the attacker, so its author is the
    /// opponent of `to`.
    pub fn author(&self) -> Option<Role> {
        match self {
            Self::Hello { by, .. }
            | Self::Bye { by, .. }
            | Self::Shot { by, .. }
            | Self::Ready { by, .. }
            | Self::RematchSignal { by, .. }
            | Self::Quit { by, .. }
            | Self::Reveal { by, .. }
            | Self::State { by, .. } => Some(*by),
            Self::Result { to, .. } => Some(to.opponent()),
            Self::Phase { .. } | Self::Rematch { .. } | Self::Epoch { .. } | Self::Unknown => {
                None
            }
        }
    }

    /// Returns `true` if the event is a game command that must be ignored
    /// when it was stamped with an epoch older than the one in force.
    ///
    /// Presence (`hello`, `bye`) and epoch markers are never fenced: they
    /// describe the room, not the game being played in it.
    pub fn is_fenced(&self) -> bool {
        !matches!(
            self,
            Self::Hello { .. } | Self::Bye { .. } | Self::Epoch { .. } | Self::Unknown
        )
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Per-room occupancy map. Advisory: it drives "opponent disconnected" UX,
/// never the validity of earlier shots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub host: bool,
    pub guest: bool,
}

impl Presence {
    pub fn is_claimed(&self, role: Role) -> bool {
        match role {
            Role::Host => self.host,
            Role::Guest => self.guest,
        }
    }
}

// ---------------------------------------------------------------------------
// Log records
// ---------------------------------------------------------------------------

/// A record exactly as the log stores and streams it.
///
/// The event is kept as raw JSON so that one malformed record (a peer on a
/// different schema, a hand-edited database row) can be skipped by the
/// reader instead of breaking the whole stream.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ seq: 7     ← append position │
/// │ epoch: 2   ← appender's epoch│
/// │ event: {"t":"shot", ...}     │
/// └──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Position in the room's log, assigned by the log, strictly increasing.
    pub seq: u64,
    /// The epoch the appender had observed when it appended.
    pub epoch: u64,
    /// The event body, undecoded.
    pub event: serde_json::Value,
}

impl RawEntry {
    /// Encodes a typed event into a raw record.
    pub fn new(seq: u64, epoch: u64, event: &Event) -> Result<Self, ProtocolError> {
        let event = serde_json::to_value(event).map_err(ProtocolError::Encode)?;
        Ok(Self { seq, epoch, event })
    }

    /// Decodes the event body.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the body is not a valid event
    /// (missing fields, wrong types, no tag). Unknown tags are NOT an error;
    /// they decode to [`Event::Unknown`].
    pub fn decode(&self) -> Result<LogEntry, ProtocolError> {
        let event = Event::deserialize(&self.event).map_err(ProtocolError::Decode)?;
        Ok(LogEntry {
            seq: self.seq,
            epoch: self.epoch,
            event,
        })
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub seq: u64,
    pub epoch: u64,
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Role / Phase
    // =====================================================================

    #[test]
    fn test_role_opponent_swaps() {
        assert_eq!(Role::Host.opponent(), Role::Guest);
        assert_eq!(Role::Guest.opponent(), Role::Host);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Host).unwrap(), "\"host\"");
        assert_eq!(Role::Guest.to_string(), "guest");
    }

    #[test]
    fn test_phase_display_matches_wire() {
        for phase in [Phase::Place, Phase::Play, Phase::Over] {
            let wire = serde_json::to_value(phase).unwrap();
            assert_eq!(wire, phase.to_string());
        }
    }

    // =====================================================================
    // Event JSON shapes
    // =====================================================================

    #[test]
    fn test_event_hello_json_format() {
        let json = serde_json::to_value(Event::Hello {
            by: Role::Host,
            at: 10,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"t": "hello", "by": "host", "at": 10}));
    }

    #[test]
    fn test_event_result_json_format() {
        let json = serde_json::to_value(Event::Result {
            to: Role::Guest,
            result: ShotOutcome::Sunk,
            r: 3,
            c: 4,
            at: 1,
        })
        .unwrap();
        assert_eq!(json["t"], "result");
        assert_eq!(json["to"], "guest");
        assert_eq!(json["result"], "sunk");
        assert_eq!(json["r"], 3);
        assert_eq!(json["c"], 4);
    }

    #[test]
    fn test_event_rematch_signal_uses_rematch2_tag() {
        let ev = Event::RematchSignal {
            action: RematchAction::Propose,
            by: Role::Guest,
            at: 5,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["t"], "rematch2");
        assert_eq!(json["action"], "propose");
        assert_eq!(ev.tag(), "rematch2");
    }

    #[test]
    fn test_event_decodes_from_browser_shape() {
        let raw = r#"{"t":"ready","by":"guest","ready":true,"at":1700000000000}"#;
        let ev: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(
            ev,
            Event::Ready {
                by: Role::Guest,
                ready: true,
                at: 1_700_000_000_000
            }
        );
    }

    #[test]
    fn test_event_unknown_tag_decodes_to_unknown() {
        let raw = r#"{"t":"emote","by":"host","emoji":"wave","at":1}"#;
        let ev: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(ev, Event::Unknown);
        assert_eq!(ev.at(), None);
    }

    #[test]
    fn test_event_missing_field_is_error() {
        let raw = r#"{"t":"shot","by":"host","r":1,"at":1}"#;
        let result: Result<Event, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn test_event_state_payload_is_opaque() {
        let payload = serde_json::json!({"v": 1, "anything": [1, 2, {"deep": true}]});
        let ev = Event::State {
            by: Role::Host,
            state: payload.clone(),
            at: 9,
        };
        let back: Event = serde_json::from_slice(&serde_json::to_vec(&ev).unwrap()).unwrap();
        assert!(matches!(back, Event::State { state, .. } if state == payload));
    }

    // =====================================================================
    // Event helpers
    // =====================================================================

    #[test]
    fn test_event_author_of_result_is_defender() {
        let ev = Event::Result {
            to: Role::Host,
            result: ShotOutcome::Miss,
            r: 0,
            c: 0,
            at: 0,
        };
        assert_eq!(ev.author(), Some(Role::Guest));
        assert_eq!(Event::Epoch { n: 2, at: 0 }.author(), None);
    }

    #[test]
    fn test_event_is_fenced_excludes_presence_and_epoch() {
        assert!(!Event::Hello { by: Role::Host, at: 0 }.is_fenced());
        assert!(!Event::Bye { by: Role::Host, at: 0 }.is_fenced());
        assert!(!Event::Epoch { n: 3, at: 0 }.is_fenced());
        assert!(Event::Shot { by: Role::Host, r: 0, c: 0, at: 0 }.is_fenced());
        assert!(Event::Phase { phase: Phase::Over, at: 0 }.is_fenced());
        assert!(Event::State { by: Role::Host, state: serde_json::Value::Null, at: 0 }.is_fenced());
    }

    // =====================================================================
    // Records
    // =====================================================================

    #[test]
    fn test_raw_entry_decode_keeps_seq_and_epoch() {
        let raw = RawEntry::new(7, 2, &Event::Quit { by: Role::Guest, at: 4 }).unwrap();
        let entry = raw.decode().unwrap();
        assert_eq!(entry.seq, 7);
        assert_eq!(entry.epoch, 2);
        assert_eq!(entry.event, Event::Quit { by: Role::Guest, at: 4 });
    }

    #[test]
    fn test_raw_entry_decode_malformed_is_error() {
        let raw = RawEntry {
            seq: 1,
            epoch: 1,
            event: serde_json::json!({"by": "host"}),
        };
        assert!(matches!(raw.decode(), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_presence_is_claimed() {
        let p = Presence { host: true, guest: false };
        assert!(p.is_claimed(Role::Host));
        assert!(!p.is_claimed(Role::Guest));
    }
}
