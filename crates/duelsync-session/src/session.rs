//! The per-peer game state machine.
//!
//! Both peers feed the same events, in the same order, into their own
//! [`GameSession`]. There is no arbiter: agreement comes from every
//! transition being a pure function of the event sequence.
//!
//! ```text
//!   place ──(ready{host} + ready{guest})──→ play ──(phase{over} | quit)──→ over
//!     ↑                                                                     │
//!     └─────────────(rematch2 accept | epoch{n} | legacy rematch)───────────┘
//! ```
//!
//! Host moves first. After that the turn follows results: once the
//! defender reports a `result`, the defender fires next.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use duelsync_protocol::{Event, Phase, RematchAction, Role, ShotOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::{role_order, Readiness, ResultRecord, ShotRecord, SNAPSHOT_VERSION};
use crate::{SessionConfig, SessionError, SessionSnapshot};

// ---------------------------------------------------------------------------
// RematchState / PeerStatus
// ---------------------------------------------------------------------------

/// Progress of a structured (`rematch2`) rematch negotiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RematchState {
    #[default]
    Idle,
    /// `by` asked for a rematch and is waiting for an answer.
    Proposed { by: Role },
    /// `by` declined the last proposal.
    Declined { by: Role },
}

/// What this peer knows about the other seat.
///
/// ```text
///   Absent ──hello──→ Present ──bye──→ Left{since} ──hello──→ Present
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Never seen in this epoch.
    Absent,
    Present,
    /// Said `bye` (or the log said it for them) at `since`.
    Left { since: Instant },
}

/// A full-board disclosure from the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Revealed {
    pub grid: Vec<Vec<u8>>,
    pub fleet: Value,
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// One peer's derived view of the game.
#[derive(Debug, Clone)]
pub struct GameSession {
    local: Role,
    config: SessionConfig,

    epoch: u64,
    phase: Phase,
    turn: Option<Role>,
    ready: Readiness,
    shots: HashSet<ShotRecord>,
    results: HashMap<(Role, u8, u8), ShotOutcome>,
    winner: Option<Role>,
    rematch: RematchState,

    peer: PeerStatus,
    revealed: Option<Revealed>,
    reveal_due: bool,
    last_hello_ack: Option<Instant>,
}

impl GameSession {
    pub fn new(local: Role) -> Self {
        Self::with_config(local, SessionConfig::default())
    }

    pub fn with_config(local: Role, config: SessionConfig) -> Self {
        Self {
            local,
            config,
            epoch: 1,
            phase: Phase::Place,
            turn: None,
            ready: Readiness::default(),
            shots: HashSet::new(),
            results: HashMap::new(),
            winner: None,
            rematch: RematchState::Idle,
            peer: PeerStatus::Absent,
            revealed: None,
            reveal_due: false,
            last_hello_ack: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn local(&self) -> Role {
        self.local
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whose move it is. `None` outside `play`.
    pub fn turn(&self) -> Option<Role> {
        self.turn
    }

    pub fn is_my_turn(&self) -> bool {
        self.phase == Phase::Play && self.turn == Some(self.local)
    }

    pub fn is_ready(&self, role: Role) -> bool {
        self.ready.get(role)
    }

    pub fn winner(&self) -> Option<Role> {
        self.winner
    }

    pub fn rematch(&self) -> RematchState {
        self.rematch
    }

    pub fn peer(&self) -> PeerStatus {
        self.peer
    }

    /// The peer's board, once they revealed it.
    pub fn revealed(&self) -> Option<&Revealed> {
        self.revealed.as_ref()
    }

    /// The outcome reported for `to`'s shot at `(r, c)`, if any.
    pub fn result_at(&self, to: Role, r: u8, c: u8) -> Option<ShotOutcome> {
        self.results.get(&(to, r, c)).copied()
    }

    /// Number of cells with a known outcome, both sides together.
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    // -----------------------------------------------------------------------
    // Applying events
    // -----------------------------------------------------------------------

    /// Applies one event using the current time for presence bookkeeping.
    pub fn apply(&mut self, event: &Event) -> Result<(), SessionError> {
        self.apply_at(event, Instant::now())
    }

    /// Applies one event as if observed at `now`.
    ///
    /// # Errors
    /// Only a peer's `state` snapshot can fail to apply; the session is left
    /// untouched in that case.
    pub fn apply_at(&mut self, event: &Event, now: Instant) -> Result<(), SessionError> {
        match event {
            Event::Hello { by, .. } => {
                if *by != self.local {
                    self.peer = PeerStatus::Present;
                }
            }
            Event::Bye { by, .. } => {
                if *by != self.local {
                    self.peer = PeerStatus::Left { since: now };
                }
                // Both sides drop the leaver's readiness, so placement has
                // to be confirmed again after a rejoin.
                if self.phase == Phase::Place {
                    self.ready.set(*by, false);
                }
            }

            Event::Ready { by, ready, .. } => self.apply_ready(*by, *ready),

            Event::Phase { phase, .. } => self.enter_phase(*phase),

            Event::Shot { by, r, c, .. } => {
                self.shots.insert(ShotRecord {
                    by: *by,
                    r: *r,
                    c: *c,
                });
            }

            Event::Result {
                to, result, r, c, ..
            } => self.apply_result(*to, *result, *r, *c),

            Event::Quit { by, .. } => {
                self.phase = Phase::Over;
                self.turn = None;
                self.winner = Some(by.opponent());
                if *by != self.local && self.revealed.is_none() {
                    self.reveal_due = true;
                }
            }

            Event::Reveal { by, grid, fleet, .. } if *by != self.local => {
                self.revealed = Some(Revealed {
                    grid: grid.clone(),
                    fleet: fleet.clone(),
                });
            }
            Event::Reveal { .. } => {}

            Event::Rematch { .. } => self.reset_game(),

            Event::RematchSignal { action, by, .. } => match action {
                RematchAction::Propose => self.rematch = RematchState::Proposed { by: *by },
                RematchAction::Accept => self.reset_game(),
                RematchAction::Decline => self.rematch = RematchState::Declined { by: *by },
            },

            Event::Epoch { n, .. } => {
                if *n > self.epoch {
                    self.epoch = *n;
                    self.reset_game();
                    // A new operation: whoever shows up next is a new peer.
                    if !matches!(self.peer, PeerStatus::Present) {
                        self.peer = PeerStatus::Absent;
                    }
                }
            }

            Event::State { by, state, .. } if *by != self.local => self.restore(state)?,
            Event::State { .. } | Event::Unknown => {}
        }
        Ok(())
    }

    fn apply_ready(&mut self, by: Role, ready: bool) {
        if self.phase != Phase::Place {
            return;
        }
        self.ready.set(by, ready);
        if self.ready.both() {
            tracing::debug!(epoch = self.epoch, "both sides ready");
            self.enter_phase(Phase::Play);
        }
    }

    fn enter_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Play if self.phase == Phase::Place => {
                self.phase = Phase::Play;
                self.turn = Some(Role::Host);
            }
            Phase::Play => {}
            Phase::Over => {
                self.phase = Phase::Over;
                self.turn = None;
            }
            Phase::Place => self.reset_game(),
        }
    }

    fn apply_result(&mut self, to: Role, result: ShotOutcome, r: u8, c: u8) {
        if self.config.validate_results && !self.shots.contains(&ShotRecord { by: to, r, c }) {
            tracing::debug!(%to, r, c, "ignoring result for a shot never fired");
            return;
        }
        self.results.insert((to, r, c), result);
        if self.phase == Phase::Play {
            self.turn = Some(to.opponent());
        }
    }

    fn reset_game(&mut self) {
        self.phase = Phase::Place;
        self.turn = None;
        self.ready = Readiness::default();
        self.shots.clear();
        self.results.clear();
        self.winner = None;
        self.rematch = RematchState::Idle;
        self.revealed = None;
        self.reveal_due = false;
    }

    // -----------------------------------------------------------------------
    // Consumer prompts
    // -----------------------------------------------------------------------

    /// `true` when this peer is the host, both sides are ready, and the
    /// game hasn't moved to `play` yet: the host should broadcast
    /// `phase{play}` so a peer that missed a `ready` catches up.
    pub fn should_broadcast_play(&self) -> bool {
        self.local == Role::Host && self.phase == Phase::Place && self.ready.both()
    }

    /// Returns `true` once after the peer quits, when this peer should
    /// reveal its own board.
    pub fn take_reveal_due(&mut self) -> bool {
        std::mem::take(&mut self.reveal_due)
    }

    /// `true` once the peer has been gone for longer than the rejoin grace.
    pub fn peer_grace_expired(&self, now: Instant) -> bool {
        match self.peer {
            PeerStatus::Left { since } => {
                now.saturating_duration_since(since) >= self.config.rejoin_grace
            }
            _ => false,
        }
    }

    /// How much of the rejoin grace is left, if the peer is gone.
    pub fn grace_remaining(&self, now: Instant) -> Option<Duration> {
        match self.peer {
            PeerStatus::Left { since } => Some(
                self.config
                    .rejoin_grace
                    .saturating_sub(now.saturating_duration_since(since)),
            ),
            _ => None,
        }
    }

    /// The host abandons a game whose guest never came back by opening a
    /// new epoch.
    pub fn should_bump_epoch(&self, now: Instant) -> bool {
        self.local == Role::Host && self.peer_grace_expired(now)
    }

    /// Rate limit for answering the peer's `hello` with our own. Returns
    /// `true` (and records `now`) at most once per `hello_ack_interval`.
    pub fn should_ack_hello(&mut self, now: Instant) -> bool {
        let due = self.last_hello_ack.is_none_or(|last| {
            now.saturating_duration_since(last) > self.config.hello_ack_interval
        });
        if due {
            self.last_hello_ack = Some(now);
        }
        due
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Captures the shared game state in canonical order.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut shots: Vec<ShotRecord> = self.shots.iter().copied().collect();
        shots.sort_by_key(|s| (role_order(s.by), s.r, s.c));

        let mut results: Vec<ResultRecord> = self
            .results
            .iter()
            .map(|(&(to, r, c), &result)| ResultRecord { to, r, c, result })
            .collect();
        results.sort_by_key(|rec| (role_order(rec.to), rec.r, rec.c));

        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            epoch: self.epoch,
            phase: self.phase,
            turn: self.turn,
            ready: self.ready,
            shots,
            results,
            winner: self.winner,
            rematch: self.rematch,
        }
    }

    /// The snapshot as a `state` event payload.
    pub fn to_state_payload(&self) -> Result<Value, SessionError> {
        self.snapshot().to_value()
    }

    /// Overwrites the shared game state from a `state` payload. Local-only
    /// bookkeeping (peer status, hello rate limit) is kept.
    ///
    /// # Errors
    /// See [`SessionSnapshot::from_value`]. Nothing changes on error.
    pub fn restore(&mut self, payload: &Value) -> Result<(), SessionError> {
        let snap = SessionSnapshot::from_value(payload)?;
        self.epoch = snap.epoch;
        self.phase = snap.phase;
        self.turn = snap.turn;
        self.ready = snap.ready;
        self.shots = snap.shots.into_iter().collect();
        self.results = snap
            .results
            .into_iter()
            .map(|rec| ((rec.to, rec.r, rec.c), rec.result))
            .collect();
        self.winner = snap.winner;
        self.rematch = snap.rematch;
        tracing::debug!(epoch = self.epoch, phase = %self.phase, "session restored from snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(by: Role) -> Event {
        Event::Ready { by, ready: true, at: 0 }
    }

    fn shot(by: Role, r: u8, c: u8) -> Event {
        Event::Shot { by, r, c, at: 0 }
    }

    fn result(to: Role, result: ShotOutcome, r: u8, c: u8) -> Event {
        Event::Result {
            to,
            result,
            r,
            c,
            at: 0,
        }
    }

    fn playing(local: Role) -> GameSession {
        let mut s = GameSession::new(local);
        s.apply(&ready(Role::Host)).unwrap();
        s.apply(&ready(Role::Guest)).unwrap();
        s
    }

    // =====================================================================
    // Ready gate
    // =====================================================================

    #[test]
    fn test_ready_gate_needs_both_sides() {
        let mut s = GameSession::new(Role::Guest);
        s.apply(&ready(Role::Guest)).unwrap();
        assert_eq!(s.phase(), Phase::Place);
        assert_eq!(s.turn(), None);

        s.apply(&ready(Role::Host)).unwrap();
        assert_eq!(s.phase(), Phase::Play);
        assert_eq!(s.turn(), Some(Role::Host));
        assert!(!s.is_my_turn());
    }

    #[test]
    fn test_ready_gate_unready_blocks_transition() {
        let mut s = GameSession::new(Role::Host);
        s.apply(&ready(Role::Host)).unwrap();
        s.apply(&Event::Ready { by: Role::Host, ready: false, at: 0 }).unwrap();
        s.apply(&ready(Role::Guest)).unwrap();
        assert_eq!(s.phase(), Phase::Place);
    }

    #[test]
    fn test_should_broadcast_play_only_for_host() {
        let mut host = GameSession::new(Role::Host);
        host.ready.set(Role::Host, true);
        host.ready.set(Role::Guest, true);
        assert!(host.should_broadcast_play());

        let mut guest = GameSession::new(Role::Guest);
        guest.ready.set(Role::Host, true);
        guest.ready.set(Role::Guest, true);
        assert!(!guest.should_broadcast_play());
    }

    // =====================================================================
    // Turns and results
    // =====================================================================

    #[test]
    fn test_result_passes_turn_to_defender() {
        let mut s = playing(Role::Host);
        assert!(s.is_my_turn());

        s.apply(&shot(Role::Host, 2, 3)).unwrap();
        s.apply(&result(Role::Host, ShotOutcome::Miss, 2, 3)).unwrap();

        assert_eq!(s.turn(), Some(Role::Guest));
        assert_eq!(s.result_at(Role::Host, 2, 3), Some(ShotOutcome::Miss));
    }

    #[test]
    fn test_result_applied_twice_leaves_snapshot_unchanged() {
        let mut s = playing(Role::Guest);
        s.apply(&shot(Role::Host, 3, 4)).unwrap();
        let hit = result(Role::Host, ShotOutcome::Hit, 3, 4);

        s.apply(&hit).unwrap();
        let once = s.snapshot();
        s.apply(&hit).unwrap();

        assert_eq!(s.snapshot(), once);
        assert_eq!(s.result_count(), 1);
    }

    #[test]
    fn test_validate_results_ignores_unfired_cells() {
        let config = SessionConfig {
            validate_results: true,
            ..SessionConfig::default()
        };
        let mut s = GameSession::with_config(Role::Host, config);
        s.apply(&ready(Role::Host)).unwrap();
        s.apply(&ready(Role::Guest)).unwrap();

        s.apply(&result(Role::Host, ShotOutcome::Hit, 0, 0)).unwrap();
        assert_eq!(s.result_at(Role::Host, 0, 0), None);
        assert_eq!(s.turn(), Some(Role::Host));

        s.apply(&shot(Role::Host, 0, 0)).unwrap();
        s.apply(&result(Role::Host, ShotOutcome::Hit, 0, 0)).unwrap();
        assert_eq!(s.result_at(Role::Host, 0, 0), Some(ShotOutcome::Hit));
    }

    // =====================================================================
    // Game end and rematch
    // =====================================================================

    #[test]
    fn test_peer_quit_ends_game_and_asks_for_reveal() {
        let mut s = playing(Role::Host);
        s.apply(&Event::Quit { by: Role::Guest, at: 0 }).unwrap();

        assert_eq!(s.phase(), Phase::Over);
        assert_eq!(s.winner(), Some(Role::Host));
        assert!(s.take_reveal_due());
        assert!(!s.take_reveal_due());
    }

    #[test]
    fn test_phase_over_broadcast_converges() {
        let mut s = playing(Role::Guest);
        s.apply(&Event::Phase { phase: Phase::Over, at: 0 }).unwrap();
        assert_eq!(s.phase(), Phase::Over);
        assert_eq!(s.turn(), None);
    }

    #[test]
    fn test_rematch_negotiation() {
        let mut s = playing(Role::Host);
        s.apply(&shot(Role::Host, 1, 1)).unwrap();

        s.apply(&Event::RematchSignal {
            action: RematchAction::Propose,
            by: Role::Guest,
            at: 0,
        })
        .unwrap();
        assert_eq!(s.rematch(), RematchState::Proposed { by: Role::Guest });

        s.apply(&Event::RematchSignal {
            action: RematchAction::Accept,
            by: Role::Host,
            at: 0,
        })
        .unwrap();
        assert_eq!(s.rematch(), RematchState::Idle);
        assert_eq!(s.phase(), Phase::Place);
        assert!(s.snapshot().shots.is_empty());
    }

    #[test]
    fn test_rematch_decline_keeps_board() {
        let mut s = playing(Role::Guest);
        s.apply(&Event::RematchSignal {
            action: RematchAction::Decline,
            by: Role::Host,
            at: 0,
        })
        .unwrap();
        assert_eq!(s.rematch(), RematchState::Declined { by: Role::Host });
        assert_eq!(s.phase(), Phase::Play);
    }

    #[test]
    fn test_legacy_rematch_resets() {
        let mut s = playing(Role::Guest);
        s.apply(&Event::Rematch { at: 0 }).unwrap();
        assert_eq!(s.phase(), Phase::Place);
        assert!(!s.is_ready(Role::Host));
    }

    #[test]
    fn test_epoch_resets_only_when_advancing() {
        let mut s = playing(Role::Host);
        s.apply(&Event::Epoch { n: 2, at: 0 }).unwrap();
        assert_eq!(s.epoch(), 2);
        assert_eq!(s.phase(), Phase::Place);

        s.apply(&ready(Role::Host)).unwrap();
        s.apply(&Event::Epoch { n: 2, at: 0 }).unwrap();
        assert!(s.is_ready(Role::Host));
    }

    // =====================================================================
    // Presence and grace
    // =====================================================================

    #[test]
    fn test_peer_status_follows_hello_and_bye() {
        let mut s = GameSession::new(Role::Host);
        let t0 = Instant::now();
        assert_eq!(s.peer(), PeerStatus::Absent);

        s.apply_at(&Event::Hello { by: Role::Host, at: 0 }, t0).unwrap();
        assert_eq!(s.peer(), PeerStatus::Absent);

        s.apply_at(&Event::Hello { by: Role::Guest, at: 0 }, t0).unwrap();
        assert_eq!(s.peer(), PeerStatus::Present);

        s.apply_at(&Event::Bye { by: Role::Guest, at: 0 }, t0).unwrap();
        assert_eq!(s.peer(), PeerStatus::Left { since: t0 });
    }

    #[test]
    fn test_grace_expiry_prompts_host_to_bump() {
        let mut host = GameSession::new(Role::Host);
        let t0 = Instant::now();
        host.apply_at(&Event::Bye { by: Role::Guest, at: 0 }, t0).unwrap();

        assert!(!host.should_bump_epoch(t0 + Duration::from_secs(10)));
        assert_eq!(
            host.grace_remaining(t0 + Duration::from_secs(10)),
            Some(Duration::from_secs(20))
        );
        assert!(host.should_bump_epoch(t0 + Duration::from_secs(30)));

        let mut guest = GameSession::new(Role::Guest);
        guest.apply_at(&Event::Bye { by: Role::Host, at: 0 }, t0).unwrap();
        assert!(guest.peer_grace_expired(t0 + Duration::from_secs(31)));
        assert!(!guest.should_bump_epoch(t0 + Duration::from_secs(31)));
    }

    #[test]
    fn test_returning_peer_cancels_grace() {
        let mut s = GameSession::new(Role::Host);
        let t0 = Instant::now();
        s.apply_at(&Event::Bye { by: Role::Guest, at: 0 }, t0).unwrap();
        s.apply_at(&Event::Hello { by: Role::Guest, at: 0 }, t0).unwrap();
        assert!(!s.peer_grace_expired(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_should_ack_hello_is_rate_limited() {
        let mut s = GameSession::new(Role::Guest);
        let t0 = Instant::now();
        assert!(s.should_ack_hello(t0));
        assert!(!s.should_ack_hello(t0 + Duration::from_millis(500)));
        assert!(s.should_ack_hello(t0 + Duration::from_millis(2500)));
    }

    // =====================================================================
    // Snapshots
    // =====================================================================

    #[test]
    fn test_snapshot_restores_identically_elsewhere() {
        let mut host = playing(Role::Host);
        host.apply(&shot(Role::Host, 4, 4)).unwrap();
        host.apply(&result(Role::Host, ShotOutcome::Sunk, 4, 4)).unwrap();

        let mut late = GameSession::new(Role::Guest);
        late.restore(&host.to_state_payload().unwrap()).unwrap();

        assert_eq!(late.snapshot(), host.snapshot());
        assert_eq!(late.turn(), Some(Role::Guest));
        assert!(late.is_my_turn());
    }

    #[test]
    fn test_state_event_from_peer_overwrites() {
        let mut source = playing(Role::Host);
        source.apply(&shot(Role::Host, 1, 1)).unwrap();
        let payload = source.to_state_payload().unwrap();

        let mut s = GameSession::new(Role::Guest);
        s.apply(&Event::State { by: Role::Host, state: payload, at: 0 }).unwrap();
        assert_eq!(s.phase(), Phase::Play);

        // Our own snapshot echoed back through the log is not re-applied.
        let mut own = GameSession::new(Role::Host);
        own.apply(&Event::State {
            by: Role::Host,
            state: serde_json::json!({"version": 99}),
            at: 0,
        })
        .unwrap();
    }

    #[test]
    fn test_restore_rejects_future_version_without_changes() {
        let mut s = playing(Role::Host);
        let before = s.snapshot();
        let mut payload = s.to_state_payload().unwrap();
        payload["version"] = serde_json::json!(2);

        let err = s.restore(&payload).unwrap_err();

        assert!(matches!(err, SessionError::UnsupportedSnapshotVersion { found: 2, .. }));
        assert_eq!(s.snapshot(), before);
    }
}
