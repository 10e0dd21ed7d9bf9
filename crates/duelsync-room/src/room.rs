//! The room orchestrator: the only object game logic talks to.
//!
//! A [`Room`] owns one [`LogAdapter`] connection, a fixed [`Role`], and the
//! subscription to its room's log. Outbound, it turns method calls into
//! timestamped events and appends them. Inbound, it decodes entries,
//! filters out the ones that must not reach game logic, and routes the
//! rest to [`RoomHandlers`].
//!
//! # Dispatch model
//!
//! Nothing runs in the background. The caller drives dispatch on its own
//! task with [`Room::dispatch_next`] or [`Room::dispatch_pending`], so
//! handlers always run one at a time, in log order, on the caller's task.
//!
//! Per entry, in order:
//!
//! 1. **Duplicate**: `seq` not above the last one seen → skipped.
//! 2. **Malformed**: body doesn't decode → skipped, logged at `debug`.
//! 3. **Unknown tag**: a newer peer's event → skipped.
//! 4. **Stale epoch**: a game command stamped with an epoch older than
//!    the latest `epoch` marker dispatched before it → skipped.
//! 5. Otherwise routed to the handlers.
//!
//! Fencing is decided by log position, not by what this peer has done
//! locally, so two peers replaying the same log skip the same entries.

use duelsync_protocol::{
    now_millis, Event, LogEntry, Phase, Presence, RawEntry, RematchAction, Role, RoomCode,
    ShotOutcome,
};
use duelsync_transport::{AdapterError, LogAdapter, Subscription};
use serde_json::Value;

use crate::{RoomConfig, RoomError, RoomHandlers, RoomState};

/// What happened to one entry taken off the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The entry was handed to the handlers.
    Delivered { seq: u64, tag: &'static str },
    /// The entry was dropped before reaching any handler.
    Ignored { seq: u64, reason: IgnoreReason },
}

impl Dispatched {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Delivered { seq, .. } | Self::Ignored { seq, .. } => *seq,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Already seen in this subscription.
    Duplicate,
    /// Missing fields, wrong types, no tag.
    Malformed,
    /// A tag this build doesn't know.
    UnknownTag,
    /// A game command from before the current epoch.
    StaleEpoch { stamped: u64, current: u64 },
}

/// A single peer's view of one room.
///
/// Single-use: `create` or `join` once, `leave` once. Dropping the room
/// drops the adapter, which for disconnect-aware adapters counts as an
/// abrupt disconnect.
pub struct Room<A: LogAdapter> {
    adapter: A,
    code: RoomCode,
    role: Role,
    config: RoomConfig,
    handlers: RoomHandlers,
    state: RoomState,
    subscription: Option<Subscription>,
    /// Epoch stamped on outgoing events.
    epoch: u64,
    /// Highest epoch marker dispatched so far, in log order.
    fence_epoch: u64,
    last_seq: u64,
}

impl<A: LogAdapter> Room<A> {
    /// Creates a room handle with default configuration and no handlers.
    /// Nothing touches the log until [`create`](Self::create) or
    /// [`join`](Self::join).
    pub fn new(adapter: A, code: RoomCode, role: Role) -> Self {
        Self::with_config(adapter, code, role, RoomConfig::default())
    }

    pub fn with_config(adapter: A, code: RoomCode, role: Role, config: RoomConfig) -> Self {
        Self {
            adapter,
            code,
            role,
            config,
            handlers: RoomHandlers::default(),
            state: RoomState::Idle,
            subscription: None,
            epoch: 1,
            fence_epoch: 1,
            last_seq: 0,
        }
    }

    /// Installs the handler slots, replacing any previous ones.
    pub fn with_handlers(mut self, handlers: RoomHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn set_handlers(&mut self, handlers: RoomHandlers) {
        self.handlers = handlers;
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// The epoch this room stamps on outgoing events.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Creates the room if absent, claims this room's role with `hello`,
    /// and starts watching the log.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyStarted`] on a second call.
    /// - `HostTaken`/`GuestTaken` if the role is occupied; the room stays
    ///   idle and the call may be retried.
    pub async fn create(&mut self) -> Result<(), RoomError> {
        self.start(true).await
    }

    /// Like [`create`](Self::create), but the room must already exist.
    ///
    /// # Errors
    /// `RoomNotFound` for a code nobody created; nothing is appended.
    pub async fn join(&mut self) -> Result<(), RoomError> {
        self.start(false).await
    }

    async fn start(&mut self, create: bool) -> Result<(), RoomError> {
        if self.state != RoomState::Idle {
            return Err(RoomError::AlreadyStarted(self.state));
        }

        let epoch = if create {
            self.adapter.create(&self.code).await?
        } else {
            self.adapter.join(&self.code).await?
        };
        self.epoch = self.epoch.max(epoch);

        let hello = Event::Hello {
            by: self.role,
            at: now_millis(),
        };
        if let Err(e) = self.adapter.append(&self.code, self.epoch, &hello).await {
            tracing::info!(room = %self.code, role = %self.role, error = %e, "hello refused");
            return Err(e.into());
        }

        match self.adapter.subscribe(&self.code).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                // Don't keep a slot we can't watch.
                if let Err(cleanup) = self.adapter.leave(&self.code).await {
                    tracing::debug!(room = %self.code, error = %cleanup, "slot release after failed subscribe");
                }
                return Err(e.into());
            }
        }

        self.state = RoomState::Connected;
        tracing::info!(
            room = %self.code,
            role = %self.role,
            epoch = self.epoch,
            created = create,
            "room started"
        );
        Ok(())
    }

    /// Stops dispatch, announces `bye` (unless configured off), and
    /// releases this connection's presence.
    ///
    /// The subscription is dropped first: once this returns, no handler
    /// fires again, even for appends still in flight. Safe to call more
    /// than once; calls after the first are no-ops.
    ///
    /// # Errors
    /// The first failure among `bye` and the adapter's `leave`. Both are
    /// attempted regardless.
    pub async fn leave(&mut self) -> Result<(), RoomError> {
        if self.state != RoomState::Connected {
            return Ok(());
        }
        self.state = RoomState::Left;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }

        let mut first_err: Option<AdapterError> = None;
        if self.config.announce_bye_on_leave {
            let bye = Event::Bye {
                by: self.role,
                at: now_millis(),
            };
            if let Err(e) = self.adapter.append(&self.code, self.epoch, &bye).await {
                tracing::debug!(room = %self.code, error = %e, "bye not delivered");
                first_err = Some(e);
            }
        }
        if let Err(e) = self.adapter.leave(&self.code).await {
            first_err.get_or_insert(e);
        }

        tracing::info!(room = %self.code, role = %self.role, "room left");
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    async fn send(&self, event: Event) -> Result<u64, RoomError> {
        if !self.state.is_connected() {
            return Err(RoomError::NotConnected(self.state));
        }
        let seq = self.adapter.append(&self.code, self.epoch, &event).await?;
        tracing::trace!(room = %self.code, seq, tag = event.tag(), "appended");
        Ok(seq)
    }

    /// Re-announces presence. Doubles as a presence ping.
    pub async fn hello(&self) -> Result<u64, RoomError> {
        self.send(Event::Hello {
            by: self.role,
            at: now_millis(),
        })
        .await
    }

    /// Fires at `(r, c)` on the opponent's board.
    pub async fn shot(&self, r: u8, c: u8) -> Result<u64, RoomError> {
        self.send(Event::Shot {
            by: self.role,
            r,
            c,
            at: now_millis(),
        })
        .await
    }

    /// Reports the outcome of a shot this peer received, addressed `to` the
    /// attacker.
    pub async fn result(&self, to: Role, outcome: ShotOutcome, r: u8, c: u8) -> Result<u64, RoomError> {
        self.send(Event::Result {
            to,
            result: outcome,
            r,
            c,
            at: now_millis(),
        })
        .await
    }

    pub async fn phase(&self, phase: Phase) -> Result<u64, RoomError> {
        self.send(Event::Phase {
            phase,
            at: now_millis(),
        })
        .await
    }

    pub async fn ready(&self, ready: bool) -> Result<u64, RoomError> {
        self.send(Event::Ready {
            by: self.role,
            ready,
            at: now_millis(),
        })
        .await
    }

    /// Legacy fire-and-forget rematch.
    #[deprecated(note = "no acknowledgement and not epoch-fenced; use propose_rematch / accept_rematch")]
    pub async fn rematch(&self) -> Result<u64, RoomError> {
        self.send(Event::Rematch { at: now_millis() }).await
    }

    pub async fn propose_rematch(&self) -> Result<u64, RoomError> {
        self.rematch_signal(RematchAction::Propose).await
    }

    /// Accepts a proposed rematch and opens the next epoch, so nothing
    /// stamped with the finished game's epoch is acted on afterwards.
    ///
    /// Returns the new epoch.
    pub async fn accept_rematch(&mut self) -> Result<u64, RoomError> {
        self.rematch_signal(RematchAction::Accept).await?;
        self.bump_epoch().await
    }

    pub async fn decline_rematch(&self) -> Result<u64, RoomError> {
        self.rematch_signal(RematchAction::Decline).await
    }

    async fn rematch_signal(&self, action: RematchAction) -> Result<u64, RoomError> {
        self.send(Event::RematchSignal {
            action,
            by: self.role,
            at: now_millis(),
        })
        .await
    }

    /// Forfeits the game.
    pub async fn quit(&self) -> Result<u64, RoomError> {
        self.send(Event::Quit {
            by: self.role,
            at: now_millis(),
        })
        .await
    }

    /// Discloses this peer's board. `fleet` is passed through untouched.
    pub async fn reveal(&self, grid: Vec<Vec<u8>>, fleet: Value) -> Result<u64, RoomError> {
        self.send(Event::Reveal {
            by: self.role,
            grid,
            fleet,
            at: now_millis(),
        })
        .await
    }

    /// Publishes a full-state snapshot for a peer to resynchronize from.
    pub async fn send_state(&self, state: Value) -> Result<u64, RoomError> {
        self.send(Event::State {
            by: self.role,
            state,
            at: now_millis(),
        })
        .await
    }

    /// Appends `epoch{current + 1}` and stamps everything after it with the
    /// new epoch. Returns the epoch now in force.
    ///
    /// If the peer bumped first the log refuses with `EpochRegression`; the
    /// room adopts the peer's epoch and returns it, since either way a new
    /// epoch was opened.
    pub async fn bump_epoch(&mut self) -> Result<u64, RoomError> {
        let next = self.epoch + 1;
        let event = Event::Epoch {
            n: next,
            at: now_millis(),
        };
        match self.send(event).await {
            Ok(_) => {
                self.epoch = next;
                tracing::info!(room = %self.code, epoch = next, "epoch bumped");
                Ok(next)
            }
            Err(RoomError::Adapter(AdapterError::EpochRegression { current, .. })) => {
                self.epoch = self.epoch.max(current);
                tracing::info!(room = %self.code, epoch = self.epoch, "peer already bumped epoch");
                Ok(self.epoch)
            }
            Err(e) => Err(e),
        }
    }

    /// Refreshes this peer's presence claim.
    pub async fn heartbeat(&self) -> Result<(), RoomError> {
        if !self.state.is_connected() {
            return Err(RoomError::NotConnected(self.state));
        }
        Ok(self.adapter.heartbeat(&self.code).await?)
    }

    /// Who currently occupies the room.
    pub async fn presence(&self) -> Result<Presence, RoomError> {
        Ok(self.adapter.presence(&self.code).await?)
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Waits for the next entry and processes it.
    ///
    /// Returns `None` when there is nothing to wait on: before
    /// `create`/`join`, after `leave`, or once the log closed the
    /// subscription.
    pub async fn dispatch_next(&mut self) -> Option<Dispatched> {
        let raw = self.subscription.as_mut()?.recv().await?;
        Some(self.process(raw))
    }

    /// Processes every entry that has already arrived, without waiting.
    pub fn dispatch_pending(&mut self) -> Vec<Dispatched> {
        let mut out = Vec::new();
        while let Some(raw) = self.subscription.as_mut().and_then(Subscription::try_recv) {
            out.push(self.process(raw));
        }
        out
    }

    fn process(&mut self, raw: RawEntry) -> Dispatched {
        let seq = raw.seq;
        if seq <= self.last_seq {
            return Dispatched::Ignored {
                seq,
                reason: IgnoreReason::Duplicate,
            };
        }
        self.last_seq = seq;

        let entry = match raw.decode() {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(room = %self.code, seq, error = %e, "skipping malformed entry");
                return Dispatched::Ignored {
                    seq,
                    reason: IgnoreReason::Malformed,
                };
            }
        };

        if entry.event == Event::Unknown {
            tracing::debug!(room = %self.code, seq, "skipping entry with unknown tag");
            return Dispatched::Ignored {
                seq,
                reason: IgnoreReason::UnknownTag,
            };
        }

        if self.config.fence_stale_epochs
            && entry.event.is_fenced()
            && entry.epoch < self.fence_epoch
        {
            tracing::debug!(
                room = %self.code,
                seq,
                stamped = entry.epoch,
                current = self.fence_epoch,
                tag = entry.event.tag(),
                "skipping stale-epoch entry"
            );
            return Dispatched::Ignored {
                seq,
                reason: IgnoreReason::StaleEpoch {
                    stamped: entry.epoch,
                    current: self.fence_epoch,
                },
            };
        }

        if let Event::Epoch { n, .. } = entry.event {
            self.fence_epoch = self.fence_epoch.max(n);
            self.epoch = self.epoch.max(n);
        }

        self.route(&entry)
    }

    fn route(&mut self, entry: &LogEntry) -> Dispatched {
        self.handlers.dispatch(self.role, entry);
        Dispatched::Delivered {
            seq: entry.seq,
            tag: entry.event.tag(),
        }
    }
}

impl<A: LogAdapter> std::fmt::Debug for Room<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("code", &self.code)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("last_seq", &self.last_seq)
            .finish_non_exhaustive()
    }
}
