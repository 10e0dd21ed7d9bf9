//! Named handler slots game logic registers to learn about room activity.
//!
//! Game logic never reads the log directly: every entry the room accepts
//! is routed here, one slot per event tag. Slots nobody registered are
//! simply never called, and tags without a slot (including unknown future
//! tags) fall through silently.
//!
//! Handlers run on the task that drives [`Room::dispatch_next`] /
//! [`Room::dispatch_pending`], one at a time, so they need neither `Send`
//! nor locking. Capturing an `Rc<RefCell<_>>` is the usual pattern.
//!
//! [`Room::dispatch_next`]: crate::Room::dispatch_next
//! [`Room::dispatch_pending`]: crate::Room::dispatch_pending

use duelsync_protocol::{Event, LogEntry, Phase, RematchAction, Role, ShotOutcome};
use serde_json::Value;

type Slot<F> = Option<Box<F>>;

/// The consumer callback surface of a [`Room`](crate::Room).
///
/// Built fluently:
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use duelsync_room::RoomHandlers;
///
/// let shots = Rc::new(RefCell::new(Vec::new()));
/// let seen = Rc::clone(&shots);
/// let handlers = RoomHandlers::new()
///     .on_shot(move |by, r, c| seen.borrow_mut().push((by, r, c)))
///     .on_peer_bye(|role| println!("{role} left"));
/// # drop(handlers);
/// ```
#[derive(Default)]
pub struct RoomHandlers {
    peer_hello: Slot<dyn FnMut(Role)>,
    peer_bye: Slot<dyn FnMut(Role)>,
    shot: Slot<dyn FnMut(Role, u8, u8)>,
    result: Slot<dyn FnMut(Role, ShotOutcome, u8, u8)>,
    phase: Slot<dyn FnMut(Phase)>,
    rematch: Slot<dyn FnMut()>,
    rematch_signal: Slot<dyn FnMut(RematchAction, Role)>,
    ready: Slot<dyn FnMut(Role, bool)>,
    quit: Slot<dyn FnMut(Role)>,
    reveal: Slot<dyn FnMut(Role, &[Vec<u8>], &Value)>,
    epoch: Slot<dyn FnMut(u64)>,
    state: Slot<dyn FnMut(Role, &Value)>,
    entry: Slot<dyn FnMut(&LogEntry)>,
}

impl RoomHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The other peer announced itself (first join or a presence ping).
    pub fn on_peer_hello(mut self, f: impl FnMut(Role) + 'static) -> Self {
        self.peer_hello = Some(Box::new(f));
        self
    }

    /// The other peer left, or the log announced it gone after a
    /// disconnect.
    pub fn on_peer_bye(mut self, f: impl FnMut(Role) + 'static) -> Self {
        self.peer_bye = Some(Box::new(f));
        self
    }

    /// A shot from either side: `(by, r, c)`.
    pub fn on_shot(mut self, f: impl FnMut(Role, u8, u8) + 'static) -> Self {
        self.shot = Some(Box::new(f));
        self
    }

    /// A shot outcome: `(to, outcome, r, c)`, where `to` is the attacker.
    pub fn on_result(mut self, f: impl FnMut(Role, ShotOutcome, u8, u8) + 'static) -> Self {
        self.result = Some(Box::new(f));
        self
    }

    pub fn on_phase(mut self, f: impl FnMut(Phase) + 'static) -> Self {
        self.phase = Some(Box::new(f));
        self
    }

    /// Legacy fire-and-forget rematch.
    pub fn on_rematch(mut self, f: impl FnMut() + 'static) -> Self {
        self.rematch = Some(Box::new(f));
        self
    }

    /// Structured rematch negotiation: `(action, by)`.
    pub fn on_rematch_signal(mut self, f: impl FnMut(RematchAction, Role) + 'static) -> Self {
        self.rematch_signal = Some(Box::new(f));
        self
    }

    pub fn on_ready(mut self, f: impl FnMut(Role, bool) + 'static) -> Self {
        self.ready = Some(Box::new(f));
        self
    }

    pub fn on_quit(mut self, f: impl FnMut(Role) + 'static) -> Self {
        self.quit = Some(Box::new(f));
        self
    }

    pub fn on_reveal(mut self, f: impl FnMut(Role, &[Vec<u8>], &Value) + 'static) -> Self {
        self.reveal = Some(Box::new(f));
        self
    }

    /// A new epoch began. Fires after the room has updated its own epoch.
    pub fn on_epoch(mut self, f: impl FnMut(u64) + 'static) -> Self {
        self.epoch = Some(Box::new(f));
        self
    }

    /// A full-state snapshot: overwrite the local view from it.
    pub fn on_state(mut self, f: impl FnMut(Role, &Value) + 'static) -> Self {
        self.state = Some(Box::new(f));
        self
    }

    /// Sees every routed entry before its tag slot does. Useful for feeding
    /// a state machine that wants whole events.
    pub fn on_entry(mut self, f: impl FnMut(&LogEntry) + 'static) -> Self {
        self.entry = Some(Box::new(f));
        self
    }

    /// Routes one entry to its slot, from the point of view of `local`.
    ///
    /// `hello`/`bye` by `local` itself are not peer events and go only to
    /// `on_entry`. There is no deduplication here: routing the same entry
    /// twice calls the handlers twice.
    ///
    /// Returns `true` if a tag slot was invoked.
    pub fn dispatch(&mut self, local: Role, entry: &LogEntry) -> bool {
        if let Some(f) = self.entry.as_mut() {
            f(entry);
        }

        match &entry.event {
            Event::Hello { by, .. } if *by != local => call(&mut self.peer_hello, |f| f(*by)),
            Event::Bye { by, .. } if *by != local => call(&mut self.peer_bye, |f| f(*by)),
            Event::Hello { .. } | Event::Bye { .. } => false,
            Event::Shot { by, r, c, .. } => call(&mut self.shot, |f| f(*by, *r, *c)),
            Event::Result {
                to, result, r, c, ..
            } => call(&mut self.result, |f| f(*to, *result, *r, *c)),
            Event::Phase { phase, .. } => call(&mut self.phase, |f| f(*phase)),
            Event::Ready { by, ready, .. } => call(&mut self.ready, |f| f(*by, *ready)),
            Event::Rematch { .. } => call(&mut self.rematch, |f| f()),
            Event::RematchSignal { action, by, .. } => {
                call(&mut self.rematch_signal, |f| f(*action, *by))
            }
            Event::Quit { by, .. } => call(&mut self.quit, |f| f(*by)),
            Event::Reveal { by, grid, fleet, .. } => {
                call(&mut self.reveal, |f| f(*by, grid.as_slice(), fleet))
            }
            Event::Epoch { n, .. } => call(&mut self.epoch, |f| f(*n)),
            Event::State { by, state, .. } => call(&mut self.state, |f| f(*by, state)),
            Event::Unknown => false,
        }
    }
}

impl std::fmt::Debug for RoomHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandlers").finish_non_exhaustive()
    }
}

fn call<F: ?Sized>(slot: &mut Slot<F>, invoke: impl FnOnce(&mut F)) -> bool {
    match slot.as_deref_mut() {
        Some(f) => {
            invoke(f);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn entry(seq: u64, event: Event) -> LogEntry {
        LogEntry {
            seq,
            epoch: 1,
            event,
        }
    }

    #[test]
    fn test_dispatch_routes_by_tag() {
        let shots = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&shots);
        let mut handlers = RoomHandlers::new().on_shot(move |by, r, c| {
            seen.borrow_mut().push((by, r, c));
        });

        let routed = handlers.dispatch(
            Role::Host,
            &entry(1, Event::Shot { by: Role::Guest, r: 2, c: 3, at: 0 }),
        );

        assert!(routed);
        assert_eq!(*shots.borrow(), vec![(Role::Guest, 2, 3)]);
    }

    #[test]
    fn test_dispatch_unregistered_slot_is_ignored() {
        let mut handlers = RoomHandlers::new();
        assert!(!handlers.dispatch(Role::Host, &entry(1, Event::Quit { by: Role::Guest, at: 0 })));
        assert!(!handlers.dispatch(Role::Host, &entry(2, Event::Unknown)));
    }

    #[test]
    fn test_dispatch_own_hello_is_not_a_peer_event() {
        let hellos = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&hellos);
        let mut handlers = RoomHandlers::new().on_peer_hello(move |role| seen.borrow_mut().push(role));

        handlers.dispatch(Role::Host, &entry(1, Event::Hello { by: Role::Host, at: 0 }));
        handlers.dispatch(Role::Host, &entry(2, Event::Hello { by: Role::Guest, at: 0 }));

        assert_eq!(*hellos.borrow(), vec![Role::Guest]);
    }

    #[test]
    fn test_dispatch_same_entry_twice_calls_handler_twice() {
        let count = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&count);
        let mut handlers = RoomHandlers::new().on_result(move |_, _, _, _| *seen.borrow_mut() += 1);

        let result = entry(
            5,
            Event::Result {
                to: Role::Host,
                result: ShotOutcome::Hit,
                r: 3,
                c: 4,
                at: 0,
            },
        );
        handlers.dispatch(Role::Guest, &result);
        handlers.dispatch(Role::Guest, &result);

        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_dispatch_on_entry_sees_everything() {
        let seqs = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&seqs);
        let mut handlers = RoomHandlers::new().on_entry(move |e| seen.borrow_mut().push(e.seq));

        handlers.dispatch(Role::Host, &entry(1, Event::Hello { by: Role::Host, at: 0 }));
        handlers.dispatch(Role::Host, &entry(2, Event::Unknown));

        assert_eq!(*seqs.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_dispatch_state_passes_payload_through() {
        let payload = serde_json::json!({"version": 1, "board": [[0, 1]]});
        let got = Rc::new(RefCell::new(None));
        let seen = Rc::clone(&got);
        let mut handlers = RoomHandlers::new().on_state(move |by, state| {
            *seen.borrow_mut() = Some((by, state.clone()));
        });

        handlers.dispatch(
            Role::Guest,
            &entry(
                9,
                Event::State {
                    by: Role::Host,
                    state: payload.clone(),
                    at: 0,
                },
            ),
        );

        assert_eq!(*got.borrow(), Some((Role::Host, payload)));
    }
}
