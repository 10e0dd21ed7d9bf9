//! Two independent sessions fed the same event sequence must agree.

use duelsync_protocol::{Event, Phase, RematchAction, Role, ShotOutcome};
use duelsync_session::{GameSession, RematchState};

fn feed(session: &mut GameSession, events: &[Event]) {
    for event in events {
        session.apply(event).unwrap();
    }
}

fn pair() -> (GameSession, GameSession) {
    (GameSession::new(Role::Host), GameSession::new(Role::Guest))
}

#[test]
fn test_ready_gate_converges_in_either_order() {
    let host_first = [
        Event::Ready { by: Role::Host, ready: true, at: 1 },
        Event::Ready { by: Role::Guest, ready: true, at: 2 },
    ];
    let guest_first = [host_first[1].clone(), host_first[0].clone()];

    for order in [&host_first, &guest_first] {
        let (mut host, mut guest) = pair();
        feed(&mut host, order);
        feed(&mut guest, order);

        assert_eq!(host.phase(), Phase::Play);
        assert_eq!(guest.phase(), Phase::Play);
        assert_eq!(host.turn(), Some(Role::Host));
        assert_eq!(host.turn(), guest.turn());
        assert!(host.is_my_turn());
        assert!(!guest.is_my_turn());
    }
}

#[test]
fn test_full_exchange_leaves_identical_snapshots() {
    let events = [
        Event::Hello { by: Role::Host, at: 0 },
        Event::Hello { by: Role::Guest, at: 0 },
        Event::Ready { by: Role::Host, ready: true, at: 0 },
        Event::Ready { by: Role::Guest, ready: true, at: 0 },
        Event::Shot { by: Role::Host, r: 0, c: 0, at: 0 },
        Event::Result { to: Role::Host, result: ShotOutcome::Miss, r: 0, c: 0, at: 0 },
        Event::Shot { by: Role::Guest, r: 5, c: 5, at: 0 },
        Event::Result { to: Role::Guest, result: ShotOutcome::Hit, r: 5, c: 5, at: 0 },
    ];
    let (mut host, mut guest) = pair();
    feed(&mut host, &events);
    feed(&mut guest, &events);

    assert_eq!(host.snapshot(), guest.snapshot());
    assert_eq!(host.turn(), Some(Role::Host));
}

#[test]
fn test_epoch_replay_reflects_only_the_new_game() {
    // What a room delivers after fencing: epoch-1 history, the marker,
    // then the epoch-2 shot.
    let events = [
        Event::Hello { by: Role::Host, at: 0 },
        Event::Shot { by: Role::Host, r: 2, c: 2, at: 0 },
        Event::Result { to: Role::Host, result: ShotOutcome::Hit, r: 2, c: 2, at: 0 },
        Event::Epoch { n: 2, at: 0 },
        Event::Shot { by: Role::Host, r: 5, c: 5, at: 0 },
    ];
    let mut late = GameSession::new(Role::Guest);
    feed(&mut late, &events);

    let snap = late.snapshot();
    assert_eq!(snap.epoch, 2);
    assert_eq!(snap.shots.len(), 1);
    assert_eq!((snap.shots[0].r, snap.shots[0].c), (5, 5));
    assert!(snap.results.is_empty());
}

#[test]
fn test_rematch_accept_restarts_both_sides() {
    let events = [
        Event::Ready { by: Role::Host, ready: true, at: 0 },
        Event::Ready { by: Role::Guest, ready: true, at: 0 },
        Event::Quit { by: Role::Guest, at: 0 },
        Event::RematchSignal { action: RematchAction::Propose, by: Role::Host, at: 0 },
    ];
    let (mut host, mut guest) = pair();
    feed(&mut host, &events);
    feed(&mut guest, &events);
    assert_eq!(guest.rematch(), RematchState::Proposed { by: Role::Host });
    assert_eq!(host.winner(), Some(Role::Host));

    let accept = [
        Event::RematchSignal { action: RematchAction::Accept, by: Role::Guest, at: 0 },
        Event::Epoch { n: 2, at: 0 },
    ];
    feed(&mut host, &accept);
    feed(&mut guest, &accept);

    assert_eq!(host.snapshot(), guest.snapshot());
    assert_eq!(host.phase(), Phase::Place);
    assert_eq!(host.epoch(), 2);
    assert_eq!(host.winner(), None);
}

#[test]
fn test_late_joiner_catches_up_from_state_event() {
    let events = [
        Event::Ready { by: Role::Host, ready: true, at: 0 },
        Event::Ready { by: Role::Guest, ready: true, at: 0 },
        Event::Shot { by: Role::Host, r: 1, c: 1, at: 0 },
        Event::Result { to: Role::Host, result: ShotOutcome::Sunk, r: 1, c: 1, at: 0 },
    ];
    let mut host = GameSession::new(Role::Host);
    feed(&mut host, &events);

    let mut guest = GameSession::new(Role::Guest);
    guest
        .apply(&Event::State {
            by: Role::Host,
            state: host.to_state_payload().unwrap(),
            at: 0,
        })
        .unwrap();

    assert_eq!(guest.snapshot(), host.snapshot());
    assert!(guest.is_my_turn());
}
