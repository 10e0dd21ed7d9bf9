use std::cell::RefCell;
use std::collections::VecDeque;
use std::error::Error;
use std::rc::Rc;

use duelsync::prelude::*;
use serde::{Deserialize, Serialize};

type DemoResult<T> = Result<T, Box<dyn Error>>;

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

const SIZE: u8 = 6;

const EMPTY: u8 = 0;
const SHIP: u8 = 1;
const HIT: u8 = 2;
const MISS: u8 = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Ship {
    name: String,
    cells: Vec<(u8, u8)>,
}

/// One player's own waters. Only the owner ever sees it, until a reveal.
#[derive(Clone, Debug)]
struct Board {
    grid: Vec<Vec<u8>>,
    fleet: Vec<Ship>,
}

impl Board {
    fn new(fleet: Vec<Ship>) -> Self {
        let mut grid = vec![vec![EMPTY; SIZE as usize]; SIZE as usize];
        for ship in &fleet {
            for &(r, c) in &ship.cells {
                grid[r as usize][c as usize] = SHIP;
            }
        }
        Self { grid, fleet }
    }

    fn cell(&self, r: u8, c: u8) -> u8 {
        self.grid[r as usize][c as usize]
    }

    /// Resolves an incoming shot and marks the grid.
    fn fire(&mut self, r: u8, c: u8) -> ShotOutcome {
        match self.cell(r, c) {
            SHIP => {
                self.grid[r as usize][c as usize] = HIT;
                let sunk = self
                    .fleet
                    .iter()
                    .find(|ship| ship.cells.contains(&(r, c)))
                    .is_some_and(|ship| ship.cells.iter().all(|&(r, c)| self.cell(r, c) == HIT));
                if sunk { ShotOutcome::Sunk } else { ShotOutcome::Hit }
            }
            HIT => ShotOutcome::Hit,
            _ => {
                self.grid[r as usize][c as usize] = MISS;
                ShotOutcome::Miss
            }
        }
    }

    fn all_sunk(&self) -> bool {
        self.grid.iter().flatten().all(|&cell| cell != SHIP)
    }
}

fn render(grid: &[Vec<u8>]) -> String {
    grid.iter()
        .map(|row| {
            row.iter()
                .map(|&cell| match cell {
                    SHIP => '#',
                    HIT => 'X',
                    MISS => 'o',
                    _ => '.',
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn ship(name: &str, cells: &[(u8, u8)]) -> Ship {
    Ship {
        name: name.to_string(),
        cells: cells.to_vec(),
    }
}

fn host_fleet() -> Vec<Ship> {
    vec![
        ship("destroyer", &[(0, 0), (0, 1)]),
        ship("cruiser", &[(2, 2), (3, 2), (4, 2)]),
    ]
}

fn guest_fleet() -> Vec<Ship> {
    vec![
        ship("destroyer", &[(0, 0), (1, 0)]),
        ship("cruiser", &[(5, 3), (5, 4), (5, 5)]),
    ]
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

struct Player {
    role: Role,
    room: Room<AnyAdapter>,
    game: Rc<RefCell<GameSession>>,
    /// Shots the opponent fired at us that still need a `result`.
    incoming: Rc<RefCell<VecDeque<(u8, u8)>>>,
    board: Board,
    fired: u8,
}

impl Player {
    fn new(adapter: AnyAdapter, code: RoomCode, role: Role, board: Board) -> Self {
        let game = Rc::new(RefCell::new(GameSession::new(role)));
        let incoming = Rc::new(RefCell::new(VecDeque::new()));

        let sink = Rc::clone(&game);
        let queue = Rc::clone(&incoming);
        let handlers = RoomHandlers::new()
            .on_entry(move |entry| {
                if let Err(e) = sink.borrow_mut().apply(&entry.event) {
                    tracing::warn!(seq = entry.seq, error = %e, "could not apply entry");
                }
            })
            .on_shot(move |by, r, c| {
                if by != role {
                    queue.borrow_mut().push_back((r, c));
                }
            });

        Self {
            role,
            room: Room::new(adapter, code, role).with_handlers(handlers),
            game,
            incoming,
            board,
            fired: 0,
        }
    }

    /// Sweeps the opponent's grid row by row.
    fn next_target(&mut self) -> (u8, u8) {
        let target = (self.fired / SIZE, self.fired % SIZE);
        self.fired += 1;
        target
    }
}

/// Dispatches entries until `done` holds.
async fn pump_until(player: &mut Player, done: impl Fn(&Player) -> bool) -> DemoResult<()> {
    let wait = async {
        while !done(player) {
            if player.room.dispatch_next().await.is_none() {
                return Err::<(), Box<dyn Error>>("room subscription closed".into());
            }
        }
        Ok(())
    };
    tokio::time::timeout(Duration::from_secs(5), wait).await?
}

/// One shot and its answer. Returns `true` if it sank the last ship.
async fn exchange(shooter: &mut Player, defender: &mut Player) -> DemoResult<bool> {
    let (r, c) = shooter.next_target();
    shooter.room.shot(r, c).await?;

    pump_until(defender, |p| !p.incoming.borrow().is_empty()).await?;
    let Some((r, c)) = defender.incoming.borrow_mut().pop_front() else {
        return Err("shot vanished".into());
    };
    let outcome = defender.board.fire(r, c);
    defender.room.result(shooter.role, outcome, r, c).await?;

    let fleet_lost = defender.board.all_sunk();
    if fleet_lost {
        defender.room.phase(Phase::Over).await?;
    }

    let to = shooter.role;
    let answered = move |p: &Player| p.game.borrow().result_at(to, r, c).is_some();
    pump_until(shooter, answered).await?;
    pump_until(defender, answered).await?;

    println!("{:>5} fires at ({r},{c}): {outcome:?}", shooter.role.to_string());
    Ok(fleet_lost)
}

// ---------------------------------------------------------------------------
// Match script
// ---------------------------------------------------------------------------

/// Plays one scripted match and returns the winner.
async fn play_match(host: &mut Player, guest: &mut Player) -> DemoResult<Role> {
    host.room.create().await?;
    guest.room.join().await?;
    println!("both players are in room {}", host.room.code());

    host.room.ready(true).await?;
    guest.room.ready(true).await?;
    pump_until(host, |p| p.game.borrow().phase() == Phase::Play).await?;
    pump_until(guest, |p| p.game.borrow().phase() == Phase::Play).await?;

    let winner = loop {
        let host_turn = host.game.borrow().is_my_turn();
        let (shooter, defender) = if host_turn {
            (&mut *host, &mut *guest)
        } else {
            (&mut *guest, &mut *host)
        };
        if exchange(shooter, defender).await? {
            break shooter.role;
        }
    };
    let (winner_side, loser_side) = match winner {
        Role::Host => (&mut *host, &mut *guest),
        Role::Guest => (&mut *guest, &mut *host),
    };
    pump_until(winner_side, |p| p.game.borrow().phase() == Phase::Over).await?;
    println!("{winner} wins");

    // The loser shows where the rest of the fleet was.
    let fleet = serde_json::to_value(&loser_side.board.fleet)?;
    loser_side.room.reveal(loser_side.board.grid.clone(), fleet).await?;
    pump_until(winner_side, |p| p.game.borrow().revealed().is_some()).await?;
    if let Some(revealed) = winner_side.game.borrow().revealed() {
        let ships: Vec<Ship> = serde_json::from_value(revealed.fleet.clone())?;
        let names: Vec<&str> = ships.iter().map(|s| s.name.as_str()).collect();
        println!("{} revealed {names:?}:\n{}", loser_side.role, render(&revealed.grid));
    }

    // The loser has had enough.
    winner_side.room.propose_rematch().await?;
    pump_until(loser_side, |p| matches!(p.game.borrow().rematch(), RematchState::Proposed { .. })).await?;
    loser_side.room.decline_rematch().await?;
    pump_until(winner_side, |p| matches!(p.game.borrow().rematch(), RematchState::Declined { .. })).await?;
    println!("rematch declined");

    guest.room.leave().await?;
    pump_until(host, |p| matches!(p.game.borrow().peer(), PeerStatus::Left { .. })).await?;
    host.room.leave().await?;
    Ok(winner)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let relay = RelayServer::builder().bind("127.0.0.1:0").build().await?;
    let url = relay.url()?;
    tokio::spawn(relay.run());
    eprintln!("relay listening on {url}");

    let options = ConnectOptions {
        relay_url: Some(url),
        ..ConnectOptions::from_env()
    };

    let code = RoomCode::generate();
    let invite = build_invite(&code);
    println!("host invites: {invite}");

    let joined = parse_room_code(&invite).ok_or("invite link did not parse")?;
    let mut host = Player::new(options.connect().await?, code, Role::Host, Board::new(host_fleet()));
    let mut guest = Player::new(options.connect().await?, joined, Role::Guest, Board::new(guest_fleet()));

    play_match(&mut host, &mut guest).await?;
    Ok(())
}
