//! # LAN demo
//!
//! A minimal two-role (host/join) command-line demonstration of the TSS
//! session controllers running over a real UDP socket on the local network.
//!
//! Host a session:
//!
//! ```text
//! cargo run --example lan_demo -- host --port 7777
//! ```
//!
//! Join it from another terminal (or another machine on the LAN):
//!
//! ```text
//! cargo run --example lan_demo -- join --connect 127.0.0.1:7777 --name nova
//! ```
//!
//! Every joined ship drifts under its own velocity and receives a small
//! thrust impulse every couple of seconds, so multiple clients visibly
//! diverge and then re-converge as the authoritative log catches up.

#![allow(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use tss_rollback::packet::{ReadPacket, WritePacket};
use tss_rollback::{
    ClientController, ClientEvent, Command, Config, Entity, EntityId, NonBlockingTransport,
    ServerController, ServerEvent, Snapshot, SnapshotView, TssError, UdpTransport,
};

const FPS: u32 = 60;
const DELAYS: [u32; 3] = [0, 10, 30];
const THRUST_KIND: i32 = 1;
const THRUST_INTERVAL_FRAMES: u32 = 120;

#[derive(Parser)]
#[command(about = "LAN demo for the tss-rollback session controllers")]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the authoritative server.
    Host {
        #[arg(long, default_value_t = 7777)]
        port: u16,
        #[arg(long)]
        max_players: Option<usize>,
    },
    /// Join a running server.
    Join {
        #[arg(long)]
        connect: SocketAddr,
        #[arg(long, default_value = "nova")]
        name: String,
    },
}

#[derive(Debug, Clone)]
struct Ship {
    id: EntityId,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
}

impl Entity for Ship {
    fn id(&self) -> EntityId {
        self.id
    }

    fn step(&mut self, _view: &SnapshotView<'_, Self>) {
        self.x += self.vx;
        self.y += self.vy;
    }

    fn serialize(&self, w: &mut WritePacket) {
        w.write_u64(self.id.as_u64());
        w.write_f64(self.x);
        w.write_f64(self.y);
        w.write_f64(self.vx);
        w.write_f64(self.vy);
    }

    fn deserialize(r: &mut ReadPacket<'_>) -> Result<Self, TssError> {
        Ok(Self {
            id: EntityId::new(r.read_u64()?),
            x: r.read_f64()?,
            y: r.read_f64()?,
            vx: r.read_f64()?,
            vy: r.read_f64()?,
        })
    }
}

struct GameConfig;

impl Config for GameConfig {
    type Entity = Ship;

    fn apply_command(cmd: &Command, snapshot: &mut Snapshot<Self>) {
        if cmd.kind != THRUST_KIND {
            return;
        }
        let mut r = ReadPacket::new(&cmd.payload);
        let (Ok(id), Ok(dx), Ok(dy)) = (r.read_u64(), r.read_f64(), r.read_f64()) else {
            return;
        };
        if let Some(ship) = snapshot.entity(EntityId::new(id)) {
            let mut ship = ship.clone();
            ship.vx += dx;
            ship.vy += dy;
            snapshot.insert_entity(ship);
        }
    }
}

fn thrust_payload(id: EntityId, dx: f64, dy: f64) -> Vec<u8> {
    let mut w = WritePacket::new();
    w.write_u64(id.as_u64());
    w.write_f64(dx);
    w.write_f64(dy);
    w.into_bytes()
}

/// One of four fixed cardinal impulses, cycling by frame so every client
/// thrusts deterministically without needing to read user input.
fn cardinal_impulse(frame: i32) -> (f64, f64) {
    match (frame / THRUST_INTERVAL_FRAMES as i32) % 4 {
        0 => (0.1, 0.0),
        1 => (0.0, 0.1),
        2 => (-0.1, 0.0),
        _ => (0.0, -0.1),
    }
}

fn run_server(port: u16, max_players: Option<usize>) -> std::io::Result<()> {
    let mut transport = UdpTransport::bind_to_port(port)?;
    let mut server: ServerController<GameConfig, SocketAddr> =
        ServerController::new(DELAYS.to_vec(), max_players, FPS);
    println!("hosting on 0.0.0.0:{port}, fps={FPS}, delays={DELAYS:?}");

    let frame_duration = Duration::from_secs_f64(1.0 / f64::from(FPS));
    let mut last_tick = Instant::now();

    loop {
        for (addr, bytes) in transport.receive_all() {
            server.handle_message(addr, &bytes);
        }

        for event in server.drain_events() {
            match event {
                ServerEvent::PlayerJoined { player_id, addr } => {
                    let ship = Ship { id: EntityId::new(u64::from(player_id.as_u32())), x: 0.0, y: 0.0, vx: 0.0, vy: 0.0 };
                    match server.spawn_entity(&ship) {
                        Ok(id) => println!("player {player_id} joined from {addr}, spawned ship {id}"),
                        Err(e) => eprintln!("failed to spawn ship for {player_id}: {e}"),
                    }
                },
                ServerEvent::JoinRejected { addr, reason } => {
                    println!("rejected join from {addr}: {reason}");
                },
                ServerEvent::PeerTimedOut { player_id } => {
                    println!("player {player_id} timed out");
                },
                ServerEvent::CommandRejected { player_id, reason } => {
                    println!("rejected command from {player_id}: {reason}");
                },
                _ => {},
            }
        }

        let elapsed = last_tick.elapsed();
        last_tick = Instant::now();
        if let Err(e) = server.update(elapsed) {
            eprintln!("server update error: {e}");
        }

        for (addr, bytes) in server.drain_outbox() {
            transport.send_to(&bytes, &addr);
        }

        let spent = last_tick.elapsed();
        if spent < frame_duration {
            std::thread::sleep(frame_duration - spent);
        }
    }
}

fn run_client(connect: SocketAddr, name: String) -> std::io::Result<()> {
    let mut transport = UdpTransport::bind_to_port(0)?;
    let mut client: ClientController<GameConfig> = ClientController::new(DELAYS.to_vec(), FPS);
    client.connect(name.clone(), vec![]);
    for bytes in client.drain_outbox() {
        transport.send_to(&bytes, &connect);
    }
    println!("connecting to {connect} as {name}");

    let frame_duration = Duration::from_secs_f64(1.0 / f64::from(FPS));
    let mut last_tick = Instant::now();

    loop {
        for (from, bytes) in transport.receive_all() {
            if from == connect {
                client.handle_message(&bytes);
            }
        }

        for event in client.drain_events() {
            match event {
                ClientEvent::Connected { player_id } => println!("connected as {player_id}"),
                ClientEvent::JoinRejected { reason } => println!("join rejected: {reason}"),
                ClientEvent::DesyncDetected { frame } => println!("desync detected at frame {frame}, resyncing"),
                ClientEvent::Resynced { frame } => println!("resynced at frame {frame}"),
                ClientEvent::CommandRejected { reason } => println!("local command rejected: {reason}"),
                _ => {},
            }
        }

        if let Some(player_id) = client.player_id() {
            let frame = client.current_frame();
            if frame.as_i32() % THRUST_INTERVAL_FRAMES as i32 == 0 {
                let (dx, dy) = cardinal_impulse(frame.as_i32());
                let id = EntityId::new(u64::from(player_id.as_u32()));
                if let Err(e) = client.submit_command(THRUST_KIND, thrust_payload(id, dx, dy)) {
                    eprintln!("local thrust rejected: {e}");
                }
            }
            if frame.as_i32() % (FPS as i32) == 0 {
                if let Some(ship) = client.leading_snapshot().entity(EntityId::new(u64::from(player_id.as_u32()))) {
                    println!("frame {frame}: ship at ({:.2}, {:.2})", ship.x, ship.y);
                }
            }
        }

        let elapsed = last_tick.elapsed();
        last_tick = Instant::now();
        if let Err(e) = client.update(elapsed) {
            eprintln!("client update error: {e}");
        }

        for bytes in client.drain_outbox() {
            transport.send_to(&bytes, &connect);
        }

        let spent = last_tick.elapsed();
        if spent < frame_duration {
            std::thread::sleep(frame_duration - spent);
        }
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    match args.mode {
        Mode::Host { port, max_players } => run_server(port, max_players),
        Mode::Join { connect, name } => run_client(connect, name),
    }
}
