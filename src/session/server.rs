//! The authoritative server controller: owns the frame clock, the player
//! roster, and the sole writable copy of the TSS container.

use std::collections::BTreeMap;
use std::time::Duration;

use web_time::Instant;

use crate::session::player::{Player, PlayerRegistry};
use crate::wire::Envelope;
use crate::{Address, Command, Config, EntityId, Frame, PlayerHandle, Snapshot, TssContainer, TssError};

/// How often the trailing hash is broadcast.
pub const HASH_INTERVAL: Duration = Duration::from_secs(5);

/// How long a peer may go without a datagram before being timed out.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a join attempt may go unanswered before it's abandoned.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Events the embedding program must react to.
///
/// A plain enum drained once per `update`, rather than a callback invoked
/// mid-simulation.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ServerEvent<A: Address> {
    /// A new player joined and was accepted.
    PlayerJoined {
        /// The handle assigned to the new player.
        player_id: PlayerHandle,
        /// Their transport address.
        addr: A,
    },
    /// A join request was rejected (session full).
    JoinRejected {
        /// The address that attempted to join.
        addr: A,
        /// Human-readable rejection reason.
        reason: String,
    },
    /// A peer went silent past [`PEER_TIMEOUT`] and was dropped.
    PeerTimedOut {
        /// The handle that timed out.
        player_id: PlayerHandle,
    },
    /// A command was rejected as too old and the sender was notified.
    CommandRejected {
        /// The player whose command was rejected.
        player_id: PlayerHandle,
        /// Why it was rejected.
        reason: TssError,
    },
}

struct PeerState<A> {
    addr: A,
    last_seen: Instant,
}

/// Drives the authoritative simulation, accepts commands, and broadcasts
/// state to every connected peer.
///
/// Every accepted command is echoed to all peers including its originator,
/// which acts as an authoritative-version ACK for the client's own optimistic
/// insertion. A rejected command is answered with a [`Envelope::CommandRejected`]
/// sent only to its submitter, a cue to retract the local optimistic copy.
pub struct ServerController<C: Config, A: Address> {
    tss: TssContainer<C>,
    players: PlayerRegistry,
    peers: BTreeMap<PlayerHandle, PeerState<A>>,
    next_entity_id: u64,
    next_player_handle: u32,
    last_hash_broadcast: Instant,
    target_frame_duration: Duration,
    accumulator: Duration,
    events: Vec<ServerEvent<A>>,
    outbox: Vec<(A, Vec<u8>)>,
}

impl<C: Config, A: Address> ServerController<C, A> {
    /// Creates a new server controller with the given TSS frame lags and a
    /// fixed simulation rate in frames per second.
    #[must_use]
    pub fn new(delays: Vec<u32>, player_limit: Option<usize>, frames_per_second: u32) -> Self {
        Self {
            tss: TssContainer::new(Frame::new(0), delays),
            players: player_limit.map_or_else(PlayerRegistry::new, PlayerRegistry::with_limit),
            peers: BTreeMap::new(),
            next_entity_id: 1,
            next_player_handle: 1,
            last_hash_broadcast: Instant::now(),
            target_frame_duration: Duration::from_secs_f64(1.0 / f64::from(frames_per_second.max(1))),
            accumulator: Duration::ZERO,
            events: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// The current leading frame.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.tss.current_frame()
    }

    /// Read-only access to the authoritative leading snapshot, e.g. for
    /// rendering a server-side spectator view.
    #[must_use]
    pub fn leading_snapshot(&self) -> &Snapshot<C> {
        self.tss.leading_snapshot()
    }

    /// Drains queued outbound `(address, bytes)` pairs for the transport to
    /// send. Call after every [`ServerController::update`].
    pub fn drain_outbox(&mut self) -> Vec<(A, Vec<u8>)> {
        std::mem::take(&mut self.outbox)
    }

    /// Drains queued events for the embedding program to react to.
    pub fn drain_events(&mut self) -> Vec<ServerEvent<A>> {
        std::mem::take(&mut self.events)
    }

    /// Advances the frame clock by `elapsed`, stepping the TSS by
    /// `floor(accumulated / target_frame_duration)` frames and carrying the
    /// remainder, then runs periodic housekeeping (hash broadcast, peer
    /// timeout sweep).
    ///
    /// # Errors
    ///
    /// Returns the first [`TssError`] a `step()` call produces. These are
    /// simulation-internal and should never occur for a server's own
    /// leading snapshot advancing without commands.
    pub fn update(&mut self, elapsed: Duration) -> Result<(), TssError> {
        self.accumulator += elapsed;
        while self.accumulator >= self.target_frame_duration {
            self.accumulator -= self.target_frame_duration;
            self.tss.step()?;
        }

        self.sweep_timed_out_peers();

        if self.last_hash_broadcast.elapsed() >= HASH_INTERVAL {
            self.last_hash_broadcast = Instant::now();
            let trailing_frame = self.tss.trailing_frame();
            let hash = self.tss.snapshot_hash();
            self.broadcast(&Envelope::HashCheck { trailing_frame, hash });
            tracing::debug!(?trailing_frame, hash, "broadcast hash check");
        }

        Ok(())
    }

    /// Handles one inbound datagram from `from`.
    pub fn handle_message(&mut self, from: A, bytes: &[u8]) {
        let envelope = match Envelope::decode(bytes) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(?e, "dropping malformed datagram");
                return;
            },
        };
        if let Some(peer) = self.peer_for_addr(&from) {
            self.peers.get_mut(&peer).expect("looked up by addr").last_seen = Instant::now();
        }
        match envelope {
            Envelope::JoinRequest { name, user_payload } => self.handle_join(from, name, user_payload),
            Envelope::Command { player_id, frame, kind, payload } => {
                self.handle_command(player_id, frame, kind, payload);
            },
            Envelope::Sync { echoed_frame, .. } => {
                let reply = Envelope::Sync {
                    echoed_frame,
                    server_frame: i64::from(self.tss.current_frame().as_i32()),
                };
                self.send_to(&from, &reply);
            },
            Envelope::GameStateRequest => self.handle_game_state_request(&from),
            Envelope::PlayerLeave { player_id } => self.handle_leave(player_id),
            Envelope::GameStateResponse { .. }
            | Envelope::HashCheck { .. }
            | Envelope::AddEntity { .. }
            | Envelope::RemoveEntity { .. }
            | Envelope::JoinAccept { .. }
            | Envelope::JoinReject { .. }
            | Envelope::CommandRejected { .. } => {
                tracing::debug!("ignoring server-originated message received from a client");
            },
        }
    }

    /// Spawns `entity` at the next frame and broadcasts the spawn.
    ///
    /// # Errors
    ///
    /// Propagates a [`TssError`] from the underlying TSS container; for the
    /// server's own leading snapshot this is not expected to occur.
    pub fn spawn_entity(&mut self, entity: &C::Entity) -> Result<EntityId, TssError> {
        use crate::entity::Entity as _;

        let id = EntityId::new(self.next_entity_id);
        self.next_entity_id += 1;
        let frame = self.tss.current_frame() + 1;
        self.tss.add_entity(entity, frame)?;

        let mut payload = crate::packet::WritePacket::new();
        entity.serialize(&mut payload);
        self.broadcast(&Envelope::AddEntity { frame, entity: payload.into_bytes() });
        Ok(id)
    }

    /// Despawns entity `id` at the next frame and broadcasts the despawn.
    ///
    /// # Errors
    ///
    /// Propagates a [`TssError`] from the underlying TSS container.
    pub fn despawn_entity(&mut self, id: EntityId) -> Result<(), TssError> {
        let frame = self.tss.current_frame() + 1;
        self.tss.remove_entity(id, frame)?;
        self.broadcast(&Envelope::RemoveEntity { frame, entity_id: id.as_u64() });
        Ok(())
    }

    fn handle_join(&mut self, addr: A, name: String, user_payload: Vec<u8>) {
        let player_id = PlayerHandle::new(self.next_player_handle);
        match self.players.insert(Player::new(player_id, name, user_payload)) {
            Ok(()) => {
                self.next_player_handle += 1;
                self.peers.insert(player_id, PeerState { addr: addr.clone(), last_seen: Instant::now() });
                let state = self.tss.leading_snapshot().serialize().into_bytes();
                self.send_to(
                    &addr,
                    &Envelope::JoinAccept {
                        player_id,
                        current_frame: self.tss.current_frame(),
                        state,
                    },
                );
                self.events.push(ServerEvent::PlayerJoined { player_id, addr });
            },
            Err(e) => {
                self.send_to(&addr, &Envelope::JoinReject { reason: e.to_string() });
                self.events.push(ServerEvent::JoinRejected { addr, reason: e.to_string() });
            },
        }
    }

    fn handle_command(&mut self, player_id: PlayerHandle, frame: Frame, kind: i32, payload: Vec<u8>) {
        let cmd = Command {
            player_id,
            frame,
            authoritative: true,
            kind,
            payload,
            sequence: 0,
        };
        match self.tss.push_command(cmd.clone()) {
            Ok(()) => {
                self.broadcast(&Envelope::Command {
                    player_id: cmd.player_id,
                    frame: cmd.frame,
                    kind: cmd.kind,
                    payload: cmd.payload,
                });
            },
            Err(e) => {
                tracing::warn!(?player_id, ?frame, ?e, "rejected command");
                if let Some(addr) = self.peers.get(&player_id).map(|peer| peer.addr.clone()) {
                    self.send_to(
                        &addr,
                        &Envelope::CommandRejected {
                            player_id: cmd.player_id,
                            frame: cmd.frame,
                            kind: cmd.kind,
                            payload: cmd.payload,
                        },
                    );
                }
                self.events.push(ServerEvent::CommandRejected { player_id, reason: e });
            },
        }
    }

    fn handle_game_state_request(&mut self, addr: &A) {
        let snapshot = self.tss.leading_snapshot().serialize().into_bytes();
        self.send_to(addr, &Envelope::GameStateResponse { snapshot });
    }

    fn handle_leave(&mut self, player_id: PlayerHandle) {
        self.players.remove(player_id);
        self.peers.remove(&player_id);
        self.broadcast(&Envelope::PlayerLeave { player_id });
    }

    fn sweep_timed_out_peers(&mut self) {
        let timed_out: Vec<PlayerHandle> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.last_seen.elapsed() >= PEER_TIMEOUT)
            .map(|(&handle, _)| handle)
            .collect();
        for player_id in timed_out {
            self.players.remove(player_id);
            self.peers.remove(&player_id);
            self.events.push(ServerEvent::PeerTimedOut { player_id });
            self.broadcast(&Envelope::PlayerLeave { player_id });
        }
    }

    fn peer_for_addr(&self, addr: &A) -> Option<PlayerHandle> {
        self.peers
            .iter()
            .find(|(_, peer)| &peer.addr == addr)
            .map(|(&handle, _)| handle)
    }

    fn send_to(&mut self, addr: &A, envelope: &Envelope) {
        self.outbox.push((addr.clone(), envelope.encode()));
    }

    fn broadcast(&mut self, envelope: &Envelope) {
        let bytes = envelope.encode();
        for peer in self.peers.values() {
            self.outbox.push((peer.addr.clone(), bytes.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, SnapshotView};
    use crate::packet::{ReadPacket, WritePacket};
    use crate::Snapshot;

    #[derive(Clone)]
    struct Counter {
        id: EntityId,
        value: i64,
    }

    impl Entity for Counter {
        fn id(&self) -> EntityId {
            self.id
        }
        fn step(&mut self, _view: &SnapshotView<'_, Self>) {
            self.value += 1;
        }
        fn serialize(&self, w: &mut WritePacket) {
            w.write_u64(self.id.as_u64());
            w.write_i64(self.value);
        }
        fn deserialize(r: &mut ReadPacket<'_>) -> Result<Self, TssError> {
            Ok(Self {
                id: EntityId::new(r.read_u64()?),
                value: r.read_i64()?,
            })
        }
    }

    struct TestConfig;
    impl Config for TestConfig {
        type Entity = Counter;
        fn apply_command(_cmd: &Command, _snapshot: &mut Snapshot<Self>) {}
    }

    #[test]
    fn join_request_is_accepted_and_assigned_a_handle() {
        let mut server: ServerController<TestConfig, u32> = ServerController::new(vec![0, 10], None, 60);
        let req = Envelope::JoinRequest { name: "nova".to_string(), user_payload: vec![] };
        server.handle_message(42, &req.encode());

        let events = server.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::PlayerJoined { player_id, addr: 42 } if player_id == PlayerHandle::new(1)));

        let outbox = server.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert!(matches!(Envelope::decode(&outbox[0].1).unwrap(), Envelope::JoinAccept { .. }));
    }

    #[test]
    fn join_beyond_limit_is_rejected() {
        let mut server: ServerController<TestConfig, u32> = ServerController::new(vec![0], Some(1), 60);
        server.handle_message(1, &Envelope::JoinRequest { name: "a".to_string(), user_payload: vec![] }.encode());
        server.drain_events();
        server.drain_outbox();

        server.handle_message(2, &Envelope::JoinRequest { name: "b".to_string(), user_payload: vec![] }.encode());
        let events = server.drain_events();
        assert!(matches!(&events[0], ServerEvent::JoinRejected { addr: 2, .. }));
    }

    #[test]
    fn accepted_command_is_broadcast_and_rejected_one_is_reported() {
        let mut server: ServerController<TestConfig, u32> = ServerController::new(vec![0, 10], None, 60);
        server.handle_message(1, &Envelope::JoinRequest { name: "a".to_string(), user_payload: vec![] }.encode());
        server.drain_events();
        server.drain_outbox();

        for _ in 0..20 {
            server.update(Duration::from_millis(1000 / 60)).unwrap();
        }

        let cmd_msg = Envelope::Command {
            player_id: PlayerHandle::new(1),
            frame: server.current_frame(),
            kind: 7,
            payload: vec![1],
        };
        server.handle_message(1, &cmd_msg.encode());
        let outbox = server.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert!(matches!(Envelope::decode(&outbox[0].1).unwrap(), Envelope::Command { kind: 7, .. }));

        let stale = Envelope::Command {
            player_id: PlayerHandle::new(1),
            frame: Frame::new(-1),
            kind: 7,
            payload: vec![],
        };
        server.handle_message(1, &stale.encode());
        let events = server.drain_events();
        assert!(matches!(&events[0], ServerEvent::CommandRejected { reason: TssError::TooOld { .. }, .. }));

        let outbox = server.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert!(matches!(
            Envelope::decode(&outbox[0].1).unwrap(),
            Envelope::CommandRejected { player_id, frame, kind: 7, .. }
                if player_id == PlayerHandle::new(1) && frame == Frame::new(-1)
        ));
    }

    #[test]
    fn spawn_entity_broadcasts_add_entity() {
        let mut server: ServerController<TestConfig, u32> = ServerController::new(vec![0], None, 60);
        server.handle_message(1, &Envelope::JoinRequest { name: "a".to_string(), user_payload: vec![] }.encode());
        server.drain_events();
        server.drain_outbox();

        server.spawn_entity(&Counter { id: EntityId::new(1), value: 0 }).unwrap();
        let outbox = server.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert!(matches!(Envelope::decode(&outbox[0].1).unwrap(), Envelope::AddEntity { .. }));
    }
}
