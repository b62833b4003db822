//! The client controller: drives a local TSS toward the server's frame
//! clock, optimistically applies local input, and reconciles drift.

use std::time::Duration;

use web_time::Instant;

use crate::time_sync::{TimeSync, TimeSyncConfig};
use crate::wire::Envelope;
use crate::{Command, Config, Frame, PlayerHandle, Snapshot, TssContainer, TssError};

/// Maximum per-tick correction applied by the time-sync smoothing term, in
/// frames. Bounds jitter from the correction itself becoming visible.
const MAX_CORRECTION_FRAMES: i32 = 1;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No join request has been sent yet.
    Unconnected,
    /// A join request is outstanding.
    Connecting,
    /// The server accepted the join and the local TSS is initialized.
    Connected,
}

/// Events the embedding program must react to.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ClientEvent {
    /// The join handshake completed and the local simulation is ready.
    Connected {
        /// The handle assigned by the server.
        player_id: PlayerHandle,
    },
    /// The join request was rejected.
    JoinRejected {
        /// The server's stated reason.
        reason: String,
    },
    /// A hash mismatch was detected; a full resync has been requested.
    DesyncDetected {
        /// The frame the mismatch was observed at.
        frame: Frame,
    },
    /// A full resync completed and the local simulation was replaced.
    Resynced {
        /// The frame the new simulation starts from.
        frame: Frame,
    },
    /// A locally-submitted command was rejected by the server as too old.
    CommandRejected {
        /// Why the server rejected it.
        reason: TssError,
    },
}

/// Drives a client's local TSS container, reconciling it against the
/// authoritative server.
///
/// Applies local commands optimistically and upgrades them in place once the
/// server echoes an authoritative version, or retracts them if the server
/// instead reports them too late; a rolling average of the frame advantage
/// against the server provides the per-tick pacing correction.
pub struct ClientController<C: Config> {
    tss: TssContainer<C>,
    state: ConnectionState,
    player_id: Option<PlayerHandle>,
    time_sync: TimeSync,
    target_frame_duration: Duration,
    accumulator: Duration,
    last_sync_sent: Instant,
    sync_interval: Duration,
    pending_sync_frame: Option<Frame>,
    server_frame_estimate: Option<Frame>,
    awaiting_resync: bool,
    events: Vec<ClientEvent>,
    outbox: Vec<Vec<u8>>,
}

impl<C: Config> ClientController<C> {
    /// Creates a new, unconnected client controller.
    #[must_use]
    pub fn new(delays: Vec<u32>, frames_per_second: u32) -> Self {
        Self {
            tss: TssContainer::new(Frame::new(0), delays),
            state: ConnectionState::Unconnected,
            player_id: None,
            time_sync: TimeSync::with_config(TimeSyncConfig::default()),
            target_frame_duration: Duration::from_secs_f64(1.0 / f64::from(frames_per_second.max(1))),
            accumulator: Duration::ZERO,
            last_sync_sent: Instant::now(),
            sync_interval: Duration::from_secs(2),
            pending_sync_frame: None,
            server_frame_estimate: None,
            awaiting_resync: false,
            events: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// This client's assigned player handle, once connected.
    #[must_use]
    pub const fn player_id(&self) -> Option<PlayerHandle> {
        self.player_id
    }

    /// Read access to the local leading snapshot, for rendering.
    #[must_use]
    pub fn leading_snapshot(&self) -> &Snapshot<C> {
        self.tss.leading_snapshot()
    }

    /// The local leading frame.
    #[must_use]
    pub fn current_frame(&self) -> Frame {
        self.tss.current_frame()
    }

    /// Drains queued outbound bytes for the transport to send to the server.
    pub fn drain_outbox(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// Drains queued events for the embedding program to react to.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Sends a join request with the given display name and opaque payload.
    pub fn connect(&mut self, name: impl Into<String>, user_payload: Vec<u8>) {
        self.state = ConnectionState::Connecting;
        self.outbox.push(
            Envelope::JoinRequest { name: name.into(), user_payload }.encode(),
        );
    }

    /// Submits a local command: inserted into the local TSS immediately as
    /// non-authoritative (optimistic), and queued for sending to the server.
    /// The server will later echo an authoritative version, which upgrades
    /// the log entry in place.
    ///
    /// # Errors
    ///
    /// Returns the [`TssError`] from the local, optimistic insertion (e.g.
    /// if the command targets a frame older than the local trailing frame).
    pub fn submit_command(&mut self, kind: i32, payload: Vec<u8>) -> Result<(), TssError> {
        let Some(player_id) = self.player_id else {
            return Ok(());
        };
        let frame = self.tss.current_frame();
        let cmd = Command::new(player_id, frame, kind, payload.clone());
        self.tss.push_command(cmd)?;
        self.outbox.push(Envelope::Command { player_id, frame, kind, payload }.encode());
        Ok(())
    }

    /// Advances the local clock by `elapsed`, applying the time-sync
    /// correction term (bounded to ±1 frame per tick) and periodically
    /// sending a `SYNC` round trip.
    ///
    /// # Errors
    ///
    /// Propagates a [`TssError`] from a `step()` call against the local TSS.
    pub fn update(&mut self, elapsed: Duration) -> Result<(), TssError> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }

        let correction = self.time_sync.average_frame_advantage().clamp(-MAX_CORRECTION_FRAMES, MAX_CORRECTION_FRAMES);
        let corrected = if correction >= 0 {
            elapsed + Duration::from_secs_f64(f64::from(correction) * self.target_frame_duration.as_secs_f64())
        } else {
            elapsed.saturating_sub(Duration::from_secs_f64(
                f64::from(-correction) * self.target_frame_duration.as_secs_f64(),
            ))
        };

        self.accumulator += corrected;
        while self.accumulator >= self.target_frame_duration {
            self.accumulator -= self.target_frame_duration;
            self.tss.step()?;
        }

        if let Some(server_frame) = self.server_frame_estimate {
            let local_adv = self.tss.current_frame() - server_frame;
            self.time_sync.advance_frame(self.tss.current_frame(), local_adv, -local_adv);
        }

        if self.last_sync_sent.elapsed() >= self.sync_interval {
            self.last_sync_sent = Instant::now();
            let frame = i64::from(self.tss.current_frame().as_i32());
            self.pending_sync_frame = Some(self.tss.current_frame());
            self.outbox.push(Envelope::Sync { echoed_frame: frame, server_frame: 0 }.encode());
        }

        Ok(())
    }

    /// Handles one inbound datagram from the server.
    pub fn handle_message(&mut self, bytes: &[u8]) {
        let envelope = match Envelope::decode(bytes) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(?e, "dropping malformed datagram");
                return;
            },
        };
        match envelope {
            Envelope::JoinAccept { player_id, current_frame: _, state } => {
                self.handle_join_accept(player_id, &state);
            },
            Envelope::JoinReject { reason } => {
                self.state = ConnectionState::Unconnected;
                self.events.push(ClientEvent::JoinRejected { reason });
            },
            Envelope::Command { player_id, frame, kind, payload } => {
                self.handle_authoritative_command(player_id, frame, kind, payload);
            },
            Envelope::Sync { echoed_frame, server_frame } => {
                self.handle_sync_reply(echoed_frame, server_frame);
            },
            Envelope::HashCheck { trailing_frame, hash } => {
                self.handle_hash_check(trailing_frame, hash);
            },
            Envelope::GameStateResponse { snapshot } => self.install_full_state(&snapshot),
            Envelope::AddEntity { frame, entity } => {
                self.handle_authoritative_command(
                    PlayerHandle::new(0),
                    frame,
                    crate::ADD_ENTITY_KIND,
                    entity,
                );
            },
            Envelope::RemoveEntity { frame, entity_id } => {
                let mut payload = crate::packet::WritePacket::new();
                payload.write_u64(entity_id);
                self.handle_authoritative_command(
                    PlayerHandle::new(0),
                    frame,
                    crate::REMOVE_ENTITY_KIND,
                    payload.into_bytes(),
                );
            },
            Envelope::CommandRejected { player_id, frame, kind, payload } => {
                self.handle_command_rejected(player_id, frame, kind, payload);
            },
            Envelope::PlayerLeave { .. } | Envelope::GameStateRequest | Envelope::JoinRequest { .. } => {
                tracing::debug!("ignoring client-bound message that only makes sense server-side");
            },
        }
    }

    fn handle_join_accept(&mut self, player_id: PlayerHandle, state: &[u8]) {
        // `current_frame` on the wire is redundant with the frame embedded in
        // `state` itself (every snapshot serializes its own frame); only the
        // latter is consulted.
        self.player_id = Some(player_id);
        self.install_full_state(state);
        self.state = ConnectionState::Connected;
        self.events.push(ClientEvent::Connected { player_id });
    }

    fn handle_authoritative_command(&mut self, player_id: PlayerHandle, frame: Frame, kind: i32, payload: Vec<u8>) {
        let cmd = Command { player_id, frame, authoritative: true, kind, payload, sequence: 0 };
        if let Err(e) = self.tss.push_command(cmd) {
            match e {
                TssError::TooOld { .. } => {
                    tracing::warn!(?e, "authoritative command older than local trailing frame, requesting full resync");
                    self.request_full_resync(frame);
                },
                other => {
                    self.events.push(ClientEvent::CommandRejected { reason: other });
                },
            }
        }
    }

    /// The server refused a command this client submitted as too late. The
    /// local non-authoritative copy is retracted, rolling back any snapshot
    /// that had already applied it; if the command is already baked into
    /// every retained snapshot, a full resync is requested instead.
    fn handle_command_rejected(&mut self, player_id: PlayerHandle, frame: Frame, kind: i32, payload: Vec<u8>) {
        let cmd = Command { player_id, frame, authoritative: false, kind, payload, sequence: 0 };
        match self.tss.purge_command(&cmd) {
            Ok(()) => {
                self.events.push(ClientEvent::CommandRejected {
                    reason: TssError::TooOld { command_frame: frame, trailing_frame: self.tss.trailing_frame() },
                });
            },
            Err(TssError::NeedsFullResync { .. }) => {
                tracing::warn!(?frame, "rejected command already baked into trailing snapshot, requesting full resync");
                self.request_full_resync(frame);
            },
            Err(other) => {
                self.events.push(ClientEvent::CommandRejected { reason: other });
            },
        }
    }

    fn handle_sync_reply(&mut self, echoed_frame: i64, server_frame: i64) {
        if self.pending_sync_frame.take().is_none() {
            return;
        }
        let now_local_frame = i64::from(self.tss.current_frame().as_i32());
        let one_way_latency = (now_local_frame - echoed_frame) / 2;
        self.server_frame_estimate = Some(Frame::new((server_frame + one_way_latency) as i32));
    }

    fn handle_hash_check(&mut self, frame: Frame, server_hash: u32) {
        if self.tss.trailing_frame() < frame {
            let max_delay = self.tss.current_frame() - self.tss.trailing_frame();
            let target_leading = frame + max_delay;
            if self.tss.run_to_frame(target_leading).is_err() {
                self.request_full_resync(frame);
                return;
            }
        }
        if self.tss.trailing_frame() != frame {
            // Trailing already passed the checked frame, or hasn't caught up
            // to it yet even after stepping; nothing to compare this tick.
            return;
        }
        let local_hash = self.tss.snapshot_hash();
        if local_hash != server_hash {
            tracing::warn!(?frame, local_hash, server_hash, "hash mismatch detected");
            self.events.push(ClientEvent::DesyncDetected { frame });
            self.request_full_resync(frame);
        }
    }

    fn request_full_resync(&mut self, trigger_frame: Frame) {
        if self.awaiting_resync {
            return;
        }
        self.awaiting_resync = true;
        tracing::info!(?trigger_frame, "requesting full resync");
        self.outbox.push(Envelope::GameStateRequest.encode());
    }

    fn install_full_state(&mut self, bytes: &[u8]) {
        let mut reader = crate::packet::ReadPacket::new(bytes);
        match Snapshot::deserialize(&mut reader) {
            Ok(snapshot) => {
                let frame = snapshot.frame();
                self.tss.reset_from(snapshot);
                self.awaiting_resync = false;
                self.events.push(ClientEvent::Resynced { frame });
            },
            Err(e) => {
                tracing::warn!(?e, "failed to install full state snapshot");
            },
        }
    }
}
