//! Holds N parallel snapshots at configured frame-lags, accepts commands for
//! any future-or-trailing frame, and rolls back leading snapshots on late
//! command arrival by cloning a more-trailing snapshot and replaying forward.

use crate::command_log::CommandLog;
use crate::{Command, Config, EntityId, Frame, PlayerHandle, Snapshot, TssError};

/// The player handle attributed to server-originated commands (entity
/// spawn/despawn). `0` is otherwise a valid player handle on the wire, but
/// the TSS container never compares `player_id` against this value for
/// anything but ordering, so the aliasing is harmless.
const SERVER_PLAYER: PlayerHandle = PlayerHandle::new(0);

/// Ordered list of simulation snapshots, sorted by ascending configured
/// frame-lag.
///
/// `snapshots[0]` is the **leading** snapshot, at `current_frame`.
/// `snapshots[i]` is the **trailing-i** snapshot, at
/// `current_frame - delays[i]`. `delays` is strictly ascending with
/// `delays[0] == 0`. All snapshots descend from the same origin by replay of
/// the same command log.
pub struct TssContainer<C: Config> {
    delays: Vec<u32>,
    current_frame: Frame,
    log: CommandLog,
    snapshots: Vec<Snapshot<C>>,
}

impl<C: Config> TssContainer<C> {
    /// Creates a container with `delays.len()` snapshots, all starting empty
    /// at `origin_frame`.
    ///
    /// # Panics
    ///
    /// Panics if `delays` is empty, is not strictly ascending, or does not
    /// start at `0`.
    #[must_use]
    pub fn new(origin_frame: Frame, delays: Vec<u32>) -> Self {
        assert!(!delays.is_empty(), "a TSS container needs at least one snapshot");
        assert_eq!(delays[0], 0, "delays[0] must be 0 (the leading snapshot)");
        assert!(
            delays.windows(2).all(|w| w[0] < w[1]),
            "delays must be strictly ascending"
        );
        let snapshots = delays.iter().map(|_| Snapshot::new(origin_frame)).collect();
        Self {
            delays,
            current_frame: origin_frame,
            log: CommandLog::new(),
            snapshots,
        }
    }

    /// The leading frame, advanced by [`TssContainer::step`].
    #[must_use]
    pub const fn current_frame(&self) -> Frame {
        self.current_frame
    }

    /// The frame of the most-trailing retained snapshot.
    #[must_use]
    pub fn trailing_frame(&self) -> Frame {
        self.snapshots
            .last()
            .expect("at least one snapshot")
            .frame()
    }

    /// The leading (most responsive) snapshot.
    #[must_use]
    pub fn leading_snapshot(&self) -> &Snapshot<C> {
        &self.snapshots[0]
    }

    /// The most-trailing (most reliable) snapshot.
    #[must_use]
    pub fn trailing_snapshot(&self) -> &Snapshot<C> {
        self.snapshots.last().expect("at least one snapshot")
    }

    /// Snapshot at trailing-index `i` (`0` is leading).
    #[must_use]
    pub fn snapshot(&self, i: usize) -> &Snapshot<C> {
        &self.snapshots[i]
    }

    /// The trailing-most snapshot's fingerprint. Only this hash is compared
    /// across peers: its frame lags far enough that the authoritative
    /// command stream for that frame is guaranteed settled.
    #[must_use]
    pub fn snapshot_hash(&self) -> u32 {
        self.trailing_snapshot().hash()
    }

    /// Advances every snapshot one frame: `current_frame` increments, then
    /// each snapshot steps forward to `current_frame - delays[i]`, consuming
    /// every command logged for each intervening frame in deterministic
    /// order.
    pub fn step(&mut self) -> Result<(), TssError> {
        self.current_frame += 1;
        for i in 0..self.snapshots.len() {
            let target = self.current_frame - i32::try_from(self.delays[i]).unwrap_or(i32::MAX);
            self.advance_snapshot(i, target)?;
        }
        self.log.prune(self.trailing_frame());
        Ok(())
    }

    /// Repeatedly steps until `current_frame >= f`. Used by the client to
    /// compensate for variable timesteps.
    pub fn run_to_frame(&mut self, f: Frame) -> Result<(), TssError> {
        while self.current_frame < f {
            self.step()?;
        }
        Ok(())
    }

    /// Submits a command for insertion.
    ///
    /// * If `cmd.frame` is older than the most-trailing retained snapshot,
    ///   rejected with [`TssError::TooOld`].
    /// * If `cmd.frame >= ` every snapshot's frame (i.e. at or after the
    ///   leading frame), it is simply logged - no snapshot has passed that
    ///   frame yet.
    /// * Otherwise, every snapshot that has already advanced past
    ///   `cmd.frame` is rewound: cloned from the nearest more-trailing
    ///   snapshot that has not yet passed `cmd.frame`, then replayed forward
    ///   (now including this command) to its own target frame.
    pub fn push_command(&mut self, cmd: Command) -> Result<(), TssError> {
        let trailing_frame = self.trailing_frame();
        if cmd.frame < trailing_frame {
            return Err(TssError::TooOld {
                command_frame: cmd.frame,
                trailing_frame,
            });
        }

        let leading_frame = self.snapshots[0].frame();
        let cmd_frame = cmd.frame;
        let needs_rewind = cmd_frame < leading_frame;
        self.log.insert(cmd);

        if !needs_rewind {
            return Ok(());
        }
        for i in 0..self.snapshots.len() {
            if self.snapshots[i].frame() > cmd_frame {
                self.rewind_and_replay(i, cmd_frame)?;
            }
        }
        Ok(())
    }

    /// Retracts a previously-submitted command, rolling back any snapshot
    /// that had already applied it.
    ///
    /// Used when the authoritative peer signals that a non-authoritative
    /// command submitted locally arrived too late and was never applied:
    /// the optimistic copy must be un-applied rather than left to diverge
    /// from the authoritative log forever.
    ///
    /// # Errors
    ///
    /// Returns [`TssError::NeedsFullResync`] if `cmd.frame` is already older
    /// than the trailing frame - the command is baked into every retained
    /// snapshot and cannot be un-applied by replay.
    pub fn purge_command(&mut self, cmd: &Command) -> Result<(), TssError> {
        let trailing_frame = self.trailing_frame();
        if cmd.frame < trailing_frame {
            return Err(TssError::NeedsFullResync {
                target_frame: cmd.frame,
                trailing_frame,
            });
        }

        let leading_frame = self.snapshots[0].frame();
        let removed = self.log.remove(cmd.frame, cmd);
        if !removed || cmd.frame >= leading_frame {
            return Ok(());
        }
        for i in 0..self.snapshots.len() {
            if self.snapshots[i].frame() > cmd.frame {
                self.rewind_and_replay(i, cmd.frame)?;
            }
        }
        Ok(())
    }

    /// Spawns `entity` at `frame`, as a server-originated
    /// [`crate::ADD_ENTITY_KIND`] command.
    pub fn add_entity(&mut self, entity: &C::Entity, frame: Frame) -> Result<(), TssError> {
        use crate::entity::Entity as _;
        use crate::packet::WritePacket;

        let mut payload = WritePacket::new();
        entity.serialize(&mut payload);
        self.push_command(Command {
            player_id: SERVER_PLAYER,
            frame,
            authoritative: true,
            kind: crate::ADD_ENTITY_KIND,
            payload: payload.into_bytes(),
            sequence: 0,
        })
    }

    /// Despawns the entity `id` at `frame`, as a server-originated
    /// [`crate::REMOVE_ENTITY_KIND`] command.
    pub fn remove_entity(&mut self, id: EntityId, frame: Frame) -> Result<(), TssError> {
        use crate::packet::WritePacket;

        let mut payload = WritePacket::new();
        payload.write_u64(id.as_u64());
        self.push_command(Command {
            player_id: SERVER_PLAYER,
            frame,
            authoritative: true,
            kind: crate::REMOVE_ENTITY_KIND,
            payload: payload.into_bytes(),
            sequence: 0,
        })
    }

    fn advance_snapshot(&mut self, i: usize, target: Frame) -> Result<(), TssError> {
        while self.snapshots[i].frame() < target {
            let next_frame = self.snapshots[i].frame() + 1;
            let commands: Vec<Command> = self.log.commands_at(next_frame).cloned().collect();
            self.snapshots[i].step(&commands)?;
        }
        Ok(())
    }

    fn rewind_and_replay(&mut self, i: usize, not_after_frame: Frame) -> Result<(), TssError> {
        let source = ((i + 1)..self.snapshots.len())
            .find(|&j| self.snapshots[j].frame() <= not_after_frame);
        let Some(j) = source else {
            return Err(TssError::NeedsFullResync {
                target_frame: not_after_frame,
                trailing_frame: self.trailing_frame(),
            });
        };

        let target = self.current_frame - i32::try_from(self.delays[i]).unwrap_or(i32::MAX);
        let mut replay = self.snapshots[j].clone();
        while replay.frame() < target {
            let next_frame = replay.frame() + 1;
            let commands: Vec<Command> = self.log.commands_at(next_frame).cloned().collect();
            replay.step(&commands)?;
        }
        self.snapshots[i] = replay;
        Ok(())
    }

    /// Discards every retained snapshot and reinitializes the container at
    /// `snapshot`'s frame, with every snapshot starting from a clone of it.
    /// Used when a full resync replaces the local simulation.
    pub fn reset_from(&mut self, snapshot: Snapshot<C>) {
        self.current_frame = snapshot.frame();
        self.log = CommandLog::new();
        self.snapshots = self.delays.iter().map(|_| snapshot.clone()).collect();
    }
}
