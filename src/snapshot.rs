//! A pure, deterministic, steppable world at a specific frame.

use std::collections::BTreeMap;

use crate::hash::DeterministicHasher;
use crate::packet::{ReadPacket, WritePacket};
use crate::{Command, Config, Entity, EntityId, Frame, SnapshotView, TssError};

/// A pure simulation state at `frame`.
///
/// Snapshots know nothing of networking, time sync, or rollback bookkeeping;
/// [`crate::TssContainer`] owns all of that. A snapshot only steps, hashes,
/// clones, and (de)serializes.
#[derive(Clone)]
pub struct Snapshot<C: Config> {
    frame: Frame,
    entities: BTreeMap<EntityId, C::Entity>,
}

impl<C: Config> Snapshot<C> {
    /// Creates an empty snapshot at `frame`.
    #[must_use]
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            entities: BTreeMap::new(),
        }
    }

    /// The frame this snapshot currently represents.
    #[must_use]
    pub const fn frame(&self) -> Frame {
        self.frame
    }

    /// Looks up an entity by id.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&C::Entity> {
        self.entities.get(&id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Inserts an entity directly, bypassing the command path. Used when
    /// rebuilding a snapshot from a `GAME_STATE_RESPONSE` payload.
    pub fn insert_entity(&mut self, entity: C::Entity) {
        self.entities.insert(entity.id(), entity);
    }

    /// Removes an entity directly, bypassing the command path.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<C::Entity> {
        self.entities.remove(&id)
    }

    /// Applies a single command, in place, without advancing the frame.
    ///
    /// The two reserved kinds ([`crate::ADD_ENTITY_KIND`],
    /// [`crate::REMOVE_ENTITY_KIND`]) are handled here uniformly; every other
    /// kind is delegated to [`Config::apply_command`].
    pub fn apply(&mut self, cmd: &Command) -> Result<(), TssError> {
        if cmd.is_add_entity() {
            let mut reader = ReadPacket::new(&cmd.payload);
            let entity = C::Entity::deserialize(&mut reader)?;
            self.insert_entity(entity);
            return Ok(());
        }
        if cmd.is_remove_entity() {
            let mut reader = ReadPacket::new(&cmd.payload);
            let id = EntityId::new(reader.read_u64()?);
            self.remove_entity(id);
            return Ok(());
        }
        C::apply_command(cmd, self);
        Ok(())
    }

    /// Advances every entity by one frame, then applies `commands` (already
    /// in deterministic order) and advances `self.frame`.
    ///
    /// Entities step in ascending id order. Each entity is temporarily
    /// removed from the map before stepping so it can hold a `&mut` on
    /// itself while the rest of the map is borrowed immutably through
    /// [`SnapshotView`]; it is reinserted immediately afterward.
    pub fn step(&mut self, commands: &[Command]) -> Result<(), TssError> {
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            let Some(mut entity) = self.entities.remove(&id) else {
                continue;
            };
            {
                let view = SnapshotView::new(&self.entities);
                entity.step(&view);
            }
            self.entities.insert(id, entity);
        }

        for cmd in commands {
            self.apply(cmd)?;
        }

        self.frame += 1;
        Ok(())
    }

    /// Computes this snapshot's order-sensitive fingerprint.
    ///
    /// Entities are fed to the hasher in ascending id order so that two
    /// snapshots with the same logical state always hash equal, regardless
    /// of the order their constituent `add_entity` commands arrived in.
    #[must_use]
    pub fn hash(&self) -> u32 {
        let mut hasher = DeterministicHasher::new();
        hasher.write_i32(self.frame.as_i32());
        for (id, entity) in &self.entities {
            hasher.write_u64(id.as_u64());
            let mut packet = WritePacket::new();
            entity.serialize(&mut packet);
            hasher.write_bytes(packet.as_bytes());
        }
        hasher.finish()
    }

    /// Serializes this snapshot's full state: frame, entity count, then each
    /// entity's id and serialized payload in ascending id order.
    #[must_use]
    pub fn serialize(&self) -> WritePacket {
        let mut packet = WritePacket::new();
        packet.write_i32(self.frame.as_i32());
        packet.write_u32(self.entities.len() as u32);
        for (id, entity) in &self.entities {
            packet.write_u64(id.as_u64());
            let mut entity_packet = WritePacket::new();
            entity.serialize(&mut entity_packet);
            packet.write_packet(&entity_packet);
        }
        packet
    }

    /// Deserializes a snapshot previously written by [`Snapshot::serialize`].
    pub fn deserialize(packet: &mut ReadPacket<'_>) -> Result<Self, TssError> {
        let frame = Frame::new(packet.read_i32()?);
        let count = packet.read_u32()?;
        let mut entities = BTreeMap::new();
        for _ in 0..count {
            let id = EntityId::new(packet.read_u64()?);
            let mut entity_packet = packet.read_packet()?;
            let entity = C::Entity::deserialize(&mut entity_packet)?;
            entities.insert(id, entity);
        }
        Ok(Self { frame, entities })
    }
}
