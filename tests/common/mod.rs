//! Shared fixtures for the integration test suite: a minimal entity and
//! `Config` used across the end-to-end and invariant tests.

#![allow(dead_code)]

use tss_rollback::packet::{ReadPacket, WritePacket};
use tss_rollback::{Command, Config, Entity, EntityId, Snapshot, SnapshotView, TssError};

/// A trivial entity: increments by one every step, optionally nudged by a
/// `Bump` command. Simple enough that its hash is easy to reason about by
/// hand in test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub id: EntityId,
    pub value: i64,
}

/// Command kind: adds `payload` (an i64) to the targeted counter.
pub const BUMP_KIND: i32 = 1;

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

pub struct CounterConfig;

impl Config for CounterConfig {
    type Entity = Counter;

    fn apply_command(cmd: &Command, snapshot: &mut Snapshot<Self>) {
        if cmd.kind != BUMP_KIND {
            return;
        }
        let mut r = ReadPacket::new(&cmd.payload);
        let Ok(id) = r.read_u64() else { return };
        let Ok(amount) = r.read_i64() else { return };
        if let Some(entity) = snapshot.entity(EntityId::new(id)) {
            let mut entity = entity.clone();
            entity.value += amount;
            snapshot.insert_entity(entity);
        }
    }
}

pub fn bump_payload(id: EntityId, amount: i64) -> Vec<u8> {
    let mut w = WritePacket::new();
    w.write_u64(id.as_u64());
    w.write_i64(amount);
    w.into_bytes()
}
