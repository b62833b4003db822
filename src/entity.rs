//! The `Entity` contract: the only seam through which user simulation code
//! touches the TSS container.

use std::collections::BTreeMap;

use crate::packet::{ReadPacket, WritePacket};
use crate::{EntityId, TssError};

/// An object inside a simulation snapshot.
///
/// Implementors are opaque to the container: it only ever calls `id`, `step`,
/// `serialize`, and `deserialize`. `step` must be a pure function of the
/// entity's own state and the other entities visible through `view` - it must
/// not read wall-clock time, thread-local state, or anything outside the
/// snapshot, or two peers that ran the same commands will disagree.
pub trait Entity: Sized {
    /// This entity's globally-unique id.
    fn id(&self) -> EntityId;

    /// Advances this entity by one frame, given a read-only view of every
    /// other entity in the same snapshot.
    fn step(&mut self, view: &SnapshotView<'_, Self>);

    /// Serializes this entity's full state.
    fn serialize(&self, packet: &mut WritePacket);

    /// Deserializes an entity previously written by [`Entity::serialize`].
    fn deserialize(packet: &mut ReadPacket<'_>) -> Result<Self, TssError>;
}

/// A read-only view over every entity in a snapshot *other than* the one
/// currently being stepped.
///
/// Constructed by [`crate::Snapshot::step`] by temporarily removing the
/// entity under step from the snapshot's map; this sidesteps holding both a
/// mutable borrow of the entity being stepped and an immutable borrow of its
/// siblings at the same time, without `unsafe`.
pub struct SnapshotView<'a, E> {
    entities: &'a BTreeMap<EntityId, E>,
}

impl<'a, E> SnapshotView<'a, E> {
    pub(crate) fn new(entities: &'a BTreeMap<EntityId, E>) -> Self {
        Self { entities }
    }

    /// Looks up an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&E> {
        self.entities.get(&id)
    }

    /// Iterates every visible entity in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &E)> {
        self.entities.iter().map(|(id, e)| (*id, e))
    }

    /// Number of entities visible in this view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// `true` if no other entities are visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
