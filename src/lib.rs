//! # TSS Rollback
//!
//! A fortified, server-authoritative reimagination of the TSS (Trailing-State
//! Synchronization) technique used in real-time multiplayer space games.
//!
//! Instead of symmetric peer-to-peer prediction, this crate keeps several
//! simulation snapshots running in parallel, staggered at configured frame
//! lags. The most trailing snapshot is the reliable view used for drift
//! detection; the leading snapshot is the responsive view used for local
//! input and rendering. Late-arriving authoritative commands roll back only
//! the snapshots that ran ahead of them, by cloning a more-trailing snapshot
//! and replaying the command log forward - never by inverting a step.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use command::{Command, ADD_ENTITY_KIND, REMOVE_ENTITY_KIND};
pub use command_log::{CommandLog, InsertOutcome};
pub use entity::{Entity, SnapshotView};
pub use error::TssError;
pub use session::client::{ClientController, ClientEvent, ConnectionState};
pub use session::server::{ServerController, ServerEvent};
pub use session::transport::{NonBlockingTransport, UdpTransport};
pub use session::{Player, PlayerRegistry};
pub use snapshot::Snapshot;
pub use tss::TssContainer;

#[doc(hidden)]
pub mod command;
#[doc(hidden)]
pub mod command_log;
pub mod entity;
#[doc(hidden)]
pub mod error;
pub mod hash;
pub mod packet;
pub mod rng;
#[doc(hidden)]
pub mod session {
    pub mod client;
    pub mod server;
    pub mod transport;

    mod player;
    pub use player::{Player, PlayerRegistry};
}
pub mod snapshot;
pub mod time_sync;
#[doc(hidden)]
pub mod tss;
#[doc(hidden)]
pub mod wire;

/// Internal module exposing implementation details for testing and fuzzing.
///
/// Nothing here is part of the stable public API.
#[doc(hidden)]
pub mod __internal {
    pub use crate::command::Command;
    pub use crate::command_log::CommandLog;
    pub use crate::hash::DeterministicHasher;
    pub use crate::tss::TssContainer;
    pub use crate::wire::{Envelope, Tag};
}

use std::fmt::Debug;
use std::hash::Hash;

/// Internally, -1 represents no frame / invalid frame.
pub const NULL_FRAME: i32 = -1;

/// A frame is a single step of deterministic simulation.
///
/// Frames are the fundamental unit of time in the TSS container. All
/// ordering - command log buckets, snapshot lags, hash checks - is keyed on
/// frame, never on wall-clock time or arrival order.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Frame(i32);

impl Frame {
    /// The null frame constant: "no frame" or "uninitialized".
    pub const NULL: Frame = Frame(NULL_FRAME);

    /// Creates a new `Frame` from an `i32`. Does not validate non-negativity.
    #[inline]
    #[must_use]
    pub const fn new(frame: i32) -> Self {
        Frame(frame)
    }

    /// Returns the underlying `i32` value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// `true` if this is the null frame.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == NULL_FRAME
    }

    /// `true` if this frame is valid (non-negative).
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "NULL_FRAME")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::ops::Add<i32> for Frame {
    type Output = Frame;
    #[inline]
    fn add(self, rhs: i32) -> Self::Output {
        Frame(self.0 + rhs)
    }
}

impl std::ops::AddAssign<i32> for Frame {
    #[inline]
    fn add_assign(&mut self, rhs: i32) {
        self.0 += rhs;
    }
}

impl std::ops::Sub<i32> for Frame {
    type Output = Frame;
    #[inline]
    fn sub(self, rhs: i32) -> Self::Output {
        Frame(self.0 - rhs)
    }
}

impl std::ops::Sub<Frame> for Frame {
    type Output = i32;
    #[inline]
    fn sub(self, rhs: Frame) -> Self::Output {
        self.0 - rhs.0
    }
}

impl From<i32> for Frame {
    #[inline]
    fn from(value: i32) -> Self {
        Frame(value)
    }
}

impl From<Frame> for i32 {
    #[inline]
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

/// A stable identifier for a player within a session.
///
/// Assigned by the authoritative server when a player joins; client-assigned
/// handles are never trusted.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PlayerHandle(u32);

impl PlayerHandle {
    /// Creates a new `PlayerHandle` from a raw number.
    #[inline]
    #[must_use]
    pub const fn new(handle: u32) -> Self {
        PlayerHandle(handle)
    }

    /// Returns the underlying raw number.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PlayerHandle {
    #[inline]
    fn from(value: u32) -> Self {
        PlayerHandle(value)
    }
}

/// A globally-unique entity identifier, assigned by the authoritative server.
///
/// `0` is reserved as the null id and is never assigned to a live entity.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct EntityId(u64);

impl EntityId {
    /// The reserved null entity id.
    pub const NULL: EntityId = EntityId(0);

    /// Wraps a raw `u64` as an `EntityId`. Does not validate non-zero-ness.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        EntityId(id)
    }

    /// Returns the underlying `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// `true` if this is the reserved null id.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compile-time parameterization for a TSS session.
///
/// Bundles the generic types a session needs onto a single marker struct, so
/// that sessions are parameterized by one type parameter instead of three.
///
/// `apply_command` is the single entry point for the command-application
/// user contract (spec §6): it must be a pure function of the command's
/// payload and the snapshot it is given, and must not observe wall-clock
/// time, thread identity, or any state outside the snapshot.
///
/// # Example
///
/// ```
/// use tss_rollback::{Command, Config, Entity, EntityId, Snapshot, SnapshotView};
///
/// #[derive(Clone)]
/// struct Ship {
///     id: EntityId,
///     x: i64,
/// }
///
/// impl Entity for Ship {
///     fn id(&self) -> EntityId {
///         self.id
///     }
///     fn step(&mut self, _view: &SnapshotView<'_, Self>) {
///         self.x += 1;
///     }
///     fn serialize(&self, w: &mut tss_rollback::packet::WritePacket) {
///         w.write_u64(self.id.as_u64());
///         w.write_i64(self.x);
///     }
///     fn deserialize(r: &mut tss_rollback::packet::ReadPacket<'_>) -> Result<Self, tss_rollback::TssError> {
///         Ok(Ship { id: EntityId::new(r.read_u64()?), x: r.read_i64()? })
///     }
/// }
///
/// struct GameConfig;
///
/// impl Config for GameConfig {
///     type Entity = Ship;
///     fn apply_command(_cmd: &Command, _snapshot: &mut Snapshot<Self>) {
///         // move commands, etc.
///     }
/// }
/// ```
pub trait Config: 'static {
    /// The simulation's entity type.
    type Entity: Entity;

    /// Applies a user command (any `kind` other than the two reserved
    /// built-ins) to the snapshot. Must be pure: a function only of `cmd`
    /// and the snapshot passed in.
    fn apply_command(cmd: &Command, snapshot: &mut Snapshot<Self>)
    where
        Self: Sized;
}

/// Compile time parameterization for sessions (the `NonBlockingSocket`-facing
/// address type and other bounds not tied to a specific `Config`).
#[cfg(feature = "sync-send")]
pub trait Address: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Send + Sync + Debug {}
#[cfg(feature = "sync-send")]
impl<T> Address for T where T: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Send + Sync + Debug
{}

/// Compile time parameterization for sessions (the `NonBlockingSocket`-facing
/// address type and other bounds not tied to a specific `Config`).
#[cfg(not(feature = "sync-send"))]
pub trait Address: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Debug {}
#[cfg(not(feature = "sync-send"))]
impl<T> Address for T where T: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Debug {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_null_roundtrip() {
        assert!(Frame::NULL.is_null());
        assert!(!Frame::NULL.is_valid());
        assert_eq!(Frame::NULL.as_i32(), NULL_FRAME);
    }

    #[test]
    fn frame_arithmetic() {
        let f = Frame::new(10);
        assert_eq!((f + 5).as_i32(), 15);
        assert_eq!((f - 3).as_i32(), 7);
        assert_eq!(Frame::new(10) - Frame::new(4), 6);
    }

    #[test]
    fn entity_id_null_is_zero() {
        assert!(EntityId::NULL.is_null());
        assert!(!EntityId::new(1).is_null());
    }

    #[test]
    fn player_handle_display() {
        assert_eq!(PlayerHandle::new(3).to_string(), "3");
    }
}
