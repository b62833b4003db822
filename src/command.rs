//! Frame-stamped, player-attributed commands and their ordering.

use crate::{Frame, PlayerHandle};

/// Reserved `kind` for the built-in "spawn an entity" command. `payload` is
/// the entity's serialized form, as written by [`crate::Entity::serialize`].
pub const ADD_ENTITY_KIND: i32 = i32::MIN;

/// Reserved `kind` for the built-in "despawn an entity" command. `payload` is
/// the eight little-endian bytes of the target [`crate::EntityId`].
pub const REMOVE_ENTITY_KIND: i32 = i32::MIN + 1;

/// A frame-stamped, player-attributed intent.
///
/// Equality (and the within-frame ordering used by [`crate::CommandLog`]) is
/// defined over `(player_id, kind, payload)`: `frame` is not part of it
/// because a command log bucket is already keyed by frame, and
/// `authoritative` is deliberately excluded because an authoritative and a
/// non-authoritative command with the same `(player_id, kind, payload)` are
/// the *same command*, differing only in trust - the authoritative one
/// supersedes rather than coexisting as a distinct entry.
#[derive(Debug, Clone)]
pub struct Command {
    /// The player who issued (or, for server-originated spawns, is
    /// attributed) this command.
    pub player_id: PlayerHandle,
    /// The frame this command is stamped to apply at.
    pub frame: Frame,
    /// `true` if this command was accepted and echoed by the authoritative
    /// server. An authoritative command supersedes a non-authoritative one
    /// that otherwise compares equal.
    pub authoritative: bool,
    /// The command's kind. Two reserved sentinel values
    /// ([`ADD_ENTITY_KIND`], [`REMOVE_ENTITY_KIND`]) are handled uniformly by
    /// the command log and TSS container rather than by
    /// [`crate::Config::apply_command`].
    pub kind: i32,
    /// Opaque, user-defined payload bytes.
    pub payload: Vec<u8>,
    /// Monotonic per-sender diagnostic counter. Plays no role in equality,
    /// ordering, or correctness - observational only, for duplicate and
    /// reordering telemetry.
    pub sequence: u32,
}

impl Command {
    /// Creates a new non-authoritative command at `sequence` 0.
    #[must_use]
    pub fn new(player_id: PlayerHandle, frame: Frame, kind: i32, payload: Vec<u8>) -> Self {
        Self {
            player_id,
            frame,
            authoritative: false,
            kind,
            payload,
            sequence: 0,
        }
    }

    /// The `(player_id, kind, payload)` key this command is ordered and
    /// compared by.
    #[must_use]
    pub fn ordering_key(&self) -> (PlayerHandle, i32, &[u8]) {
        (self.player_id, self.kind, &self.payload)
    }

    /// `true` if this is a built-in spawn command.
    #[must_use]
    pub const fn is_add_entity(&self) -> bool {
        self.kind == ADD_ENTITY_KIND
    }

    /// `true` if this is a built-in despawn command.
    #[must_use]
    pub const fn is_remove_entity(&self) -> bool {
        self.kind == REMOVE_ENTITY_KIND
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.ordering_key() == other.ordering_key()
    }
}

impl Eq for Command {}

impl PartialOrd for Command {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Command {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(player: u32, kind: i32, payload: &[u8], authoritative: bool) -> Command {
        Command {
            player_id: PlayerHandle::new(player),
            frame: Frame::new(0),
            authoritative,
            kind,
            payload: payload.to_vec(),
            sequence: 0,
        }
    }

    #[test]
    fn equality_ignores_authoritative_flag_and_frame() {
        let a = Command {
            frame: Frame::new(1),
            ..cmd(1, 2, b"x", false)
        };
        let b = Command {
            frame: Frame::new(99),
            ..cmd(1, 2, b"x", true)
        };
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_lexicographic_over_player_kind_payload() {
        let a = cmd(1, 0, b"a", false);
        let b = cmd(1, 0, b"b", false);
        assert!(a < b);

        let c = cmd(1, 5, b"a", false);
        assert!(a < c);

        let d = cmd(2, 0, b"a", false);
        assert!(a < d);
    }

    #[test]
    fn sentinel_kinds_are_recognized() {
        let add = cmd(1, ADD_ENTITY_KIND, b"", false);
        let remove = cmd(1, REMOVE_ENTITY_KIND, b"", false);
        assert!(add.is_add_entity());
        assert!(remove.is_remove_entity());
        assert!(!add.is_remove_entity());
    }
}
