//! Player roster shared by the server and client controllers.

use std::collections::BTreeMap;

use crate::PlayerHandle;

/// A player within a session.
///
/// `handle` is stable for the session's lifetime once assigned by the
/// authoritative server; `user_payload` is opaque to the core and
/// (de)serialized entirely by the embedding program.
#[derive(Debug, Clone)]
pub struct Player {
    /// This player's stable handle.
    pub handle: PlayerHandle,
    /// A display name, not used by the core beyond carrying it.
    pub name: String,
    /// Opaque, embedder-defined data (cosmetic loadout, team, etc.).
    pub user_payload: Vec<u8>,
}

impl Player {
    /// Creates a new player.
    #[must_use]
    pub fn new(handle: PlayerHandle, name: impl Into<String>, user_payload: Vec<u8>) -> Self {
        Self {
            handle,
            name: name.into(),
            user_payload,
        }
    }
}

/// The set of players in a session.
///
/// On the server this also enforces a player limit; on the client it tracks
/// the roster as reflected by the server plus which handle is "local."
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerHandle, Player>,
    limit: Option<usize>,
}

impl PlayerRegistry {
    /// Creates an empty registry with no player limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that rejects joins past `limit` players.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            players: BTreeMap::new(),
            limit: Some(limit),
        }
    }

    /// Registers `player`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TssError::SessionFull`] if a limit is configured and
    /// already reached.
    pub fn insert(&mut self, player: Player) -> Result<(), crate::TssError> {
        if let Some(limit) = self.limit {
            if self.players.len() >= limit && !self.players.contains_key(&player.handle) {
                return Err(crate::TssError::SessionFull { limit });
            }
        }
        self.players.insert(player.handle, player);
        Ok(())
    }

    /// Removes a player, e.g. on disconnect or explicit leave.
    pub fn remove(&mut self, handle: PlayerHandle) -> Option<Player> {
        self.players.remove(&handle)
    }

    /// Looks up a player by handle.
    #[must_use]
    pub fn get(&self, handle: PlayerHandle) -> Option<&Player> {
        self.players.get(&handle)
    }

    /// Iterates all registered players in ascending handle order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Number of registered players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// `true` if no players are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// The configured player limit, if any.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_roundtrip() {
        let mut reg = PlayerRegistry::new();
        reg.insert(Player::new(PlayerHandle::new(1), "alice", vec![]))
            .unwrap();
        assert_eq!(reg.get(PlayerHandle::new(1)).unwrap().name, "alice");
    }

    #[test]
    fn limit_is_enforced() {
        let mut reg = PlayerRegistry::with_limit(1);
        reg.insert(Player::new(PlayerHandle::new(1), "a", vec![]))
            .unwrap();
        let err = reg
            .insert(Player::new(PlayerHandle::new(2), "b", vec![]))
            .unwrap_err();
        assert!(matches!(err, crate::TssError::SessionFull { limit: 1 }));
    }

    #[test]
    fn reinserting_same_handle_does_not_count_against_limit() {
        let mut reg = PlayerRegistry::with_limit(1);
        reg.insert(Player::new(PlayerHandle::new(1), "a", vec![]))
            .unwrap();
        assert!(reg
            .insert(Player::new(PlayerHandle::new(1), "a-renamed", vec![]))
            .is_ok());
    }

    #[test]
    fn remove_drops_player() {
        let mut reg = PlayerRegistry::new();
        reg.insert(Player::new(PlayerHandle::new(1), "a", vec![]))
            .unwrap();
        assert!(reg.remove(PlayerHandle::new(1)).is_some());
        assert!(reg.is_empty());
    }
}
