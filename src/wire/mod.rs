//! The control-message wire protocol.
//!
//! Every control message shares a one-byte tag prefix, then a tag-specific
//! payload encoded with the [`crate::packet`] codec. Tags 1-7 are exactly as
//! specified; tags 8-12 are supplemented. Tags 8-11 are the join handshake
//! and the player-leave broadcast - the distilled command/TSS-log contract
//! presupposes a session-membership handshake exists, but does not itself
//! specify the wire shape of one. Tag 12 carries the "too late" rejection
//! signal the contract calls for but leaves unaddressed on the wire: the
//! server echoes the identifying fields of a command it refused to the
//! player who submitted it, so that player can retract its optimistic copy.
//!
//! Authoritativeness is never on the wire: any [`Tag::Command`] received by
//! a client is authoritative by definition, since only the server sends it.

use crate::packet::{ReadPacket, WritePacket};
use crate::{Frame, PlayerHandle, TssError};

/// The one-byte tag prefixing every control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u8)]
pub enum Tag {
    /// A serialized command, player-to-server or server-to-all.
    Command = 1,
    /// A time-sync round trip, client-to-server or the server's reply.
    Sync = 2,
    /// Client requests the full authoritative leading snapshot.
    GameStateRequest = 3,
    /// Server's reply to [`Tag::GameStateRequest`].
    GameStateResponse = 4,
    /// Periodic authoritative trailing-snapshot fingerprint broadcast.
    HashCheck = 5,
    /// Server-originated entity spawn broadcast.
    AddEntity = 6,
    /// Server-originated entity despawn broadcast.
    RemoveEntity = 7,
    /// Client requests to join the session.
    JoinRequest = 8,
    /// Server accepts a join request.
    JoinAccept = 9,
    /// Server rejects a join request.
    JoinReject = 10,
    /// Server broadcasts that a player left (disconnect or explicit leave).
    PlayerLeave = 11,
    /// Server tells the submitting player that their command arrived too
    /// late and was never applied authoritatively.
    CommandRejected = 12,
}

impl Tag {
    fn from_u8(value: u8) -> Result<Self, TssError> {
        match value {
            1 => Ok(Self::Command),
            2 => Ok(Self::Sync),
            3 => Ok(Self::GameStateRequest),
            4 => Ok(Self::GameStateResponse),
            5 => Ok(Self::HashCheck),
            6 => Ok(Self::AddEntity),
            7 => Ok(Self::RemoveEntity),
            8 => Ok(Self::JoinRequest),
            9 => Ok(Self::JoinAccept),
            10 => Ok(Self::JoinReject),
            11 => Ok(Self::PlayerLeave),
            12 => Ok(Self::CommandRejected),
            _ => Err(TssError::MalformedCommand {
                reason: "unknown wire tag",
            }),
        }
    }
}

/// A decoded control message.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Envelope {
    /// `{player_id, frame, kind, payload}`. Carries a [`crate::Command`]
    /// without its `authoritative` flag (implicit from who sent it) or its
    /// diagnostic `sequence` (local-only).
    Command {
        /// The issuing player.
        player_id: PlayerHandle,
        /// The frame this command is stamped to apply at.
        frame: Frame,
        /// The command's kind.
        kind: i32,
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },
    /// `{echoed_frame, server_frame}`.
    Sync {
        /// The frame value the peer sent, echoed back unchanged.
        echoed_frame: i64,
        /// The sender's current frame, present only on the server's reply.
        server_frame: i64,
    },
    /// No payload.
    GameStateRequest,
    /// `{snapshot}`, the serialized leading snapshot.
    GameStateResponse {
        /// Bytes previously produced by [`crate::Snapshot::serialize`].
        snapshot: Vec<u8>,
    },
    /// `{trailing_frame, hash}`.
    HashCheck {
        /// The frame the fingerprint was computed at.
        trailing_frame: Frame,
        /// The trailing snapshot's fingerprint at that frame.
        hash: u32,
    },
    /// `{frame, entity}`.
    AddEntity {
        /// The frame this spawn applies at.
        frame: Frame,
        /// The entity's serialized form.
        entity: Vec<u8>,
    },
    /// `{frame, entity_id}`.
    RemoveEntity {
        /// The frame this despawn applies at.
        frame: Frame,
        /// The despawned entity's id.
        entity_id: u64,
    },
    /// `{name, user_payload}`.
    JoinRequest {
        /// The joining player's requested display name.
        name: String,
        /// Opaque embedder-defined join data.
        user_payload: Vec<u8>,
    },
    /// `{player_id, current_frame, state}`.
    JoinAccept {
        /// The handle assigned to the new player.
        player_id: PlayerHandle,
        /// The server's current leading frame, to initialize the client's TSS at.
        current_frame: Frame,
        /// The serialized leading snapshot, so the client starts in sync.
        state: Vec<u8>,
    },
    /// `{reason}`.
    JoinReject {
        /// A human-readable rejection reason.
        reason: String,
    },
    /// `{player_id}`.
    PlayerLeave {
        /// The handle of the player who left.
        player_id: PlayerHandle,
    },
    /// `{player_id, frame, kind, payload}`. Identifies the rejected command
    /// by the same fields [`Envelope::Command`] carries, so the recipient
    /// can find and retract its local non-authoritative copy.
    CommandRejected {
        /// The player whose command was rejected.
        player_id: PlayerHandle,
        /// The frame the rejected command was stamped to apply at.
        frame: Frame,
        /// The rejected command's kind.
        kind: i32,
        /// The rejected command's payload.
        payload: Vec<u8>,
    },
}

impl Envelope {
    /// Encodes this message as a tagged byte buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WritePacket::new();
        match self {
            Self::Command {
                player_id,
                frame,
                kind,
                payload,
            } => {
                w.write_u8(Tag::Command as u8);
                w.write_i32(i32::try_from(player_id.as_u32()).unwrap_or(i32::MAX));
                w.write_i64(i64::from(frame.as_i32()));
                w.write_i32(*kind);
                w.write_blob(Some(payload));
            },
            Self::Sync {
                echoed_frame,
                server_frame,
            } => {
                w.write_u8(Tag::Sync as u8);
                w.write_i64(*echoed_frame);
                w.write_i64(*server_frame);
            },
            Self::GameStateRequest => {
                w.write_u8(Tag::GameStateRequest as u8);
            },
            Self::GameStateResponse { snapshot } => {
                w.write_u8(Tag::GameStateResponse as u8);
                w.write_blob(Some(snapshot));
            },
            Self::HashCheck { trailing_frame, hash } => {
                w.write_u8(Tag::HashCheck as u8);
                w.write_i64(i64::from(trailing_frame.as_i32()));
                w.write_u32(*hash);
            },
            Self::AddEntity { frame, entity } => {
                w.write_u8(Tag::AddEntity as u8);
                w.write_i64(i64::from(frame.as_i32()));
                w.write_blob(Some(entity));
            },
            Self::RemoveEntity { frame, entity_id } => {
                w.write_u8(Tag::RemoveEntity as u8);
                w.write_i64(i64::from(frame.as_i32()));
                w.write_i64(i64::try_from(*entity_id).unwrap_or(i64::MAX));
            },
            Self::JoinRequest { name, user_payload } => {
                w.write_u8(Tag::JoinRequest as u8);
                w.write_str(name);
                w.write_blob(Some(user_payload));
            },
            Self::JoinAccept {
                player_id,
                current_frame,
                state,
            } => {
                w.write_u8(Tag::JoinAccept as u8);
                w.write_u32(player_id.as_u32());
                w.write_i64(i64::from(current_frame.as_i32()));
                w.write_blob(Some(state));
            },
            Self::JoinReject { reason } => {
                w.write_u8(Tag::JoinReject as u8);
                w.write_str(reason);
            },
            Self::PlayerLeave { player_id } => {
                w.write_u8(Tag::PlayerLeave as u8);
                w.write_u32(player_id.as_u32());
            },
            Self::CommandRejected {
                player_id,
                frame,
                kind,
                payload,
            } => {
                w.write_u8(Tag::CommandRejected as u8);
                w.write_i32(i32::try_from(player_id.as_u32()).unwrap_or(i32::MAX));
                w.write_i64(i64::from(frame.as_i32()));
                w.write_i32(*kind);
                w.write_blob(Some(payload));
            },
        }
        w.into_bytes()
    }

    /// Decodes a control message previously produced by [`Envelope::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, TssError> {
        let mut r = ReadPacket::new(bytes);
        let tag = Tag::from_u8(r.read_u8()?)?;
        Ok(match tag {
            Tag::Command => {
                let player_id = PlayerHandle::new(r.read_i32()? as u32);
                let frame = Frame::new(r.read_i64()? as i32);
                let kind = r.read_i32()?;
                let payload = r.read_blob()?.unwrap_or_default();
                Self::Command {
                    player_id,
                    frame,
                    kind,
                    payload,
                }
            },
            Tag::Sync => Self::Sync {
                echoed_frame: r.read_i64()?,
                server_frame: r.read_i64()?,
            },
            Tag::GameStateRequest => Self::GameStateRequest,
            Tag::GameStateResponse => Self::GameStateResponse {
                snapshot: r.read_blob()?.unwrap_or_default(),
            },
            Tag::HashCheck => Self::HashCheck {
                trailing_frame: Frame::new(r.read_i64()? as i32),
                hash: r.read_u32()?,
            },
            Tag::AddEntity => Self::AddEntity {
                frame: Frame::new(r.read_i64()? as i32),
                entity: r.read_blob()?.unwrap_or_default(),
            },
            Tag::RemoveEntity => Self::RemoveEntity {
                frame: Frame::new(r.read_i64()? as i32),
                entity_id: r.read_i64()? as u64,
            },
            Tag::JoinRequest => Self::JoinRequest {
                name: r.read_str()?,
                user_payload: r.read_blob()?.unwrap_or_default(),
            },
            Tag::JoinAccept => Self::JoinAccept {
                player_id: PlayerHandle::new(r.read_u32()?),
                current_frame: Frame::new(r.read_i64()? as i32),
                state: r.read_blob()?.unwrap_or_default(),
            },
            Tag::JoinReject => Self::JoinReject {
                reason: r.read_str()?,
            },
            Tag::PlayerLeave => Self::PlayerLeave {
                player_id: PlayerHandle::new(r.read_u32()?),
            },
            Tag::CommandRejected => {
                let player_id = PlayerHandle::new(r.read_i32()? as u32);
                let frame = Frame::new(r.read_i64()? as i32);
                let kind = r.read_i32()?;
                let payload = r.read_blob()?.unwrap_or_default();
                Self::CommandRejected {
                    player_id,
                    frame,
                    kind,
                    payload,
                }
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_roundtrips() {
        let msg = Envelope::Command {
            player_id: PlayerHandle::new(1),
            frame: Frame::new(100),
            kind: 7,
            payload: vec![0x01, 0x02],
        };
        let bytes = msg.encode();
        assert_eq!(bytes[0], Tag::Command as u8);
        assert_eq!(Envelope::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn hash_check_roundtrips() {
        let msg = Envelope::HashCheck {
            trailing_frame: Frame::new(500),
            hash: 0xdead_beef,
        };
        let bytes = msg.encode();
        assert_eq!(Envelope::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn join_handshake_roundtrips() {
        let req = Envelope::JoinRequest {
            name: "nova".to_string(),
            user_payload: vec![9, 9],
        };
        assert_eq!(Envelope::decode(&req.encode()).unwrap(), req);

        let accept = Envelope::JoinAccept {
            player_id: PlayerHandle::new(3),
            current_frame: Frame::new(1000),
            state: vec![1, 2, 3],
        };
        assert_eq!(Envelope::decode(&accept.encode()).unwrap(), accept);

        let reject = Envelope::JoinReject {
            reason: "session full".to_string(),
        };
        assert_eq!(Envelope::decode(&reject.encode()).unwrap(), reject);
    }

    #[test]
    fn command_rejected_roundtrips() {
        let msg = Envelope::CommandRejected {
            player_id: PlayerHandle::new(4),
            frame: Frame::new(-7),
            kind: 2,
            payload: vec![9],
        };
        let bytes = msg.encode();
        assert_eq!(bytes[0], Tag::CommandRejected as u8);
        assert_eq!(Envelope::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn empty_payload_requests_roundtrip() {
        let msg = Envelope::GameStateRequest;
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 1);
        assert_eq!(Envelope::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let err = Envelope::decode(&[200]).unwrap_err();
        assert!(matches!(err, TssError::MalformedCommand { .. }));
    }

    #[test]
    fn truncated_message_fails() {
        let msg = Envelope::HashCheck {
            trailing_frame: Frame::new(1),
            hash: 1,
        };
        let bytes = msg.encode();
        let err = Envelope::decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, TssError::Truncated { .. }));
    }
}
