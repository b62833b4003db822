//! Error types for TSS Rollback.
//!
//! # Design
//!
//! - **Zero-allocation on hot paths**: variants carry numeric/enum fields
//!   instead of formatted strings.
//! - **Programmatically inspectable**: callers can match on specific cases
//!   instead of parsing a message.
//! - **One shared enum** for the codec, command log, and TSS container, per
//!   the "no exceptions for control flow" design note: every fallible
//!   operation returns `Result<_, TssError>`.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::Frame;

/// The single error type shared by the packet codec, command log, and TSS
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TssError {
    /// A packet read past the end of its buffer.
    Truncated {
        /// Bytes requested.
        requested: usize,
        /// Bytes actually remaining.
        remaining: usize,
    },
    /// A command payload failed caller-side validation.
    MalformedCommand {
        /// Caller-supplied reason, a static description (no allocation).
        reason: &'static str,
    },
    /// The command's frame is older than the trailing frame retained by the
    /// TSS container.
    TooOld {
        /// The frame the command was stamped with.
        command_frame: Frame,
        /// The oldest frame still retained.
        trailing_frame: Frame,
    },
    /// A rollback target is older than any retained snapshot.
    NeedsFullResync {
        /// The frame that needed to be replayed to.
        target_frame: Frame,
        /// The oldest frame still retained.
        trailing_frame: Frame,
    },
    /// A `HASH_CHECK` comparison did not match the local trailing hash.
    HashMismatch {
        /// The frame the mismatch was detected at.
        frame: Frame,
        /// The hash reported by the authoritative server.
        remote_hash: u32,
        /// The hash computed locally.
        local_hash: u32,
    },
    /// No datagram from a peer within the configured deadline.
    PeerTimeout {
        /// Milliseconds since the last datagram was received.
        elapsed_ms: u64,
    },
    /// A join attempt was rejected because the session has no free slots.
    SessionFull {
        /// The configured player limit.
        limit: usize,
    },
}

impl Display for TssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated {
                requested,
                remaining,
            } => write!(
                f,
                "packet read past end: requested {requested} bytes, {remaining} remaining"
            ),
            Self::MalformedCommand { reason } => write!(f, "malformed command: {reason}"),
            Self::TooOld {
                command_frame,
                trailing_frame,
            } => write!(
                f,
                "command frame {command_frame} is older than trailing frame {trailing_frame}"
            ),
            Self::NeedsFullResync {
                target_frame,
                trailing_frame,
            } => write!(
                f,
                "rollback target {target_frame} is older than retained trailing frame {trailing_frame}; full resync required"
            ),
            Self::HashMismatch {
                frame,
                remote_hash,
                local_hash,
            } => write!(
                f,
                "hash mismatch at frame {frame}: local {local_hash:#010x} != remote {remote_hash:#010x}"
            ),
            Self::PeerTimeout { elapsed_ms } => {
                write!(f, "peer timed out after {elapsed_ms}ms without a datagram")
            },
            Self::SessionFull { limit } => {
                write!(f, "session is full (limit: {limit} players)")
            },
        }
    }
}

impl Error for TssError {}
