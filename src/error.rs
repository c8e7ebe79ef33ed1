//! Error classification shared by the room, game and matchmaking layers
//!
//! Every domain error enum reports an [`ErrorKind`]. The session dispatcher
//! turns errors into `error` envelopes and the HTTP layer into status codes;
//! nothing else inspects them.

use crate::game::GameError;
use crate::matchmaking::{MatchError, QueueError};
use crate::room::RoomError;
use crate::store::UserError;
use crate::ws::protocol::ProtocolError;

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed payload, missing field, out-of-range move
    Validation,
    /// Out-of-turn move, choice mismatch, double join, full room
    StateConflict,
    /// Unknown room, player or game type
    NotFound,
    /// Read/write failure on a connection
    Transport,
    /// Operational failure inside the server
    Internal,
}

impl ErrorKind {
    /// Wire code used in `error` envelopes
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Umbrella error for operations reachable from a client
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    User(#[from] UserError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Game(e) => e.kind(),
            ServiceError::Room(e) => e.kind(),
            ServiceError::Queue(e) => e.kind(),
            ServiceError::Match(e) => e.kind(),
            ServiceError::Protocol(e) => e.kind(),
            ServiceError::User(e) => e.kind(),
        }
    }
}
