//! Matchmaking - FIFO pairing of waiting players into rooms

pub mod queue;
pub mod service;

pub use service::MatchmakingService;

use crate::error::ErrorKind;
use crate::game::PlayerId;
use crate::room::RoomError;

/// Queue admission errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Player {0} is already in the matchmaking queue")]
    AlreadyQueued(PlayerId),

    #[error("Player {0} is already in a room")]
    AlreadyInRoom(PlayerId),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StateConflict
    }
}

/// Failures while turning a popped pair into a room
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    #[error("Failed to seat matched players: {0}")]
    Room(#[from] RoomError),
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchError::UnknownPlayer(_) => ErrorKind::Internal,
            MatchError::Room(e) => e.kind(),
        }
    }
}
