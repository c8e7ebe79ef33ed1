//! Rooms - two-player sessions and their store

pub mod model;
pub mod store;

pub use model::{Player, Room, RoomSnapshot, RoomStatus};
pub use store::{Presence, RoomStore};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::ErrorKind;
use crate::game::{GameError, GameType, PlayerId};

/// Opaque room identifier
pub type RoomId = String;

const ROOM_ID_LEN: usize = 12;

/// Random 12-character alphanumeric room ID
pub fn generate_room_id() -> RoomId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_ID_LEN)
        .map(char::from)
        .collect()
}

/// Room state machine errors
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found: {0}")]
    NotFound(RoomId),

    #[error("Room is full: {0}")]
    RoomFull(RoomId),

    #[error("Player {player_id} is already in a room")]
    AlreadyInRoom { player_id: PlayerId },

    #[error("Player {player_id} is waiting in the matchmaking queue")]
    AlreadyQueued { player_id: PlayerId },

    #[error("Player {player_id} is not in this room")]
    NotAMember { player_id: PlayerId },

    #[error("Cannot {action} while room is {status}")]
    InvalidState {
        action: &'static str,
        status: RoomStatus,
    },

    #[error("Opponent has not chosen {game_type}")]
    ChoiceMismatch { game_type: GameType },

    #[error("No replay request from the opponent")]
    NoReplayRequested,

    #[error(transparent)]
    Game(#[from] GameError),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::NotFound(_) | RoomError::NotAMember { .. } => ErrorKind::NotFound,
            RoomError::RoomFull(_)
            | RoomError::AlreadyInRoom { .. }
            | RoomError::AlreadyQueued { .. }
            | RoomError::InvalidState { .. }
            | RoomError::ChoiceMismatch { .. }
            | RoomError::NoReplayRequested => ErrorKind::StateConflict,
            RoomError::Game(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_shape() {
        let id = generate_room_id();
        assert_eq!(id.len(), ROOM_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_room_id());
    }

    #[test]
    fn test_game_errors_keep_their_kind() {
        let err = RoomError::from(GameError::InvalidMove("off the board".to_string()));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Invalid move: off the board");
    }
}
