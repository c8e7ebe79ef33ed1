//! The contract every game type implements

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

use super::PlayerInfo;

/// Stable game-type identifier ("tictactoe", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameType(String);

impl GameType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Lifecycle of a single game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    NotStarted,
    InProgress,
    Over,
}

/// Errors raised by game engines and the registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Need exactly 2 players to start, found {found}")]
    InsufficientPlayers { found: usize },

    #[error("Game not started")]
    NotStarted,

    #[error("Game is already over")]
    AlreadyOver,

    #[error("Not your turn")]
    OutOfTurn,

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("Unknown game type: {0}")]
    UnknownGameType(GameType),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::InvalidMove(_) => ErrorKind::Validation,
            GameError::UnknownGameType(_) => ErrorKind::NotFound,
            GameError::InsufficientPlayers { .. }
            | GameError::NotStarted
            | GameError::AlreadyOver
            | GameError::OutOfTurn => ErrorKind::StateConflict,
        }
    }
}

/// Polymorphic game state machine.
///
/// Rooms only ever hold a `Box<dyn GameEngine>`; concrete games are reached
/// through the [`GameRegistry`](super::GameRegistry).
pub trait GameEngine: Send + Sync + fmt::Debug {
    fn game_type(&self) -> GameType;

    /// Client-facing snapshot of the game-specific state
    fn state(&self) -> serde_json::Value;

    /// Activate the game. Requires exactly two registered players; the first
    /// registered player moves first.
    fn start(&mut self) -> Result<(), GameError>;

    /// Apply `mv` on behalf of `player_id`. The payload shape is game specific.
    fn make_move(&mut self, player_id: &str, mv: &serde_json::Value) -> Result<(), GameError>;

    /// Whether a win or draw has been recorded. Never re-evaluates the board.
    fn is_game_over(&self) -> bool;

    /// Winner of a finished game; `None` for a draw or an unfinished game
    fn winner(&self) -> Option<&PlayerInfo>;

    fn status(&self) -> GameStatus;

    /// Restore the pre-start state, keeping the registered players
    fn reset_state(&mut self);

    /// Wire view used inside room snapshots
    fn view(&self) -> GameView {
        GameView {
            game_type: self.game_type(),
            status: self.status(),
            state: self.state(),
            winner: self.winner().cloned(),
        }
    }
}

/// Serializable view of an attached game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameView {
    #[serde(rename = "type")]
    pub game_type: GameType,
    pub status: GameStatus,
    pub state: serde_json::Value,
    pub winner: Option<PlayerInfo>,
}
