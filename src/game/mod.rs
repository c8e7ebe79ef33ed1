//! Game engines and the game registry

mod engine;
pub mod registry;
pub mod tictactoe;

pub use engine::{GameEngine, GameError, GameStatus, GameType, GameView};
pub use registry::{CatalogEntry, GameFactory, GameRegistry};

use serde::{Deserialize, Serialize};

/// Opaque player identifier issued by the identity layer
pub type PlayerId = String;

/// Player identity as seen by rooms, engines and clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
}

impl PlayerInfo {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
