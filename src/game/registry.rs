//! Game registry - maps game types to engine factories

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::tictactoe::TicTacToeFactory;
use super::{GameEngine, GameError, GameType, PlayerInfo};

/// Builds fresh engine instances for one game type
pub trait GameFactory: Send + Sync {
    /// Human readable name shown in the catalog
    fn display_name(&self) -> &str;

    fn create(&self, players: Vec<PlayerInfo>) -> Box<dyn GameEngine>;
}

/// Catalog entry returned by `GET /games`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: GameType,
    pub display_name: String,
}

/// Registry of all playable games.
///
/// Populated at startup and read-only afterwards, but registration stays
/// safe against concurrent readers.
pub struct GameRegistry {
    factories: RwLock<HashMap<GameType, Arc<dyn GameFactory>>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with every built-in game registered
    pub fn with_builtin_games() -> Self {
        let registry = Self::new();
        registry.register(TicTacToeFactory::game_type(), Arc::new(TicTacToeFactory));
        registry
    }

    pub fn register(&self, game_type: GameType, factory: Arc<dyn GameFactory>) {
        info!(game_type = %game_type, "Registered game");
        self.factories.write().insert(game_type, factory);
    }

    pub fn contains(&self, game_type: &GameType) -> bool {
        self.factories.read().contains_key(game_type)
    }

    /// Construct a fresh engine of `game_type` for `players`
    pub fn create(
        &self,
        game_type: &GameType,
        players: Vec<PlayerInfo>,
    ) -> Result<Box<dyn GameEngine>, GameError> {
        let factory = self
            .factories
            .read()
            .get(game_type)
            .cloned()
            .ok_or_else(|| GameError::UnknownGameType(game_type.clone()))?;

        Ok(factory.create(players))
    }

    /// All registered games, sorted by name
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<CatalogEntry> = self
            .factories
            .read()
            .iter()
            .map(|(name, factory)| CatalogEntry {
                name: name.clone(),
                display_name: factory.display_name().to_string(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameStatus;

    fn players() -> Vec<PlayerInfo> {
        vec![PlayerInfo::new("a", "Alice"), PlayerInfo::new("b", "Bob")]
    }

    #[test]
    fn test_create_builtin_game() {
        let registry = GameRegistry::with_builtin_games();
        let mut game = registry.create(&GameType::from("tictactoe"), players()).unwrap();

        assert_eq!(game.game_type(), GameType::from("tictactoe"));
        assert_eq!(game.status(), GameStatus::NotStarted);
        // Both players were registered, so the game can start
        assert!(game.start().is_ok());
    }

    #[test]
    fn test_unknown_game_type() {
        let registry = GameRegistry::with_builtin_games();
        let err = registry.create(&GameType::from("chess"), players()).unwrap_err();

        assert_eq!(err, GameError::UnknownGameType(GameType::from("chess")));
    }

    #[test]
    fn test_catalog_lists_registered_games() {
        let registry = GameRegistry::with_builtin_games();
        let catalog = registry.catalog();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, GameType::from("tictactoe"));
        assert_eq!(catalog[0].display_name, "Tic Tac Toe");
    }

    #[test]
    fn test_empty_registry() {
        let registry = GameRegistry::default();
        assert!(!registry.contains(&GameType::from("tictactoe")));
        assert!(registry.catalog().is_empty());
    }
}
