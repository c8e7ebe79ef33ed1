//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::GameRegistry;
use crate::matchmaking::MatchmakingService;
use crate::room::RoomStore;
use crate::store::UserDirectory;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub games: Arc<GameRegistry>,
    pub rooms: Arc<RoomStore>,
    pub users: Arc<UserDirectory>,
    pub matchmaking: Arc<MatchmakingService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Every built-in game is registered before the first request
        let games = Arc::new(GameRegistry::with_builtin_games());

        let rooms = Arc::new(RoomStore::new(games.clone()));
        let users = Arc::new(UserDirectory::new());

        // Arc for sharing across cloned AppState and the scanner task
        let matchmaking = Arc::new(MatchmakingService::new(
            rooms.clone(),
            users.clone(),
            config.match_scan_interval,
        ));

        Self {
            config,
            games,
            rooms,
            users,
            matchmaking,
        }
    }
}
