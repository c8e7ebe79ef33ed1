//! Room aggregate and its state machine
//!
//! Every method here runs with the room's lock held by the
//! [`RoomStore`](super::RoomStore). Methods never send anything themselves;
//! they return the deliveries to fan out once the lock is released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::game::{GameEngine, GameError, GameRegistry, GameType, GameView, PlayerId, PlayerInfo};
use crate::ws::connection::{ConnectionHandle, Delivery};
use crate::ws::protocol::ServerMsg;

use super::{RoomError, RoomId};

/// Players per room
pub const ROOM_CAPACITY: usize = 2;

/// Room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    WaitingForPlayer,
    GameSelection,
    GameSelected,
    GameStarted,
    GameOver,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoomStatus::WaitingForPlayer => "waiting_for_player",
            RoomStatus::GameSelection => "game_selection",
            RoomStatus::GameSelected => "game_selected",
            RoomStatus::GameStarted => "game_started",
            RoomStatus::GameOver => "game_over",
        })
    }
}

/// A seated player and the handle to their connection
#[derive(Debug, Clone)]
pub struct Player {
    pub info: PlayerInfo,
    pub connection: ConnectionHandle,
}

impl Player {
    pub fn new(info: PlayerInfo, connection: ConnectionHandle) -> Self {
        Self { info, connection }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }
}

/// Wire form of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub status: RoomStatus,
    pub players: Vec<PlayerInfo>,
    pub selections: BTreeMap<PlayerId, GameType>,
    pub game: Option<GameView>,
    pub replay_requested_by: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    /// Join order; the first player moves first
    players: Vec<Player>,
    game: Option<Box<dyn GameEngine>>,
    selections: BTreeMap<PlayerId, GameType>,
    replay_requested_by: Option<PlayerId>,
    status: RoomStatus,
    created_at: DateTime<Utc>,
    /// Set when the room is torn down; late lock holders treat it as gone
    closed: bool,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            players: Vec::with_capacity(ROOM_CAPACITY),
            game: None,
            selections: BTreeMap::new(),
            replay_requested_by: None,
            status: RoomStatus::WaitingForPlayer,
            created_at: Utc::now(),
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    #[cfg(test)]
    pub fn game(&self) -> Option<&dyn GameEngine> {
        self.game.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mark the room torn down without anyone in it to notify
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Nobody joined within `ttl` of creation
    pub fn is_abandoned(&self, ttl: Duration) -> bool {
        let age = (Utc::now() - self.created_at).to_std().unwrap_or_default();
        self.players.is_empty() && age >= ttl
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id() == player_id)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            status: self.status,
            players: self.players.iter().map(|p| p.info.clone()).collect(),
            selections: self.selections.clone(),
            game: self.game.as_ref().map(|g| g.view()),
            replay_requested_by: self.replay_requested_by.clone(),
            created_at: self.created_at,
        }
    }

    /// Seat a player. The second player moves the room into game selection.
    pub fn add_player(&mut self, player: Player) -> Result<(), RoomError> {
        if self.contains(player.id()) {
            return Err(RoomError::AlreadyInRoom {
                player_id: player.info.id,
            });
        }
        if self.players.len() >= ROOM_CAPACITY {
            return Err(RoomError::RoomFull(self.id.clone()));
        }

        info!(room_id = %self.id, player_id = %player.info.id, "Player seated");
        self.players.push(player);

        if self.players.len() == ROOM_CAPACITY && self.status == RoomStatus::WaitingForPlayer {
            self.status = RoomStatus::GameSelection;
        }
        Ok(())
    }

    fn member(&self, player_id: &str) -> Result<&Player, RoomError> {
        self.players
            .iter()
            .find(|p| p.id() == player_id)
            .ok_or_else(|| RoomError::NotAMember {
                player_id: player_id.to_string(),
            })
    }

    fn opponent(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id() != player_id)
    }

    fn require_status(&self, action: &'static str, allowed: RoomStatus) -> Result<(), RoomError> {
        if self.status != allowed {
            return Err(RoomError::InvalidState {
                action,
                status: self.status,
            });
        }
        Ok(())
    }

    fn broadcast(&self, msg: ServerMsg) -> Vec<Delivery> {
        self.players
            .iter()
            .map(|p| Delivery::message(&p.connection, msg.clone()))
            .collect()
    }

    fn to_opponent(&self, player_id: &str, msg: ServerMsg) -> Vec<Delivery> {
        self.opponent(player_id)
            .map(|p| Delivery::message(&p.connection, msg))
            .into_iter()
            .collect()
    }

    /// `join_room`: the player announces presence
    pub fn announce(&self, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        let me = self.member(player_id)?;
        let room = self.snapshot();

        let mut deliveries = vec![Delivery::message(
            &me.connection,
            ServerMsg::JoinedRoom { room: room.clone() },
        )];
        deliveries.extend(self.to_opponent(
            player_id,
            ServerMsg::PlayerJoined {
                player: me.info.clone(),
                room,
            },
        ));
        Ok(deliveries)
    }

    /// Record a proposal. Does not advance the room by itself.
    pub fn choose_game(
        &mut self,
        games: &GameRegistry,
        player_id: &str,
        game_type: GameType,
    ) -> Result<Vec<Delivery>, RoomError> {
        let me = self.member(player_id)?.connection.clone();
        self.require_status("choose a game", RoomStatus::GameSelection)?;
        if !games.contains(&game_type) {
            return Err(GameError::UnknownGameType(game_type).into());
        }

        self.selections
            .insert(player_id.to_string(), game_type.clone());
        info!(room_id = %self.id, player_id = %player_id, game_type = %game_type, "Game proposed");

        let mut deliveries = vec![Delivery::message(
            &me,
            ServerMsg::GameChosenConfirmation {
                game_type: game_type.clone(),
            },
        )];
        deliveries.extend(self.to_opponent(
            player_id,
            ServerMsg::GameChosen {
                player_id: player_id.to_string(),
                game_type,
            },
        ));
        Ok(deliveries)
    }

    /// The opponent's recorded choice for `game_type`, or `ChoiceMismatch`
    fn opponent_chose(&self, player_id: &str, game_type: &GameType) -> Result<(), RoomError> {
        let chosen = self
            .opponent(player_id)
            .and_then(|p| self.selections.get(p.id()));

        if chosen != Some(game_type) {
            return Err(RoomError::ChoiceMismatch {
                game_type: game_type.clone(),
            });
        }
        Ok(())
    }

    /// Accept the opponent's proposal: attach a fresh engine and start it
    pub fn accept_game(
        &mut self,
        games: &GameRegistry,
        player_id: &str,
        game_type: GameType,
    ) -> Result<Vec<Delivery>, RoomError> {
        self.member(player_id)?;
        self.require_status("accept a game", RoomStatus::GameSelection)?;
        self.opponent_chose(player_id, &game_type)?;

        let infos = self.players.iter().map(|p| p.info.clone()).collect();
        self.game = Some(games.create(&game_type, infos)?);
        self.status = RoomStatus::GameSelected;
        self.replay_requested_by = None;

        self.start_attached()?;
        info!(room_id = %self.id, game_type = %game_type, "Game started");

        Ok(self.broadcast(ServerMsg::GameAccepted {
            room: self.snapshot(),
        }))
    }

    /// Start an attached, unstarted engine
    pub fn start_game(&mut self) -> Result<Vec<Delivery>, RoomError> {
        self.require_status("start the game", RoomStatus::GameSelected)?;
        self.start_attached()?;
        info!(room_id = %self.id, "Game started");

        Ok(self.broadcast(ServerMsg::GameAccepted {
            room: self.snapshot(),
        }))
    }

    fn start_attached(&mut self) -> Result<(), RoomError> {
        let game = self.game.as_mut().ok_or(GameError::NotStarted)?;
        game.start()?;
        self.status = RoomStatus::GameStarted;
        Ok(())
    }

    /// Reject the opponent's proposal. Clears every recorded choice so a
    /// stale proposal can never be accepted afterwards.
    pub fn reject_game(
        &mut self,
        player_id: &str,
        game_type: GameType,
    ) -> Result<Vec<Delivery>, RoomError> {
        self.member(player_id)?;
        self.require_status("reject a game", RoomStatus::GameSelection)?;
        self.opponent_chose(player_id, &game_type)?;

        self.selections.clear();
        info!(room_id = %self.id, player_id = %player_id, game_type = %game_type, "Game rejected");

        Ok(self.to_opponent(
            player_id,
            ServerMsg::GameRejected {
                player_id: player_id.to_string(),
                game_type,
            },
        ))
    }

    /// Route a move to the engine and broadcast the resulting snapshot
    pub fn make_move(
        &mut self,
        player_id: &str,
        mv: &serde_json::Value,
    ) -> Result<Vec<Delivery>, RoomError> {
        self.member(player_id)?;
        self.require_status("make a move", RoomStatus::GameStarted)?;

        let game = self.game.as_mut().ok_or(GameError::NotStarted)?;
        game.make_move(player_id, mv)?;

        if game.is_game_over() {
            self.status = RoomStatus::GameOver;
            let winner = game.winner().map(|p| p.id.clone());
            info!(room_id = %self.id, winner = ?winner, "Game over");
        }

        Ok(self.broadcast(ServerMsg::MoveMade {
            room: self.snapshot(),
        }))
    }

    /// Ask the opponent for a rematch. No state change beyond the request.
    pub fn request_replay(&mut self, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        self.member(player_id)?;
        self.require_status("request a replay", RoomStatus::GameOver)?;

        self.replay_requested_by = Some(player_id.to_string());

        Ok(self.to_opponent(
            player_id,
            ServerMsg::ReplayGameReceived {
                player_id: player_id.to_string(),
            },
        ))
    }

    /// Requester of the pending replay, if it is `player_id`'s opponent
    fn take_replay_request(&mut self, player_id: &str) -> Result<PlayerId, RoomError> {
        self.member(player_id)?;
        self.require_status("answer a replay", RoomStatus::GameOver)?;

        match self.replay_requested_by.take() {
            Some(requester) if requester != player_id => Ok(requester),
            other => {
                self.replay_requested_by = other;
                Err(RoomError::NoReplayRequested)
            }
        }
    }

    /// Reset the engine and restart it with the same players
    pub fn accept_replay(&mut self, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        let requester = self.take_replay_request(player_id)?;

        let game = match self.game.as_mut() {
            Some(game) => game,
            None => {
                self.replay_requested_by = Some(requester);
                return Err(GameError::NotStarted.into());
            }
        };
        game.reset_state();
        self.status = RoomStatus::GameSelected;
        self.start_attached()?;
        info!(room_id = %self.id, requested_by = %requester, "Replay started");

        Ok(self.broadcast(ServerMsg::ReplayAccepted {
            room: self.snapshot(),
        }))
    }

    pub fn reject_replay(&mut self, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        let requester = self.take_replay_request(player_id)?;

        Ok(self
            .players
            .iter()
            .filter(|p| p.id() == requester)
            .map(|p| {
                Delivery::message(
                    &p.connection,
                    ServerMsg::ReplayRejected {
                        player_id: player_id.to_string(),
                    },
                )
            })
            .collect())
    }

    /// Tear the room down on behalf of `player_id`. The opponent is told and
    /// both connections are closed, since they are bound to this room.
    pub fn depart(&mut self, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        self.member(player_id)?;
        self.closed = true;
        info!(room_id = %self.id, player_id = %player_id, "Player left room");

        let mut deliveries = Vec::new();
        for p in &self.players {
            if p.id() != player_id {
                deliveries.push(Delivery::message(
                    &p.connection,
                    ServerMsg::OpponentLeft {
                        player_id: player_id.to_string(),
                    },
                ));
            }
            deliveries.push(Delivery::close(&p.connection));
        }
        Ok(deliveries)
    }
}
