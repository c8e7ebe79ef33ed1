//! Session dispatcher - routes one player's inbound envelopes to their room
//!
//! Errors never leave this module: each one becomes an `error` envelope sent
//! to the originating connection only, and the connection stays open.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::game::PlayerInfo;
use crate::room::{RoomId, RoomStore};

use super::connection::{deliver, ConnectionHandle, Delivery};
use super::protocol::{self, ClientMsg, ServerMsg};

/// What the reader loop should do after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The player left; stop reading
    Closed,
}

/// A seated player's view of their room
pub struct Session {
    rooms: Arc<RoomStore>,
    room_id: RoomId,
    player: PlayerInfo,
    connection: ConnectionHandle,
}

impl Session {
    pub fn new(
        rooms: Arc<RoomStore>,
        room_id: RoomId,
        player: PlayerInfo,
        connection: ConnectionHandle,
    ) -> Self {
        Self {
            rooms,
            room_id,
            player,
            connection,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Decode and dispatch one text frame
    pub fn handle_text(&self, text: &str) -> Flow {
        match protocol::decode(text) {
            Ok(msg) => self.handle(msg),
            Err(e) => {
                self.reject(e.into());
                Flow::Continue
            }
        }
    }

    /// Dispatch one decoded message and fan out the result
    pub fn handle(&self, msg: ClientMsg) -> Flow {
        let name = msg.name();
        let leaving = matches!(msg, ClientMsg::LeaveRoom);
        debug!(room_id = %self.room_id, player_id = %self.player.id, msg_type = name, "Dispatching");

        match self.dispatch(msg) {
            Ok(deliveries) => {
                deliver(deliveries);
                if leaving {
                    info!(room_id = %self.room_id, player_id = %self.player.id, "Player left room");
                    Flow::Closed
                } else {
                    Flow::Continue
                }
            }
            Err(e) => {
                self.reject(e);
                Flow::Continue
            }
        }
    }

    fn dispatch(&self, msg: ClientMsg) -> Result<Vec<Delivery>, ServiceError> {
        let rooms = &self.rooms;
        let room_id = self.room_id.as_str();
        let player_id = self.player.id.as_str();

        let deliveries = match msg {
            ClientMsg::JoinRoom => rooms.announce(room_id, player_id)?,
            ClientMsg::ChooseGame { game_type } => rooms.choose_game(room_id, player_id, game_type)?,
            ClientMsg::GameAccept { game_type } => rooms.accept_game(room_id, player_id, game_type)?,
            ClientMsg::GameReject { game_type } => rooms.reject_game(room_id, player_id, game_type)?,
            ClientMsg::GameMove { mv } => rooms.make_move(room_id, player_id, &mv)?,
            ClientMsg::ReplayGame => rooms.request_replay(room_id, player_id)?,
            ClientMsg::ReplayAccepted => rooms.accept_replay(room_id, player_id)?,
            ClientMsg::ReplayRejected => rooms.reject_replay(room_id, player_id)?,
            ClientMsg::LeaveRoom => rooms.leave(room_id, player_id)?,
            ClientMsg::Ping { t } => vec![Delivery::message(&self.connection, ServerMsg::Pong { t })],
        };
        Ok(deliveries)
    }

    /// Report an error to this connection only
    pub fn reject(&self, err: ServiceError) {
        warn!(
            room_id = %self.room_id,
            player_id = %self.player.id,
            error = %err,
            "Rejected client message"
        );
        if let Err(e) = self.connection.send(ServerMsg::error(err.kind(), err.to_string())) {
            debug!(error = %e, "Dropped error envelope");
        }
    }

    /// Transport went away: leave the room if still seated in it
    pub fn disconnect(&self) {
        if self.rooms.room_of(&self.player.id).as_deref() != Some(self.room_id.as_str()) {
            return;
        }
        match self.rooms.leave(&self.room_id, &self.player.id) {
            Ok(deliveries) => {
                info!(room_id = %self.room_id, player_id = %self.player.id, "Player disconnected");
                deliver(deliveries);
            }
            Err(e) => debug!(room_id = %self.room_id, error = %e, "Room already gone on disconnect"),
        }
    }
}
