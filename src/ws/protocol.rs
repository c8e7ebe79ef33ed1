//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::game::{GameType, PlayerId, PlayerInfo};
use crate::room::{RoomId, RoomSnapshot};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Announce presence in the room
    JoinRoom,

    /// Propose a game type
    ChooseGame { game_type: GameType },

    /// Accept the opponent's proposal
    GameAccept { game_type: GameType },

    /// Reject the opponent's proposal
    GameReject { game_type: GameType },

    /// Game-specific move payload, e.g. `{"row": 0, "col": 1}`
    GameMove {
        #[serde(rename = "move")]
        mv: Value,
    },

    /// Ask the opponent for a rematch
    ReplayGame,

    ReplayAccepted,

    ReplayRejected,

    /// Leave the room
    LeaveRoom,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// Every inbound `type` tag the dispatcher understands
    pub const TYPES: [&'static str; 10] = [
        "join_room",
        "choose_game",
        "game_accept",
        "game_reject",
        "game_move",
        "replay_game",
        "replay_accepted",
        "replay_rejected",
        "leave_room",
        "ping",
    ];

    /// Tag name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ClientMsg::JoinRoom => "join_room",
            ClientMsg::ChooseGame { .. } => "choose_game",
            ClientMsg::GameAccept { .. } => "game_accept",
            ClientMsg::GameReject { .. } => "game_reject",
            ClientMsg::GameMove { .. } => "game_move",
            ClientMsg::ReplayGame => "replay_game",
            ClientMsg::ReplayAccepted => "replay_accepted",
            ClientMsg::ReplayRejected => "replay_rejected",
            ClientMsg::LeaveRoom => "leave_room",
            ClientMsg::Ping { .. } => "ping",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Waiting in the matchmaking queue
    QueueJoined { message: String },

    /// Paired with an opponent; the connection now belongs to the room
    MatchFound {
        room_id: RoomId,
        opponent: PlayerInfo,
    },

    /// Confirmation of join_room
    JoinedRoom { room: RoomSnapshot },

    /// The opponent announced presence
    PlayerJoined {
        player: PlayerInfo,
        room: RoomSnapshot,
    },

    /// Own proposal was recorded
    GameChosenConfirmation { game_type: GameType },

    /// The opponent proposed a game
    GameChosen {
        player_id: PlayerId,
        game_type: GameType,
    },

    /// Both players agreed; the game has started
    GameAccepted { room: RoomSnapshot },

    GameRejected {
        player_id: PlayerId,
        game_type: GameType,
    },

    /// Full room snapshot after an accepted move
    MoveMade { room: RoomSnapshot },

    /// The opponent asked for a rematch
    ReplayGameReceived { player_id: PlayerId },

    /// Rematch started
    ReplayAccepted { room: RoomSnapshot },

    ReplayRejected { player_id: PlayerId },

    OpponentLeft { player_id: PlayerId },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: kind.code().to_string(),
            message: message.into(),
        }
    }
}

/// Inbound decoding failures
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    Malformed(String),

    #[error("Missing or invalid message type")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {msg_type} payload: {reason}")]
    InvalidPayload { msg_type: String, reason: String },
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Decode one inbound text frame
pub fn decode(text: &str) -> Result<ClientMsg, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let msg_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !ClientMsg::TYPES.contains(&msg_type.as_str()) {
        return Err(ProtocolError::UnknownType(msg_type));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        msg_type,
        reason: e.to_string(),
    })
}
