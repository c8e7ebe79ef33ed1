//! WebSocket upgrade handlers
//!
//! Each socket gets a writer task draining its [`ConnectionHandle`] and a
//! reader loop. A matchmaking socket idles in the queue until its notifier
//! fires, then the same socket is driven by a room [`Session`].

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::error::{ErrorKind, ServiceError};
use crate::http::middleware::authenticate;
use crate::matchmaking::MatchmakingService;
use crate::room::{Player, RoomId, RoomStore};
use crate::store::User;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::connection::{deliver, ConnectionHandle, Outbound};
use crate::ws::protocol::{self, ClientMsg, ServerMsg};
use crate::ws::session::{Flow, Session};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// `GET /rooms/:room_id/ws` - seat the player and run the session
pub async fn room_ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<RoomId>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match authenticate(&state, &query.token) {
        Ok(auth) => {
            info!(user_id = %auth.user.id, room_id = %room_id, "Room WebSocket upgrade");
            ws.on_upgrade(move |socket| handle_room_socket(socket, room_id, auth.user, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

/// `GET /matchmaking/ws` - queue the player and hand off once matched
pub async fn matchmaking_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    match authenticate(&state, &query.token) {
        Ok(auth) => {
            info!(user_id = %auth.user.id, "Matchmaking WebSocket upgrade");
            ws.on_upgrade(move |socket| handle_queue_socket(socket, auth.user, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

async fn handle_room_socket(socket: WebSocket, room_id: RoomId, user: User, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (connection, rx) = ConnectionHandle::new(user.id.clone());
    let writer = spawn_writer(user.id.clone(), ws_sink, rx);

    if let Err(e) = seat(&state, &room_id, &user, &connection) {
        warn!(user_id = %user.id, room_id = %room_id, error = %e, "Failed to seat player");
        refuse(&connection, e);
    } else {
        let session = Session::new(state.rooms.clone(), room_id, user.info(), connection.clone());
        run_session(&session, &connection, &mut ws_stream, &state).await;
        session.disconnect();
    }

    finish(&user.id, &connection, writer).await;
}

/// Seat the player; refused while they wait in the matchmaking queue
fn seat(
    state: &AppState,
    room_id: &str,
    user: &User,
    connection: &ConnectionHandle,
) -> Result<(), ServiceError> {
    state
        .rooms
        .join_room(room_id, Player::new(user.info(), connection.clone()))?;
    Ok(())
}

async fn handle_queue_socket(socket: WebSocket, user: User, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (connection, rx) = ConnectionHandle::new(user.id.clone());
    let writer = spawn_writer(user.id.clone(), ws_sink, rx);

    let ready = match state.matchmaking.join(connection.clone()) {
        Ok(ready) => ready,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Matchmaking join refused");
            refuse(&connection, e.into());
            finish(&user.id, &connection, writer).await;
            return;
        }
    };

    let matched = wait_for_match(
        ready,
        idle_in_queue(&mut ws_stream, &connection),
        &user.id,
        &state.matchmaking,
        &state.rooms,
    )
    .await;

    if let Some(room_id) = matched {
        info!(user_id = %user.id, room_id = %room_id, "Handing connection to room");
        let session = Session::new(state.rooms.clone(), room_id, user.info(), connection.clone());
        run_session(&session, &connection, &mut ws_stream, &state).await;
        session.disconnect();
    }

    finish(&user.id, &connection, writer).await;
}

/// Wait in the queue until matched or until `socket_gone` completes.
///
/// Returns the room to hand the connection to. A player popped from the queue
/// is never re-queued: if the socket went away after the match was made, the
/// player leaves that room and the opponent is notified.
async fn wait_for_match(
    mut ready: oneshot::Receiver<RoomId>,
    socket_gone: impl Future<Output = ()>,
    player_id: &str,
    matchmaking: &MatchmakingService,
    rooms: &RoomStore,
) -> Option<RoomId> {
    tokio::select! {
        biased;

        _ = socket_gone => {
            ready.close();
            match ready.try_recv() {
                Ok(room_id) => {
                    info!(player_id = %player_id, room_id = %room_id, "Matched while disconnecting");
                    match rooms.leave(&room_id, player_id) {
                        Ok(deliveries) => deliver(deliveries),
                        Err(e) => debug!(room_id = %room_id, error = %e, "Room already gone"),
                    }
                }
                Err(_) => {
                    matchmaking.leave(player_id);
                }
            }
            None
        }
        // Err means match creation failed; the service already closed us
        room = &mut ready => room.ok(),
    }
}

/// Answer pings while queued; everything else is out of place
async fn idle_in_queue(ws_stream: &mut WsStream, connection: &ConnectionHandle) {
    while let Some(text) = next_text(ws_stream, connection.player_id()).await {
        let reply = match protocol::decode(&text) {
            Ok(ClientMsg::Ping { t }) => ServerMsg::Pong { t },
            Ok(msg) => ServerMsg::error(
                ErrorKind::StateConflict,
                format!("Cannot {} while waiting for a match", msg.name()),
            ),
            Err(e) => ServerMsg::error(e.kind(), e.to_string()),
        };
        if connection.send(reply).is_err() {
            break;
        }
    }
}

/// Reader loop: WebSocket -> session dispatcher
async fn run_session(
    session: &Session,
    connection: &ConnectionHandle,
    ws_stream: &mut WsStream,
    state: &AppState,
) {
    let rate_limiter = PlayerRateLimiter::new(state.config.input_rate_limit);

    while let Some(text) = next_text(ws_stream, connection.player_id()).await {
        if !rate_limiter.check_input() {
            warn!(user_id = %connection.player_id(), "Rate limited input message");
            if let Err(e) = connection.send(ServerMsg::error(
                ErrorKind::Validation,
                "Too many messages, slow down",
            )) {
                debug!(error = %e, "Dropped rate limit notice");
            }
            continue;
        }

        if session.handle_text(&text) == Flow::Closed {
            break;
        }
    }
    debug!(user_id = %connection.player_id(), room_id = %session.room_id(), "Session reader finished");
}

/// Next text frame, or `None` once the client is gone
async fn next_text(ws_stream: &mut WsStream, user_id: &str) -> Option<String> {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(user_id = %user_id, "Received ping/pong");
            }
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                return None;
            }
            Err(e) => {
                // Read failures end the session like a disconnect
                debug!(
                    user_id = %user_id,
                    kind = ErrorKind::Transport.code(),
                    error = %e,
                    "WebSocket read failed"
                );
                return None;
            }
        }
    }
    None
}

/// Spawn writer task: connection handle -> WebSocket
fn spawn_writer(
    user_id: String,
    mut ws_sink: WsSink,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Message(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(
                            user_id = %user_id,
                            kind = ErrorKind::Transport.code(),
                            error = %e,
                            "WebSocket send failed"
                        );
                        break;
                    }
                }
                Outbound::Close => {
                    if let Err(e) = ws_sink.send(Message::Close(None)).await {
                        debug!(user_id = %user_id, error = %e, "Close frame not sent");
                    }
                    break;
                }
            }
        }
        debug!(user_id = %user_id, "Writer finished");
    })
}

/// Send an error envelope and close
fn refuse(connection: &ConnectionHandle, err: ServiceError) {
    if let Err(e) = connection.send(ServerMsg::error(err.kind(), err.to_string())) {
        debug!(error = %e, "Dropped refusal");
    }
    connection.close();
}

/// Close our side and wait for the writer to flush
async fn finish(user_id: &str, connection: &ConnectionHandle, writer: JoinHandle<()>) {
    connection.close();
    if let Err(e) = writer.await {
        debug!(user_id = %user_id, error = %e, "Writer task ended abnormally");
    }
    info!(user_id = %user_id, "WebSocket connection closed");
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
