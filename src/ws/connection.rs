//! Connection handles - the send/close side of a client connection
//!
//! The websocket writer task owns the receiving end of the channel and is the
//! only code that touches the socket sink. Everything else (rooms, the
//! matchmaking queue, the dispatcher) holds a cheap cloneable handle, so a
//! send never blocks and is safe to queue while deciding under a lock.

use tokio::sync::mpsc;
use tracing::debug;

use crate::game::PlayerId;

use super::protocol::ServerMsg;

/// Items drained by a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMsg),
    Close,
}

#[derive(Debug, thiserror::Error)]
#[error("Connection closed for player {0}")]
pub struct ConnectionClosed(pub PlayerId);

/// Handle to one client's duplex channel
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    player_id: PlayerId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiver its writer task drains
    pub fn new(player_id: impl Into<PlayerId>) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                player_id: player_id.into(),
                tx,
            },
            rx,
        )
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn send(&self, msg: ServerMsg) -> Result<(), ConnectionClosed> {
        self.tx
            .send(Outbound::Message(msg))
            .map_err(|_| ConnectionClosed(self.player_id.clone()))
    }

    /// Ask the writer task to close the socket. Idempotent.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An outbound item addressed to one connection
#[derive(Debug, Clone)]
pub struct Delivery {
    pub to: ConnectionHandle,
    pub item: Outbound,
}

impl Delivery {
    pub fn message(to: &ConnectionHandle, msg: ServerMsg) -> Self {
        Self {
            to: to.clone(),
            item: Outbound::Message(msg),
        }
    }

    pub fn close(to: &ConnectionHandle) -> Self {
        Self {
            to: to.clone(),
            item: Outbound::Close,
        }
    }
}

/// Best-effort fan-out, in order. Failed sends mean the peer is already gone
/// and are only logged.
pub fn deliver(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        match delivery.item {
            Outbound::Message(msg) => {
                if let Err(e) = delivery.to.send(msg) {
                    debug!(error = %e, "Dropped outbound message");
                }
            }
            Outbound::Close => delivery.to.close(),
        }
    }
}
