//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::game::PlayerId;
use crate::room::RoomId;
use crate::ws::connection::ConnectionHandle;

use super::QueueError;

/// Player waiting in the matchmaking queue
#[derive(Debug)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub connection: ConnectionHandle,
    /// Fired with the room ID once the player is seated
    pub notifier: oneshot::Sender<RoomId>,
    pub queued_at: Instant,
}

impl QueueEntry {
    pub fn new(connection: ConnectionHandle, notifier: oneshot::Sender<RoomId>) -> Self {
        Self {
            player_id: connection.player_id().to_string(),
            connection,
            notifier,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// FIFO waiting pool. A player appears at most once.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<QueueEntry>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player to the back of the queue
    pub fn join(&mut self, entry: QueueEntry) -> Result<(), QueueError> {
        if self.contains(&entry.player_id) {
            return Err(QueueError::AlreadyQueued(entry.player_id));
        }
        self.queue.push_back(entry);
        Ok(())
    }

    /// Remove a player from the queue
    pub fn leave(&mut self, player_id: &str) -> Option<QueueEntry> {
        let pos = self.queue.iter().position(|e| e.player_id == player_id)?;
        self.queue.remove(pos)
    }

    /// Check if a player is in the queue
    pub fn contains(&self, player_id: &str) -> bool {
        self.queue.iter().any(|e| e.player_id == player_id)
    }

    /// Waiting player IDs, longest-waiting first
    pub fn snapshot(&self) -> Vec<PlayerId> {
        self.queue.iter().map(|e| e.player_id.clone()).collect()
    }

    /// Drop entries whose connection is already gone, returning their IDs
    pub fn prune_closed(&mut self) -> Vec<PlayerId> {
        let mut stale = Vec::new();
        self.queue.retain(|e| {
            let closed = e.connection.is_closed();
            if closed {
                stale.push(e.player_id.clone());
            }
            !closed
        });
        stale
    }

    /// Pop the two longest-waiting entries, if there are two
    pub fn pop_pair(&mut self) -> Option<(QueueEntry, QueueEntry)> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some((first, second))
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
