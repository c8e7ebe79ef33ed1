//! Matchmaking service - manages queue and match creation

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::game::PlayerId;
use crate::room::{Player, Presence, RoomId, RoomSnapshot, RoomStore};
use crate::store::UserDirectory;
use crate::ws::connection::{deliver, ConnectionHandle};
use crate::ws::protocol::ServerMsg;

use super::queue::{MatchmakingQueue, QueueEntry};
use super::{MatchError, QueueError};

/// Matchmaking service
pub struct MatchmakingService {
    queue: Mutex<MatchmakingQueue>,
    rooms: Arc<RoomStore>,
    users: Arc<UserDirectory>,
    scan_interval: Duration,
    /// Woken on every join so pairing does not wait for the next tick
    wakeup: Notify,
}

impl MatchmakingService {
    pub fn new(rooms: Arc<RoomStore>, users: Arc<UserDirectory>, scan_interval: Duration) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            rooms,
            users,
            scan_interval,
            wakeup: Notify::new(),
        }
    }

    /// Join matchmaking queue. The returned receiver yields the room ID once
    /// the player has been seated; it is dropped if match creation fails.
    pub fn join(&self, connection: ConnectionHandle) -> Result<oneshot::Receiver<RoomId>, QueueError> {
        let player_id = connection.player_id().to_string();

        // Same presence index the rooms seat through
        self.rooms
            .mark_queued(&player_id)
            .map_err(|presence| match presence {
                Presence::Queued => QueueError::AlreadyQueued(player_id.clone()),
                Presence::Seated(_) => QueueError::AlreadyInRoom(player_id.clone()),
            })?;

        let (notifier, ready) = oneshot::channel();
        let joined = {
            let mut queue = self.queue.lock();
            queue
                .join(QueueEntry::new(connection.clone(), notifier))
                .map(|()| queue.len())
        };
        let queue_size = match joined {
            Ok(queue_size) => queue_size,
            Err(e) => {
                self.rooms.unmark_queued(&player_id);
                return Err(e);
            }
        };

        info!(player_id = %player_id, queue_size, "Player joined matchmaking queue");

        if let Err(e) = connection.send(ServerMsg::QueueJoined {
            message: "Waiting for an opponent".to_string(),
        }) {
            debug!(error = %e, "Dropped queue confirmation");
        }

        self.wakeup.notify_one();
        Ok(ready)
    }

    /// Leave matchmaking queue, closing the queued connection
    pub fn leave(&self, player_id: &str) -> bool {
        let entry = self.queue.lock().leave(player_id);
        match entry {
            Some(entry) => {
                self.rooms.unmark_queued(player_id);
                entry.connection.close();
                info!(player_id = %player_id, "Player left matchmaking queue");
                true
            }
            None => false,
        }
    }

    /// Get current queue size
    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    /// Waiting player IDs in FIFO order
    pub fn snapshot(&self) -> Vec<PlayerId> {
        self.queue.lock().snapshot()
    }

    /// Pair everyone that can be paired right now. Returns the number of
    /// pairs popped from the queue.
    pub fn scan(&self) -> usize {
        let mut pairs = 0;

        loop {
            // Pop under the lock, build the room without it
            let pair = {
                let mut queue = self.queue.lock();
                let stale = queue.prune_closed();
                if !stale.is_empty() {
                    warn!(players = ?stale, "Dropped disconnected players from queue");
                }
                for player_id in &stale {
                    self.rooms.unmark_queued(player_id);
                }
                queue.pop_pair()
            };

            let Some((first, second)) = pair else {
                break;
            };
            pairs += 1;
            self.create_match(first, second);
        }

        pairs
    }

    /// Create a room for a popped pair and hand both connections over to it
    fn create_match(&self, first: QueueEntry, second: QueueEntry) {
        let room = match self.seat_pair(&first, &second) {
            Ok(room) => room,
            Err(e) => {
                error!(
                    error = %e,
                    first = %first.player_id,
                    second = %second.player_id,
                    "Failed to create match"
                );
                // Popped players are never re-queued
                self.rooms.unmark_queued(&first.player_id);
                self.rooms.unmark_queued(&second.player_id);
                first.connection.close();
                second.connection.close();
                return;
            }
        };

        info!(
            room_id = %room.id,
            first = %first.player_id,
            second = %second.player_id,
            waited_ms = first.wait_time().as_millis() as u64,
            "Match found"
        );

        for entry in [&first, &second] {
            if let Some(opponent) = room.players.iter().find(|p| p.id != entry.player_id) {
                if let Err(e) = entry.connection.send(ServerMsg::MatchFound {
                    room_id: room.id.clone(),
                    opponent: opponent.clone(),
                }) {
                    debug!(error = %e, "Dropped match notification");
                }
            }
        }

        for entry in [first, second] {
            if entry.notifier.send(room.id.clone()).is_err() {
                // The queue connection went away before the handoff
                warn!(room_id = %room.id, player_id = %entry.player_id, "Matched player vanished");
                if let Ok(deliveries) = self.rooms.leave(&room.id, &entry.player_id) {
                    deliver(deliveries);
                }
            }
        }
    }

    fn seat_pair(&self, first: &QueueEntry, second: &QueueEntry) -> Result<RoomSnapshot, MatchError> {
        let players = [first, second]
            .into_iter()
            .map(|entry| -> Result<Player, MatchError> {
                let user = self
                    .users
                    .get(&entry.player_id)
                    .ok_or_else(|| MatchError::UnknownPlayer(entry.player_id.clone()))?;
                Ok(Player::new(user.info(), entry.connection.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.rooms.create_match(players)?)
    }

    /// Run the matchmaking service. Scans on every join and on a fixed
    /// interval.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.scan_interval.as_millis() as u64, "Matchmaking scanner started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.wakeup.notified() => {}
            }

            let pairs = self.scan();
            if pairs > 0 {
                debug!(pairs, waiting = ?self.snapshot(), "Matchmaking scan");
            }
        }
    }
}
