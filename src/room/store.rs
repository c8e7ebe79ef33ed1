//! Room store - the registry of live rooms
//!
//! One `parking_lot::Mutex` per room serializes every mutation of that room.
//! The DashMap guards are only held long enough to clone the room's `Arc`, so
//! no map shard is ever locked while waiting on a room.
//!
//! The presence index is the single admission point for both the matchmaking
//! queue and rooms: a player holds at most one entry, claimed through the
//! DashMap entry API.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::game::{GameRegistry, GameType, PlayerId};
use crate::ws::connection::Delivery;

use super::{generate_room_id, Player, Room, RoomError, RoomId, RoomSnapshot};

type SharedRoom = Arc<Mutex<Room>>;

/// Where a player currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// Waiting in the matchmaking queue
    Queued,
    Seated(RoomId),
}

pub struct RoomStore {
    rooms: DashMap<RoomId, SharedRoom>,
    presence: DashMap<PlayerId, Presence>,
    games: Arc<GameRegistry>,
}

impl RoomStore {
    pub fn new(games: Arc<GameRegistry>) -> Self {
        Self {
            rooms: DashMap::new(),
            presence: DashMap::new(),
            games,
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Room the player is currently seated in
    pub fn room_of(&self, player_id: &str) -> Option<RoomId> {
        match self.presence.get(player_id)?.value() {
            Presence::Seated(room_id) => Some(room_id.clone()),
            Presence::Queued => None,
        }
    }

    /// Record that the player is entering the matchmaking queue. Fails with
    /// the current presence if the player is already queued or seated.
    pub fn mark_queued(&self, player_id: &str) -> Result<(), Presence> {
        match self.presence.entry(player_id.to_string()) {
            Entry::Occupied(slot) => Err(slot.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(Presence::Queued);
                Ok(())
            }
        }
    }

    /// Drop a queue presence; a seat is left untouched
    pub fn unmark_queued(&self, player_id: &str) {
        self.presence
            .remove_if(player_id, |_, presence| *presence == Presence::Queued);
    }

    fn shared(&self, room_id: &str) -> Result<SharedRoom, RoomError> {
        self.rooms
            .get(room_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))
    }

    /// Run `f` with exclusive access to a live room
    pub fn with_room<T>(
        &self,
        room_id: &str,
        f: impl FnOnce(&mut Room) -> Result<T, RoomError>,
    ) -> Result<T, RoomError> {
        let shared = self.shared(room_id)?;
        let mut room = shared.lock();
        if room.is_closed() {
            return Err(RoomError::NotFound(room_id.to_string()));
        }
        f(&mut room)
    }

    /// Create an empty room waiting for players
    pub fn create_room(&self) -> RoomSnapshot {
        let room = Room::new(generate_room_id());
        let snapshot = room.snapshot();
        self.rooms
            .insert(snapshot.id.clone(), Arc::new(Mutex::new(room)));

        info!(room_id = %snapshot.id, "Room created");
        snapshot
    }

    /// Claim a seat in the presence index. A queue presence only converts
    /// into a seat when the player was matched out of the queue.
    fn claim(&self, player_id: &str, room_id: &str, from_queue: bool) -> Result<(), RoomError> {
        match self.presence.entry(player_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Presence::Seated(room_id.to_string()));
                Ok(())
            }
            Entry::Occupied(mut slot) => match slot.get() {
                Presence::Queued if from_queue => {
                    slot.insert(Presence::Seated(room_id.to_string()));
                    Ok(())
                }
                Presence::Queued => Err(RoomError::AlreadyQueued {
                    player_id: player_id.to_string(),
                }),
                Presence::Seated(_) => Err(RoomError::AlreadyInRoom {
                    player_id: player_id.to_string(),
                }),
            },
        }
    }

    fn release(&self, player_id: &str, room_id: &str) {
        self.presence.remove_if(player_id, |_, presence| {
            matches!(presence, Presence::Seated(seated_in) if seated_in == room_id)
        });
    }

    /// Seat a player in an existing room
    pub fn join_room(&self, room_id: &str, player: Player) -> Result<RoomSnapshot, RoomError> {
        let player_id = player.info.id.clone();
        self.claim(&player_id, room_id, false)?;

        let joined = self.with_room(room_id, |room| {
            room.add_player(player)?;
            Ok(room.snapshot())
        });

        if joined.is_err() {
            self.release(&player_id, room_id);
        }
        joined
    }

    /// Build a room already holding both matched `players` and register it.
    /// Either every player is seated or nothing is.
    pub fn create_match(&self, players: Vec<Player>) -> Result<RoomSnapshot, RoomError> {
        let mut room = Room::new(generate_room_id());
        let room_id = room.id().to_string();

        let mut claimed: Vec<String> = Vec::with_capacity(players.len());
        let mut seated = Ok(());
        for player in players {
            if let Err(e) = self.claim(player.id(), &room_id, true) {
                seated = Err(e);
                break;
            }
            claimed.push(player.info.id.clone());
            if let Err(e) = room.add_player(player) {
                seated = Err(e);
                break;
            }
        }

        if let Err(e) = seated {
            for player_id in &claimed {
                self.release(player_id, &room_id);
            }
            return Err(e);
        }

        let snapshot = room.snapshot();
        self.rooms.insert(room_id.clone(), Arc::new(Mutex::new(room)));
        info!(room_id = %room_id, "Match room created");
        Ok(snapshot)
    }

    pub fn snapshot(&self, room_id: &str) -> Result<RoomSnapshot, RoomError> {
        self.with_room(room_id, |room| Ok(room.snapshot()))
    }

    pub fn is_member(&self, room_id: &str, player_id: &str) -> Result<bool, RoomError> {
        self.with_room(room_id, |room| Ok(room.contains(player_id)))
    }

    pub fn announce(&self, room_id: &str, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| room.announce(player_id))
    }

    pub fn choose_game(
        &self,
        room_id: &str,
        player_id: &str,
        game_type: GameType,
    ) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| {
            room.choose_game(&self.games, player_id, game_type)
        })
    }

    pub fn accept_game(
        &self,
        room_id: &str,
        player_id: &str,
        game_type: GameType,
    ) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| {
            room.accept_game(&self.games, player_id, game_type)
        })
    }

    pub fn reject_game(
        &self,
        room_id: &str,
        player_id: &str,
        game_type: GameType,
    ) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| room.reject_game(player_id, game_type))
    }

    pub fn start_game(&self, room_id: &str) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| room.start_game())
    }

    pub fn make_move(
        &self,
        room_id: &str,
        player_id: &str,
        mv: &Value,
    ) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| room.make_move(player_id, mv))
    }

    pub fn request_replay(&self, room_id: &str, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| room.request_replay(player_id))
    }

    pub fn accept_replay(&self, room_id: &str, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| room.accept_replay(player_id))
    }

    pub fn reject_replay(&self, room_id: &str, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| room.reject_replay(player_id))
    }

    /// Remove the room on behalf of one of its players
    pub fn leave(&self, room_id: &str, player_id: &str) -> Result<Vec<Delivery>, RoomError> {
        self.with_room(room_id, |room| {
            let deliveries = room.depart(player_id)?;
            for p in room.players() {
                self.release(p.id(), room_id);
            }
            self.rooms.remove(room_id);
            Ok(deliveries)
        })
    }

    /// Remove rooms that have stayed empty for `ttl` since creation.
    /// Returns how many were removed.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let candidates: Vec<(RoomId, SharedRoom)> = self
            .rooms
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let mut removed = 0;
        for (room_id, shared) in candidates {
            let mut room = shared.lock();
            if room.is_closed() || !room.is_abandoned(ttl) {
                continue;
            }
            room.close();
            self.rooms.remove(&room_id);
            removed += 1;
            debug!(room_id = %room_id, "Removed abandoned room");
        }
        removed
    }

    /// Periodically sweep rooms nobody joined
    pub async fn run_sweeper(&self, ttl: Duration) {
        let mut interval = tokio::time::interval(ttl.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(ttl_secs = ttl.as_secs(), "Room sweeper started");

        loop {
            interval.tick().await;
            let removed = self.sweep_idle(ttl);
            if removed > 0 {
                info!(removed, active_rooms = self.len(), "Swept abandoned rooms");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::PlayerInfo;
    use crate::room::RoomStatus;
    use crate::ws::connection::{deliver, ConnectionHandle, Outbound};
    use crate::ws::protocol::ServerMsg;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn store() -> RoomStore {
        RoomStore::new(Arc::new(GameRegistry::with_builtin_games()))
    }

    fn player(id: &str) -> (Player, UnboundedReceiver<Outbound>) {
        let (connection, rx) = ConnectionHandle::new(id);
        (Player::new(PlayerInfo::new(id, id), connection), rx)
    }

    #[test]
    fn test_create_and_join() {
        let store = store();
        let room = store.create_room();
        assert_eq!(room.status, RoomStatus::WaitingForPlayer);

        let (a, _ra) = player("a");
        let (b, _rb) = player("b");
        store.join_room(&room.id, a).unwrap();
        let snapshot = store.join_room(&room.id, b).unwrap();

        assert_eq!(snapshot.status, RoomStatus::GameSelection);
        assert_eq!(store.room_of("a"), Some(room.id.clone()));
        assert_eq!(store.room_of("b"), Some(room.id.clone()));
    }

    #[test]
    fn test_third_join_fails_and_releases_index() {
        let store = store();
        let room = store.create_room();
        for id in ["a", "b"] {
            let (p, _rx) = player(id);
            store.join_room(&room.id, p).unwrap();
        }

        let (c, _rc) = player("c");
        let err = store.join_room(&room.id, c).unwrap_err();
        assert!(matches!(err, RoomError::RoomFull(_)));
        assert_eq!(store.room_of("c"), None);
    }

    #[test]
    fn test_player_cannot_sit_in_two_rooms() {
        let store = store();
        let first = store.create_room();
        let second = store.create_room();

        let (a, _ra) = player("a");
        store.join_room(&first.id, a).unwrap();
        let (a_again, _ra2) = player("a");
        let err = store.join_room(&second.id, a_again).unwrap_err();

        assert!(matches!(err, RoomError::AlreadyInRoom { .. }));
        assert_eq!(store.room_of("a"), Some(first.id));
    }

    #[test]
    fn test_join_unknown_room() {
        let store = store();
        let (a, _ra) = player("a");
        assert!(matches!(
            store.join_room("nope", a),
            Err(RoomError::NotFound(_))
        ));
        assert_eq!(store.room_of("a"), None);
    }

    #[test]
    fn test_create_match_is_all_or_nothing() {
        let store = store();
        let existing = store.create_room();
        let (b, _rb) = player("b");
        store.join_room(&existing.id, b).unwrap();

        let (a, _ra) = player("a");
        let (b_again, _rb2) = player("b");
        let err = store.create_match(vec![a, b_again]).unwrap_err();

        assert!(matches!(err, RoomError::AlreadyInRoom { .. }));
        assert_eq!(store.room_of("a"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_queued_player_cannot_be_seated() {
        let store = store();
        let room = store.create_room();
        store.mark_queued("a").unwrap();
        assert_eq!(store.mark_queued("a"), Err(Presence::Queued));

        let (a, _ra) = player("a");
        let err = store.join_room(&room.id, a).unwrap_err();
        assert!(matches!(err, RoomError::AlreadyQueued { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::StateConflict);
        assert_eq!(store.room_of("a"), None);

        // Matched out of the queue, the presence becomes a seat
        let (a, _ra) = player("a");
        let (b, _rb) = player("b");
        let matched = store.create_match(vec![a, b]).unwrap();
        assert_eq!(store.room_of("a"), Some(matched.id.clone()));
        assert_eq!(store.mark_queued("a"), Err(Presence::Seated(matched.id)));

        // Unmarking never drops a seat
        store.unmark_queued("a");
        assert!(store.room_of("a").is_some());
    }

    #[test]
    fn test_unmark_queued_frees_player() {
        let store = store();
        store.mark_queued("a").unwrap();
        store.unmark_queued("a");

        let room = store.create_room();
        let (a, _ra) = player("a");
        assert!(store.join_room(&room.id, a).is_ok());
    }

    #[test]
    fn test_sweep_removes_only_empty_rooms() {
        let store = store();
        let empty = store.create_room();
        let waiting = store.create_room();
        let (a, _ra) = player("a");
        store.join_room(&waiting.id, a).unwrap();
        let (b, _rb) = player("b");
        let (c, _rc) = player("c");
        store.create_match(vec![b, c]).unwrap();

        assert_eq!(store.sweep_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 3);

        assert_eq!(store.sweep_idle(Duration::ZERO), 1);
        assert_eq!(store.len(), 2);
        assert!(matches!(store.snapshot(&empty.id), Err(RoomError::NotFound(_))));

        let (late, _rl) = player("late");
        assert!(matches!(
            store.join_room(&empty.id, late),
            Err(RoomError::NotFound(_))
        ));
        assert_eq!(store.room_of("late"), None);
    }

    #[test]
    fn test_leave_removes_room_and_notifies() {
        let store = store();
        let (a, _ra) = player("a");
        let (b, mut rb) = player("b");
        let room = store.create_match(vec![a, b]).unwrap();

        deliver(store.leave(&room.id, "a").unwrap());

        assert_eq!(store.len(), 0);
        assert_eq!(store.room_of("a"), None);
        assert_eq!(store.room_of("b"), None);
        assert!(matches!(
            rb.try_recv(),
            Ok(Outbound::Message(ServerMsg::OpponentLeft { .. }))
        ));
        assert!(matches!(rb.try_recv(), Ok(Outbound::Close)));
        assert!(matches!(
            store.snapshot(&room.id),
            Err(RoomError::NotFound(_))
        ));
        assert!(matches!(store.leave(&room.id, "b"), Err(RoomError::NotFound(_))));
    }

    #[test]
    fn test_concurrent_joins_never_exceed_capacity() {
        let store = Arc::new(store());
        let room = store.create_room();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let room_id = room.id.clone();
                std::thread::spawn(move || {
                    let (p, _rx) = player(&format!("p{}", i));
                    store.join_room(&room_id, p).is_ok()
                })
            })
            .collect();

        let seated = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(seated, 2);
        assert_eq!(store.snapshot(&room.id).unwrap().players.len(), 2);
    }

    #[test]
    fn test_concurrent_moves_keep_turn_order() {
        let store = Arc::new(store());
        let (a, _ra) = player("a");
        let (b, _rb) = player("b");
        let room = store.create_match(vec![a, b]).unwrap();
        store.choose_game(&room.id, "a", "tictactoe".into()).unwrap();
        store.accept_game(&room.id, "b", "tictactoe".into()).unwrap();

        // Both players race for the same first move; only the current mover wins
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|id| {
                let store = store.clone();
                let room_id = room.id.clone();
                std::thread::spawn(move || {
                    store
                        .make_move(&room_id, id, &json!({"row": 1, "col": 1}))
                        .is_ok()
                })
            })
            .collect();
        let accepted: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(accepted, vec![true, false]);
        let game = store.snapshot(&room.id).unwrap().game.unwrap();
        assert_eq!(game.state["board"][1][1], json!("a"));
        assert_eq!(game.state["current_player"], json!("b"));
    }
}
