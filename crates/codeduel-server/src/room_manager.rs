use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use codeduel_core::net::messages::{RoomClosedMsg, RoomUpdatedMsg, ServerMessage};
use codeduel_core::player::{ConnectionId, PlayerSummary};
use codeduel_core::room::{MAX_PASSWORD_LEN, ROOM_CAPACITY, RoomId, RoomPhase, generate_room_id};

use crate::broadcast::encode_frame;
use crate::error::DuelError;
use crate::registry::PlayerSender;

pub type SharedRoomManager = Arc<RwLock<RoomManager>>;

/// A seated player and the channel used to reach them.
#[derive(Debug, Clone)]
pub struct Occupant {
    pub connection_id: ConnectionId,
    pub name: String,
    pub sender: PlayerSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The connection was already seated; nothing changed.
    AlreadyPresent,
}

/// A room removed by idle cleanup, with the connections that were seated in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedRoom {
    pub room_id: RoomId,
    pub occupants: Vec<ConnectionId>,
}

struct RoomEntry {
    is_private: bool,
    password: Option<String>,
    /// Seat 0 is the host.
    occupants: Vec<Occupant>,
    phase: RoomPhase,
    last_activity: Instant,
}

impl RoomEntry {
    fn seat_of(&self, connection_id: ConnectionId) -> Option<usize> {
        self.occupants
            .iter()
            .position(|o| o.connection_id == connection_id)
    }

    fn summaries(&self) -> Vec<PlayerSummary> {
        self.occupants
            .iter()
            .enumerate()
            .map(|(seat, o)| PlayerSummary {
                id: o.connection_id,
                name: o.name.clone(),
                is_host: seat == 0,
            })
            .collect()
    }
}

/// Manages all private two-seat rooms.
pub struct RoomManager {
    rooms: HashMap<RoomId, RoomEntry>,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Create a room with `creator` seated as host. An empty password means none.
    pub fn create_room(
        &mut self,
        creator: Occupant,
        is_private: bool,
        password: Option<String>,
    ) -> Result<RoomId, DuelError> {
        let password = password.filter(|p| !p.is_empty());
        if password.as_ref().is_some_and(|p| p.len() > MAX_PASSWORD_LEN) {
            return Err(DuelError::InvalidPassword);
        }
        let room_id = generate_unique_room_id(&self.rooms);
        self.rooms.insert(
            room_id.clone(),
            RoomEntry {
                is_private,
                password,
                occupants: vec![creator],
                phase: RoomPhase::Lobby,
                last_activity: Instant::now(),
            },
        );
        Ok(room_id)
    }

    /// Seat a connection in an existing room. Re-joining is an idempotent success.
    pub fn join_room(
        &mut self,
        room_id: &str,
        occupant: Occupant,
        password: Option<&str>,
    ) -> Result<JoinOutcome, DuelError> {
        let entry = self.rooms.get_mut(room_id).ok_or(DuelError::RoomNotFound)?;

        if entry.seat_of(occupant.connection_id).is_some() {
            return Ok(JoinOutcome::AlreadyPresent);
        }
        if entry.phase != RoomPhase::Lobby {
            return Err(DuelError::RoomInBattle);
        }
        if entry.occupants.len() >= ROOM_CAPACITY {
            return Err(DuelError::RoomFull);
        }
        if let Some(ref expected) = entry.password
            && password != Some(expected.as_str())
        {
            return Err(DuelError::WrongPassword);
        }

        entry.occupants.push(occupant);
        entry.last_activity = Instant::now();
        Ok(JoinOutcome::Joined)
    }

    /// Claim both occupants for a battle and consume the room.
    ///
    /// Returns `Ok(None)` while the room is still waiting for its second
    /// player. Only a seated connection may start the battle.
    pub fn take_for_battle(
        &mut self,
        room_id: &str,
        requester: ConnectionId,
    ) -> Result<Option<[Occupant; 2]>, DuelError> {
        let entry = self.rooms.get_mut(room_id).ok_or(DuelError::RoomNotFound)?;
        if entry.seat_of(requester).is_none() {
            return Err(DuelError::NotInRoom);
        }
        if entry.phase != RoomPhase::Lobby {
            return Err(DuelError::RoomInBattle);
        }
        let [host, guest] = entry.occupants.as_slice() else {
            return Ok(None);
        };
        let pair = [host.clone(), guest.clone()];
        entry.phase = RoomPhase::Consumed;
        entry.last_activity = Instant::now();
        Ok(Some(pair))
    }

    /// Remove an occupant from an unstarted room. Returns the room id if the
    /// room was destroyed because it emptied. Consumed rooms belong to their
    /// battle and are left alone.
    pub fn leave_room(&mut self, room_id: &str, connection_id: ConnectionId) -> Option<RoomId> {
        let entry = self.rooms.get_mut(room_id)?;
        if entry.phase != RoomPhase::Lobby {
            return None;
        }
        let seat = entry.seat_of(connection_id)?;
        entry.occupants.remove(seat);
        entry.last_activity = Instant::now();

        if entry.occupants.is_empty() {
            self.rooms.remove(room_id);
            return Some(room_id.to_string());
        }

        // Host left: the remaining occupant shifted into seat 0 and is now host.
        if seat == 0
            && let Some(new_host) = entry.occupants.first()
        {
            tracing::info!(
                room_id,
                new_host = new_host.connection_id,
                "Host left, migrated"
            );
        }
        None
    }

    /// Drop a room outright, once its battle has finished.
    pub fn remove_room(&mut self, room_id: &str) -> bool {
        self.rooms.remove(room_id).is_some()
    }

    pub fn rename_occupant(&mut self, room_id: &str, connection_id: ConnectionId, name: &str) {
        if let Some(entry) = self.rooms.get_mut(room_id)
            && let Some(seat) = entry.seat_of(connection_id)
        {
            entry.occupants[seat].name = name.to_string();
            entry.last_activity = Instant::now();
        }
    }

    pub fn players(&self, room_id: &str) -> Option<Vec<PlayerSummary>> {
        self.rooms.get(room_id).map(RoomEntry::summaries)
    }

    #[cfg(test)]
    pub fn host_id(&self, room_id: &str) -> Option<ConnectionId> {
        self.rooms
            .get(room_id)?
            .occupants
            .first()
            .map(|o| o.connection_id)
    }

    #[cfg(test)]
    pub fn phase(&self, room_id: &str) -> Option<RoomPhase> {
        self.rooms.get(room_id).map(|e| e.phase)
    }

    /// Build and send a `room:updated` to everyone seated in the room.
    pub fn broadcast_room_update(&self, room_id: &str) {
        let Some(entry) = self.rooms.get(room_id) else {
            return;
        };
        let msg = ServerMessage::RoomUpdated(RoomUpdatedMsg {
            room_id: room_id.to_string(),
            players: entry.summaries(),
        });
        let Some(bytes) = encode_frame(&msg) else {
            return;
        };
        for occupant in &entry.occupants {
            if let Err(e) = occupant.sender.try_send(bytes.clone()) {
                tracing::debug!(
                    connection_id = occupant.connection_id, room_id, error = %e,
                    "Skipping room update to slow client"
                );
            }
        }
    }

    /// Close unstarted rooms idle for longer than `max_idle`, notifying their
    /// occupants with `room:closed`.
    pub fn cleanup_idle_rooms(&mut self, max_idle: Duration) -> Vec<ClosedRoom> {
        let now = Instant::now();
        let stale: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, e)| {
                e.phase == RoomPhase::Lobby && now.duration_since(e.last_activity) >= max_idle
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut closed = Vec::with_capacity(stale.len());
        for room_id in stale {
            let Some(entry) = self.rooms.remove(&room_id) else {
                continue;
            };
            let msg = ServerMessage::RoomClosed(RoomClosedMsg {
                room_id: room_id.clone(),
                reason: "Room closed after inactivity".to_string(),
            });
            if let Some(bytes) = encode_frame(&msg) {
                for occupant in &entry.occupants {
                    let _ = occupant.sender.try_send(bytes.clone());
                }
            }
            closed.push(ClosedRoom {
                room_id,
                occupants: entry.occupants.iter().map(|o| o.connection_id).collect(),
            });
        }
        closed
    }

    /// (rooms, private rooms, seated players)
    pub fn stats(&self) -> (usize, usize, usize) {
        let private = self.rooms.values().filter(|e| e.is_private).count();
        let seated = self.rooms.values().map(|e| e.occupants.len()).sum();
        (self.rooms.len(), private, seated)
    }

    #[cfg(test)]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }
}

/// Generate a unique room id, retrying on collision with existing rooms.
fn generate_unique_room_id(existing: &HashMap<RoomId, RoomEntry>) -> RoomId {
    loop {
        let id = generate_room_id();
        if !existing.contains_key(&id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use codeduel_core::net::protocol::decode_server_message;
    use codeduel_core::room::is_valid_room_id;
    use tokio::sync::mpsc;

    fn occupant(id: ConnectionId, name: &str) -> (Occupant, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Occupant {
                connection_id: id,
                name: name.to_string(),
                sender: tx,
            },
            rx,
        )
    }

    fn room_with_host(mgr: &mut RoomManager) -> (RoomId, mpsc::Receiver<Bytes>) {
        let (host, rx) = occupant(1, "Alice");
        let id = mgr.create_room(host, true, None).unwrap();
        (id, rx)
    }

    #[test]
    fn create_room_seats_host() {
        let mut mgr = RoomManager::new();
        let (id, _rx) = room_with_host(&mut mgr);
        assert!(is_valid_room_id(&id));
        assert!(mgr.room_exists(&id));
        assert_eq!(mgr.host_id(&id), Some(1));
        let players = mgr.players(&id).unwrap();
        assert_eq!(players.len(), 1);
        assert!(players[0].is_host);
    }

    #[test]
    fn overlong_password_rejected() {
        let mut mgr = RoomManager::new();
        let (host, _rx) = occupant(1, "Alice");
        let err = mgr
            .create_room(host, true, Some("x".repeat(MAX_PASSWORD_LEN + 1)))
            .unwrap_err();
        assert_eq!(err, DuelError::InvalidPassword);
        assert_eq!(mgr.stats().0, 0);
    }

    #[test]
    fn join_room_succeeds() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        let (guest, _rx2) = occupant(2, "Bob");
        assert_eq!(mgr.join_room(&id, guest, None), Ok(JoinOutcome::Joined));
        let players = mgr.players(&id).unwrap();
        assert_eq!(players.len(), 2);
        assert!(!players[1].is_host);
    }

    #[test]
    fn join_nonexistent_room_fails() {
        let mut mgr = RoomManager::new();
        let (guest, _rx) = occupant(2, "Bob");
        assert_eq!(
            mgr.join_room("XXXX-0000", guest, None),
            Err(DuelError::RoomNotFound)
        );
    }

    #[test]
    fn join_full_room_fails_and_leaves_room_unchanged() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        let (guest, _rx2) = occupant(2, "Bob");
        mgr.join_room(&id, guest, None).unwrap();

        let (extra, _rx3) = occupant(3, "Carol");
        assert_eq!(mgr.join_room(&id, extra, None), Err(DuelError::RoomFull));
        let ids: Vec<_> = mgr.players(&id).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn rejoin_is_idempotent() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        let (guest, _rx2) = occupant(2, "Bob");
        mgr.join_room(&id, guest.clone(), None).unwrap();
        assert_eq!(
            mgr.join_room(&id, guest, None),
            Ok(JoinOutcome::AlreadyPresent)
        );
        assert_eq!(mgr.players(&id).unwrap().len(), 2);
    }

    #[test]
    fn password_is_enforced() {
        let mut mgr = RoomManager::new();
        let (host, _rx1) = occupant(1, "Alice");
        let id = mgr
            .create_room(host, true, Some("hunter2".into()))
            .unwrap();

        let (guest, _rx2) = occupant(2, "Bob");
        assert_eq!(
            mgr.join_room(&id, guest.clone(), None),
            Err(DuelError::WrongPassword)
        );
        assert_eq!(
            mgr.join_room(&id, guest.clone(), Some("nope")),
            Err(DuelError::WrongPassword)
        );
        assert_eq!(
            mgr.join_room(&id, guest, Some("hunter2")),
            Ok(JoinOutcome::Joined)
        );
    }

    #[test]
    fn start_needs_two_occupants() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        assert!(mgr.take_for_battle(&id, 1).unwrap().is_none());
        assert_eq!(mgr.phase(&id), Some(RoomPhase::Lobby));
    }

    #[test]
    fn start_consumes_room() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        let (guest, _rx2) = occupant(2, "Bob");
        mgr.join_room(&id, guest, None).unwrap();

        assert_eq!(mgr.take_for_battle(&id, 3).unwrap_err(), DuelError::NotInRoom);

        let pair = mgr.take_for_battle(&id, 2).unwrap().unwrap();
        assert_eq!(pair[0].connection_id, 1);
        assert_eq!(pair[1].connection_id, 2);
        assert_eq!(mgr.phase(&id), Some(RoomPhase::Consumed));

        assert_eq!(
            mgr.take_for_battle(&id, 1).unwrap_err(),
            DuelError::RoomInBattle
        );
        let (late, _rx3) = occupant(3, "Carol");
        assert_eq!(mgr.join_room(&id, late, None), Err(DuelError::RoomInBattle));
    }

    #[test]
    fn leave_room_removes_player() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        let (guest, _rx2) = occupant(2, "Bob");
        mgr.join_room(&id, guest, None).unwrap();

        assert!(mgr.leave_room(&id, 2).is_none());
        let players = mgr.players(&id).unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, 1);
    }

    #[test]
    fn leave_room_destroys_empty_room() {
        let mut mgr = RoomManager::new();
        let (id, _rx) = room_with_host(&mut mgr);
        assert_eq!(mgr.leave_room(&id, 1), Some(id.clone()));
        assert!(!mgr.room_exists(&id));
    }

    #[test]
    fn host_migration_on_leave() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        let (guest, _rx2) = occupant(2, "Bob");
        mgr.join_room(&id, guest, None).unwrap();

        mgr.leave_room(&id, 1);
        assert_eq!(mgr.host_id(&id), Some(2));
        assert!(mgr.players(&id).unwrap()[0].is_host);
    }

    #[test]
    fn consumed_room_ignores_leave() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        let (guest, _rx2) = occupant(2, "Bob");
        mgr.join_room(&id, guest, None).unwrap();
        mgr.take_for_battle(&id, 1).unwrap();

        assert!(mgr.leave_room(&id, 1).is_none());
        assert_eq!(mgr.players(&id).unwrap().len(), 2);
        assert!(mgr.remove_room(&id));
        assert!(!mgr.room_exists(&id));
    }

    #[test]
    fn rename_updates_summary() {
        let mut mgr = RoomManager::new();
        let (id, _rx) = room_with_host(&mut mgr);
        mgr.rename_occupant(&id, 1, "Ada");
        assert_eq!(mgr.players(&id).unwrap()[0].name, "Ada");
    }

    #[test]
    fn room_update_reaches_all_occupants() {
        let mut mgr = RoomManager::new();
        let (id, mut rx1) = room_with_host(&mut mgr);
        let (guest, mut rx2) = occupant(2, "Bob");
        mgr.join_room(&id, guest, None).unwrap();

        mgr.broadcast_room_update(&id);
        for rx in [&mut rx1, &mut rx2] {
            let bytes = rx.try_recv().unwrap();
            let msg = decode_server_message(std::str::from_utf8(&bytes).unwrap()).unwrap();
            let ServerMessage::RoomUpdated(update) = msg else {
                panic!("expected room:updated");
            };
            assert_eq!(update.room_id, id);
            assert_eq!(update.players.len(), 2);
        }
    }

    #[test]
    fn idle_room_cleanup_removes_stale_rooms() {
        let mut mgr = RoomManager::new();
        let (id1, mut rx1) = room_with_host(&mut mgr);
        let (host2, _rx2) = occupant(2, "Bob");
        let id2 = mgr.create_room(host2, false, None).unwrap();

        // Artificially age the first room
        mgr.rooms.get_mut(&id1).unwrap().last_activity =
            Instant::now() - Duration::from_secs(7200);

        let closed = mgr.cleanup_idle_rooms(Duration::from_secs(3600));
        assert_eq!(
            closed,
            vec![ClosedRoom {
                room_id: id1.clone(),
                occupants: vec![1],
            }]
        );
        assert!(!mgr.room_exists(&id1));
        assert!(mgr.room_exists(&id2));

        let bytes = rx1.try_recv().unwrap();
        let msg = decode_server_message(std::str::from_utf8(&bytes).unwrap()).unwrap();
        assert!(matches!(msg, ServerMessage::RoomClosed(ref c) if c.room_id == id1));
    }

    #[test]
    fn stats_count_rooms_and_players() {
        let mut mgr = RoomManager::new();
        let (id, _rx1) = room_with_host(&mut mgr);
        let (guest, _rx2) = occupant(2, "Bob");
        mgr.join_room(&id, guest, None).unwrap();
        let (host2, _rx3) = occupant(3, "Carol");
        mgr.create_room(host2, false, None).unwrap();
        assert_eq!(mgr.stats(), (2, 1, 3));
    }
}
