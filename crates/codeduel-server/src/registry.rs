use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{RwLock, mpsc};

use codeduel_core::battle::BattleId;
use codeduel_core::player::{ConnectionId, default_player_name, normalize_player_name};
use codeduel_core::room::RoomId;

use crate::error::DuelError;

/// Per-connection sender for outbound WebSocket text frames.
/// Bounded so a slow client cannot exhaust server memory.
/// Uses `Bytes` for zero-copy cloning when fanning out to both duelists.
pub type PlayerSender = mpsc::Sender<Bytes>;

pub type SharedRegistry = Arc<RwLock<ConnectionRegistry>>;

/// Which component currently owns a connection. A connection is bound to at
/// most one of queue, room or battle at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBinding {
    Idle,
    Queued,
    InRoom(RoomId),
    InBattle(BattleId),
}

struct ConnectionEntry {
    display_name: String,
    sender: PlayerSender,
    binding: SessionBinding,
}

/// All live WebSocket connections, keyed by the handle allocated on upgrade.
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    next_id: ConnectionId,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    /// Allocate a handle for a new connection. It starts `Idle` with a generated name.
    pub fn register(&mut self, sender: PlayerSender) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(
            id,
            ConnectionEntry {
                display_name: default_player_name(id),
                sender,
                binding: SessionBinding::Idle,
            },
        );
        id
    }

    /// Drop a connection, returning the binding it held so the caller can
    /// release whatever owned it.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<SessionBinding> {
        self.connections.remove(&id).map(|e| e.binding)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn display_name(&self, id: ConnectionId) -> Option<String> {
        self.connections.get(&id).map(|e| e.display_name.clone())
    }

    /// Validate and store a display name. Names are frozen once a battle starts.
    pub fn set_name(&mut self, id: ConnectionId, raw: &str) -> Result<String, DuelError> {
        let name = normalize_player_name(raw).ok_or(DuelError::InvalidName)?;
        let entry = self
            .connections
            .get_mut(&id)
            .ok_or(DuelError::SessionNotFound)?;
        if matches!(entry.binding, SessionBinding::InBattle(_)) {
            return Err(DuelError::Busy("Cannot rename during a battle"));
        }
        entry.display_name = name.clone();
        Ok(name)
    }

    pub fn binding(&self, id: ConnectionId) -> Option<SessionBinding> {
        self.connections.get(&id).map(|e| e.binding.clone())
    }

    pub fn sender(&self, id: ConnectionId) -> Option<PlayerSender> {
        self.connections.get(&id).map(|e| e.sender.clone())
    }

    /// Move an `Idle` connection to `binding`. Anything else is `Busy`.
    pub fn bind_if_idle(
        &mut self,
        id: ConnectionId,
        binding: SessionBinding,
    ) -> Result<(), DuelError> {
        let entry = self
            .connections
            .get_mut(&id)
            .ok_or(DuelError::SessionNotFound)?;
        if entry.binding != SessionBinding::Idle {
            return Err(DuelError::Busy(busy_reason(&entry.binding)));
        }
        entry.binding = binding;
        Ok(())
    }

    /// Overwrite a binding. Returns false if the connection is gone.
    pub fn set_binding(&mut self, id: ConnectionId, binding: SessionBinding) -> bool {
        match self.connections.get_mut(&id) {
            Some(entry) => {
                entry.binding = binding;
                true
            },
            None => false,
        }
    }

    /// Return a connection to `Idle`, but only if it still holds `expected`.
    /// A connection that has already moved on is left alone.
    pub fn release(&mut self, id: ConnectionId, expected: &SessionBinding) -> bool {
        match self.connections.get_mut(&id) {
            Some(entry) if entry.binding == *expected => {
                entry.binding = SessionBinding::Idle;
                true
            },
            _ => false,
        }
    }

    /// Queue a frame for one connection. Full or closed channels drop the frame.
    pub fn send_to(&self, id: ConnectionId, data: Bytes) {
        if let Some(entry) = self.connections.get(&id)
            && let Err(e) = entry.sender.try_send(data)
        {
            tracing::debug!(
                connection_id = id, error = %e,
                "Failed to send to connection (slow or disconnected)"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Client-facing reason a bound connection cannot take on another binding.
pub fn busy_reason(binding: &SessionBinding) -> &'static str {
    match binding {
        SessionBinding::Idle => "Connection is idle",
        SessionBinding::Queued => "Already in matchmaking",
        SessionBinding::InRoom(_) => "Already in a room",
        SessionBinding::InBattle(_) => "Already in a battle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender() -> (PlayerSender, mpsc::Receiver<Bytes>) {
        mpsc::channel(16)
    }

    #[test]
    fn register_allocates_sequential_ids() {
        let mut reg = ConnectionRegistry::new();
        let (tx1, _rx1) = make_sender();
        let (tx2, _rx2) = make_sender();
        assert_eq!(reg.register(tx1), 1);
        assert_eq!(reg.register(tx2), 2);
        assert_eq!(reg.display_name(2).as_deref(), Some("Player 2"));
        assert_eq!(reg.binding(1), Some(SessionBinding::Idle));
    }

    #[test]
    fn set_name_validates() {
        let mut reg = ConnectionRegistry::new();
        let (tx, _rx) = make_sender();
        let id = reg.register(tx);
        assert_eq!(reg.set_name(id, "  Ada  ").unwrap(), "Ada");
        assert_eq!(reg.set_name(id, "   "), Err(DuelError::InvalidName));
        assert_eq!(reg.display_name(id).as_deref(), Some("Ada"));
    }

    #[test]
    fn rename_rejected_in_battle() {
        let mut reg = ConnectionRegistry::new();
        let (tx, _rx) = make_sender();
        let id = reg.register(tx);
        reg.set_binding(id, SessionBinding::InBattle("b1".into()));
        assert!(matches!(reg.set_name(id, "Ada"), Err(DuelError::Busy(_))));
    }

    #[test]
    fn bind_if_idle_is_exclusive() {
        let mut reg = ConnectionRegistry::new();
        let (tx, _rx) = make_sender();
        let id = reg.register(tx);
        reg.bind_if_idle(id, SessionBinding::Queued).unwrap();
        let err = reg
            .bind_if_idle(id, SessionBinding::InRoom("ABCD-1234".into()))
            .unwrap_err();
        assert_eq!(err, DuelError::Busy("Already in matchmaking"));
        assert_eq!(reg.binding(id), Some(SessionBinding::Queued));
    }

    #[test]
    fn release_only_matching_binding() {
        let mut reg = ConnectionRegistry::new();
        let (tx, _rx) = make_sender();
        let id = reg.register(tx);
        reg.set_binding(id, SessionBinding::InBattle("new".into()));
        assert!(!reg.release(id, &SessionBinding::InBattle("old".into())));
        assert_eq!(reg.binding(id), Some(SessionBinding::InBattle("new".into())));
        assert!(reg.release(id, &SessionBinding::InBattle("new".into())));
        assert_eq!(reg.binding(id), Some(SessionBinding::Idle));
    }

    #[test]
    fn unregister_returns_binding() {
        let mut reg = ConnectionRegistry::new();
        let (tx, _rx) = make_sender();
        let id = reg.register(tx);
        reg.set_binding(id, SessionBinding::Queued);
        assert_eq!(reg.unregister(id), Some(SessionBinding::Queued));
        assert!(!reg.contains(id));
        assert!(reg.is_empty());
    }

    #[test]
    fn send_to_delivers_frame() {
        let mut reg = ConnectionRegistry::new();
        let (tx, mut rx) = make_sender();
        let id = reg.register(tx);
        reg.send_to(id, Bytes::from_static(b"hi"));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"hi"));
    }
}
