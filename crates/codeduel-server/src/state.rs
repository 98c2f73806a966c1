use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, RwLock};

use crate::config::ServerConfig;
use crate::coordinator::{BattleCoordinator, Collaborators};
use crate::matchmaking::{MatchmakingQueue, SharedQueue};
use crate::registry::{ConnectionRegistry, SharedRegistry};
use crate::room_manager::{RoomManager, SharedRoomManager};

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub queue: SharedQueue,
    pub rooms: SharedRoomManager,
    pub battles: Arc<BattleCoordinator>,
    pub config: Arc<ServerConfig>,
    /// Active WebSocket connections, used to enforce `limits.max_ws_connections`.
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let registry: SharedRegistry = Arc::new(RwLock::new(ConnectionRegistry::new()));
        let rooms: SharedRoomManager = Arc::new(RwLock::new(RoomManager::new()));
        let battles = Arc::new(BattleCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&rooms),
            collaborators,
            Arc::clone(&config),
        ));
        Self {
            registry,
            queue: Arc::new(Mutex::new(MatchmakingQueue::new())),
            rooms,
            battles,
            config,
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts one live WebSocket for as long as it is held.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
