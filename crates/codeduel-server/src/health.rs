use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub matchmaking: QueueInfo,
    pub rooms: RoomInfo,
    pub battles: BattleInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
    pub registered: usize,
}

#[derive(Serialize)]
pub struct QueueInfo {
    pub waiting: usize,
}

#[derive(Serialize)]
pub struct RoomInfo {
    pub active: usize,
    pub private: usize,
    pub players: usize,
}

#[derive(Serialize)]
pub struct BattleInfo {
    pub active: usize,
}

/// Server status, connection counts and match state as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ws = state.ws_connection_count.load(Ordering::Relaxed);
    let registered = state.registry.read().await.len();
    let waiting = state.queue.lock().await.len();
    let (active_rooms, private_rooms, seated) = state.rooms.read().await.stats();
    let battles = state.battles.active_battles().await;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo {
            websocket: ws,
            registered,
        },
        matchmaking: QueueInfo { waiting },
        rooms: RoomInfo {
            active: active_rooms,
            private: private_rooms,
            players: seated,
        },
        battles: BattleInfo { active: battles },
    })
}

/// Readiness check. The server is ready once it has problems to hand out.
pub async fn readiness_check(State(state): State<AppState>) -> &'static str {
    if state.battles.problem_count() == 0 {
        return "not ready: no problems loaded";
    }
    "ready"
}
