pub mod battle_loop;
pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod hint;
pub mod judge;
pub mod matchmaking;
pub mod problems;
pub mod registry;
pub mod room_manager;
pub mod state;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::trace::TraceLayer;

use codeduel_core::net::messages::ServerMessage;

use broadcast::encode_frame;
use config::ServerConfig;
use coordinator::Collaborators;
use hint::HttpHintProvider;
use judge::PistonJudge;
use problems::ProblemCatalog;
use registry::SessionBinding;
use state::AppState;

/// Build the Axum router and application state from a config, wiring the
/// HTTP judge and hint services it names.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let collaborators = Collaborators {
        judge: Arc::new(PistonJudge::new(&config.judge)),
        hints: Arc::new(HttpHintProvider::new(&config.hint)),
        problems: load_problems(&config),
    };
    build_app_with(config, collaborators)
}

/// Build the router around caller-supplied collaborators.
pub fn build_app_with(config: ServerConfig, collaborators: Collaborators) -> (Router<()>, AppState) {
    let state = AppState::new(config, collaborators);

    let app = Router::new()
        .route("/ws", axum::routing::get(ws::ws_handler))
        .route("/health", axum::routing::get(health::health_check))
        .route("/ready", axum::routing::get(health::readiness_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

fn load_problems(config: &ServerConfig) -> ProblemCatalog {
    let Some(path) = config.problems_file.as_deref() else {
        return ProblemCatalog::builtin();
    };
    match ProblemCatalog::from_file(path) {
        Ok(catalog) => {
            tracing::info!(path, problems = catalog.len(), "Loaded problem catalog");
            catalog
        },
        Err(e) => {
            tracing::warn!(path, error = %e, "Failed to load problems, using built-in set");
            ProblemCatalog::builtin()
        },
    }
}

/// Background task that periodically expires stale queue entries and idle rooms.
pub fn spawn_maintenance(state: AppState) {
    let period = Duration::from_secs(state.config.rooms.idle_check_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweep(&state).await;
        }
    });
}

/// One maintenance pass. Expired waiters get `matchmaking:expired` and idle
/// rooms are closed; the connections involved return to idle.
pub async fn sweep(state: &AppState) {
    let ttl = Duration::from_secs(state.config.matchmaking.queue_ttl_secs);
    let expired = state.queue.lock().await.expire(ttl);
    if !expired.is_empty() {
        let frame = encode_frame(&ServerMessage::MatchmakingExpired);
        let mut registry = state.registry.write().await;
        for entry in &expired {
            if registry.release(entry.connection_id, &SessionBinding::Queued)
                && let Some(frame) = frame.clone()
            {
                registry.send_to(entry.connection_id, frame);
            }
        }
        tracing::info!(count = expired.len(), "Expired matchmaking entries");
    }

    let max_idle = Duration::from_secs(state.config.rooms.idle_timeout_secs);
    let closed = state.rooms.write().await.cleanup_idle_rooms(max_idle);
    if !closed.is_empty() {
        let mut registry = state.registry.write().await;
        for room in &closed {
            let binding = SessionBinding::InRoom(room.room_id.clone());
            for &id in &room.occupants {
                registry.release(id, &binding);
            }
            tracing::info!(room_id = %room.room_id, "Closed idle room");
        }
    }
}
