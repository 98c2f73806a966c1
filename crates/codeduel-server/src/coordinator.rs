use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use uuid::Uuid;

use codeduel_core::battle::{BattleId, BattleState, new_battle_id};
use codeduel_core::player::ConnectionId;
use codeduel_core::room::RoomId;

use crate::battle_loop::{
    BattleCommand, BattleOrigin, BattleOutcome, BattleSessionConfig, spawn_battle_session,
};
use crate::config::ServerConfig;
use crate::error::DuelError;
use crate::hint::HintProvider;
use crate::judge::Judge;
use crate::problems::ProblemCatalog;
use crate::registry::{PlayerSender, SessionBinding, SharedRegistry};
use crate::room_manager::{Occupant, SharedRoomManager};

/// One side of a freshly formed pair.
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub name: String,
    pub sender: PlayerSender,
}

impl From<Occupant> for Participant {
    fn from(o: Occupant) -> Self {
        Self {
            connection_id: o.connection_id,
            name: o.name,
            sender: o.sender,
        }
    }
}

struct BattleHandle {
    commands: mpsc::UnboundedSender<BattleCommand>,
    /// Room to destroy once the battle ends.
    origin_room: Option<RoomId>,
}

/// External services a battle talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub judge: Arc<dyn Judge>,
    pub hints: Arc<dyn HintProvider>,
    pub problems: ProblemCatalog,
}

/// Owns every running battle. Battle state itself lives in each battle's
/// actor; this table only routes commands and cleans up afterwards.
pub struct BattleCoordinator {
    battles: RwLock<HashMap<BattleId, BattleHandle>>,
    /// session token -> (battle, seat)
    sessions: RwLock<HashMap<String, (BattleId, usize)>>,
    registry: SharedRegistry,
    rooms: SharedRoomManager,
    collaborators: Collaborators,
    config: Arc<ServerConfig>,
}

impl BattleCoordinator {
    pub fn new(
        registry: SharedRegistry,
        rooms: SharedRoomManager,
        collaborators: Collaborators,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            battles: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            registry,
            rooms,
            collaborators,
            config,
        }
    }

    /// Build a battle over a pair with a randomly chosen problem and start it.
    pub async fn start_battle(
        self: &Arc<Self>,
        pair: [Participant; 2],
        origin: BattleOrigin,
        origin_room: Option<RoomId>,
    ) -> Result<BattleId, DuelError> {
        let [a, b] = pair;
        let state = BattleState::new(
            new_battle_id(),
            self.collaborators.problems.pick(),
            [(a.connection_id, a.name), (b.connection_id, b.name)],
        )?;
        let battle_id = state.battle_id.clone();
        self.add_battle(state, [a.sender, b.sender], origin, origin_room)
            .await;
        Ok(battle_id)
    }

    /// Register a battle, bind both connections to it and spawn its actor.
    /// A participant that vanished before binding is reported to the actor
    /// as having left, so the usual forfeit rules apply.
    pub async fn add_battle(
        self: &Arc<Self>,
        state: BattleState,
        senders: [PlayerSender; 2],
        origin: BattleOrigin,
        origin_room: Option<RoomId>,
    ) {
        let battle_id = state.battle_id.clone();
        let connections = [state.players[0].connection_id, state.players[1].connection_id];
        let session_tokens = [Uuid::new_v4().to_string(), Uuid::new_v4().to_string()];

        let (commands, actor) = spawn_battle_session(BattleSessionConfig {
            state,
            origin,
            senders,
            session_tokens: session_tokens.clone(),
            judge: Arc::clone(&self.collaborators.judge),
            hints: Arc::clone(&self.collaborators.hints),
            config: Arc::clone(&self.config),
        });

        self.battles.write().await.insert(
            battle_id.clone(),
            BattleHandle {
                commands: commands.clone(),
                origin_room,
            },
        );
        {
            let mut sessions = self.sessions.write().await;
            for (seat, token) in session_tokens.into_iter().enumerate() {
                sessions.insert(token, (battle_id.clone(), seat));
            }
        }

        let mut missing = Vec::new();
        {
            let mut registry = self.registry.write().await;
            for &id in &connections {
                if !registry.set_binding(id, SessionBinding::InBattle(battle_id.clone())) {
                    missing.push(id);
                }
            }
        }

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = actor.await;
            coordinator.teardown(outcome).await;
        });

        for connection_id in missing {
            tracing::info!(%battle_id, connection_id, "Participant left before battle start");
            let _ = commands.send(BattleCommand::PlayerLeft { connection_id });
        }
    }

    /// Route a command to a battle's actor. Returns false if the battle is gone.
    pub async fn send_command(&self, battle_id: &str, cmd: BattleCommand) -> bool {
        let battles = self.battles.read().await;
        match battles.get(battle_id) {
            Some(handle) => handle.commands.send(cmd).is_ok(),
            None => false,
        }
    }

    /// Reclaim a disconnected seat from an idle connection.
    pub async fn rejoin(
        &self,
        connection_id: ConnectionId,
        session_token: &str,
        sender: PlayerSender,
    ) -> Result<BattleId, DuelError> {
        let (battle_id, seat) = self
            .sessions
            .read()
            .await
            .get(session_token)
            .cloned()
            .ok_or(DuelError::SessionNotFound)?;
        let commands = self
            .battles
            .read()
            .await
            .get(&battle_id)
            .map(|h| h.commands.clone())
            .ok_or(DuelError::SessionNotFound)?;

        let binding = SessionBinding::InBattle(battle_id.clone());
        self.registry
            .write()
            .await
            .bind_if_idle(connection_id, binding.clone())?;

        let (reply, response) = oneshot::channel();
        let accepted = match commands.send(BattleCommand::Rejoin {
            seat,
            connection_id,
            sender,
            reply,
        }) {
            Ok(()) => match response.await {
                Ok(result) => result,
                Err(_) => Err(DuelError::SessionNotFound),
            },
            Err(_) => Err(DuelError::SessionNotFound),
        };

        if let Err(e) = accepted {
            self.registry.write().await.release(connection_id, &binding);
            return Err(e);
        }
        Ok(battle_id)
    }

    /// Remove a finished battle from every table and free its connections,
    /// then send `battle:gameOver`. A player who re-queues on seeing it is
    /// already idle.
    async fn teardown(&self, outcome: BattleOutcome) {
        let battle_id = outcome.state.battle_id.clone();
        self.sessions
            .write()
            .await
            .retain(|_, (b, _)| *b != battle_id);

        {
            let binding = SessionBinding::InBattle(battle_id.clone());
            let mut registry = self.registry.write().await;
            for player in &outcome.state.players {
                registry.release(player.connection_id, &binding);
            }
        }

        let handle = self.battles.write().await.remove(&battle_id);
        if let Some(room_id) = handle.and_then(|h| h.origin_room) {
            self.rooms.write().await.remove_room(&room_id);
        }
        outcome.announce().await;
        tracing::info!(
            %battle_id,
            reason = ?outcome.reason,
            winner = outcome.winner,
            "Battle torn down"
        );
    }

    pub async fn active_battles(&self) -> usize {
        self.battles.read().await.len()
    }

    pub fn problem_count(&self) -> usize {
        self.collaborators.problems.len()
    }
}
