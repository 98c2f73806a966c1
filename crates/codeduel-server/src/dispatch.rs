use codeduel_core::net::messages::{
    ClientMessage, CreateRoomMsg, JoinRoomMsg, NameUpdatedMsg, QueuedMsg, RoomCreatedMsg,
    RoomJoinFailedMsg, RoomUpdatedMsg, ServerMessage,
};
use codeduel_core::player::ConnectionId;
use codeduel_core::room::{is_valid_room_id, normalize_room_id};

use crate::battle_loop::{BattleCommand, BattleOrigin};
use crate::broadcast::encode_frame;
use crate::coordinator::Participant;
use crate::error::DuelError;
use crate::matchmaking::{MatchmakingQueue, QueueEntry};
use crate::registry::{PlayerSender, SessionBinding, busy_reason};
use crate::room_manager::{JoinOutcome, Occupant};
use crate::state::AppState;

fn send(sender: &PlayerSender, msg: &ServerMessage) {
    if let Some(bytes) = encode_frame(msg)
        && let Err(e) = sender.try_send(bytes)
    {
        tracing::debug!(error = %e, "Dropping reply to slow client");
    }
}

fn send_error(sender: &PlayerSender, connection_id: ConnectionId, error: &DuelError) {
    tracing::debug!(connection_id, kind = ?error.kind(), error = %error, "Request rejected");
    send(sender, &ServerMessage::error(error.to_string()));
}

/// Route one decoded client event to the component that owns it.
pub async fn dispatch(
    state: &AppState,
    connection_id: ConnectionId,
    sender: &PlayerSender,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::UpdateName(m) => update_name(state, connection_id, sender, &m.player_name).await,
        ClientMessage::JoinMatchmaking => join_matchmaking(state, connection_id, sender).await,
        ClientMessage::LeaveMatchmaking => leave_matchmaking(state, connection_id).await,
        ClientMessage::CreateRoom(m) => create_room(state, connection_id, sender, m).await,
        ClientMessage::JoinRoom(m) => join_room(state, connection_id, sender, m).await,
        ClientMessage::StartBattle(m) => {
            start_room_battle(state, connection_id, sender, &m.room_id).await
        },
        ClientMessage::RunCode(m) => {
            to_battle(state, connection_id, BattleCommand::RunCode {
                connection_id,
                code: m.code,
                language: m.language,
            })
            .await
        },
        ClientMessage::GetHint(m) => {
            to_battle(state, connection_id, BattleCommand::GetHint {
                connection_id,
                code: m.code,
            })
            .await
        },
        ClientMessage::SendEmoji(m) => {
            to_battle(state, connection_id, BattleCommand::SendEmoji {
                connection_id,
                emoji: m.emoji,
            })
            .await
        },
        ClientMessage::Rejoin(m) => {
            match state
                .battles
                .rejoin(connection_id, &m.session_token, sender.clone())
                .await
            {
                Ok(battle_id) => tracing::info!(connection_id, %battle_id, "Seat reclaimed"),
                Err(e) => send_error(sender, connection_id, &e),
            }
        },
    }
}

async fn update_name(state: &AppState, connection_id: ConnectionId, sender: &PlayerSender, raw: &str) {
    let result = {
        let mut registry = state.registry.write().await;
        registry
            .set_name(connection_id, raw)
            .map(|name| (name, registry.binding(connection_id)))
    };
    let (name, binding) = match result {
        Ok(r) => r,
        Err(e) => {
            send_error(sender, connection_id, &e);
            return;
        },
    };

    match binding {
        Some(SessionBinding::Queued) => state.queue.lock().await.rename(connection_id, &name),
        Some(SessionBinding::InRoom(room_id)) => {
            let mut rooms = state.rooms.write().await;
            rooms.rename_occupant(&room_id, connection_id, &name);
            rooms.broadcast_room_update(&room_id);
        },
        _ => {},
    }
    send(sender, &ServerMessage::NameUpdated(NameUpdatedMsg { player_name: name }));
}

async fn join_matchmaking(state: &AppState, connection_id: ConnectionId, sender: &PlayerSender) {
    let name = {
        let mut registry = state.registry.write().await;
        if let Err(e) = registry.bind_if_idle(connection_id, SessionBinding::Queued) {
            drop(registry);
            send_error(sender, connection_id, &e);
            return;
        }
        registry.display_name(connection_id).unwrap_or_default()
    };

    let (pair, position) = {
        let mut queue = state.queue.lock().await;
        queue.enqueue(connection_id, name);
        let pair = take_ready_pair(state, &mut queue).await;
        (pair, queue.position(connection_id))
    };

    match pair {
        Some(pair) => start_matched(state, pair).await,
        None => {
            if let Some(position) = position {
                send(sender, &ServerMessage::MatchmakingQueued(QueuedMsg { position }));
            }
        },
    }
}

async fn start_matched(state: &AppState, pair: [Participant; 2]) {
    let ids = [pair[0].connection_id, pair[1].connection_id];
    tracing::info!(a = ids[0], b = ids[1], "Matchmaking paired");
    if let Err(e) = state
        .battles
        .start_battle(pair, BattleOrigin::Matchmaking, None)
        .await
    {
        tracing::error!(error = %e, "Failed to start matchmaking battle");
        release_pair(state, ids, &SessionBinding::Queued).await;
    }
}

/// Free a pair whose battle never started.
async fn release_pair(state: &AppState, ids: [ConnectionId; 2], expected: &SessionBinding) {
    let mut registry = state.registry.write().await;
    for id in ids {
        registry.release(id, expected);
    }
}

/// Pop the two oldest live entries. Entries whose connection has already
/// gone are dropped; a live survivor goes back to the head of the queue.
async fn take_ready_pair(
    state: &AppState,
    queue: &mut MatchmakingQueue,
) -> Option<[Participant; 2]> {
    while let Some([first, second]) = queue.dequeue_pair_if_ready() {
        let registry = state.registry.read().await;
        let resolve = |entry: &QueueEntry| {
            registry.sender(entry.connection_id).map(|sender| Participant {
                connection_id: entry.connection_id,
                name: entry.name.clone(),
                sender,
            })
        };
        match (resolve(&first), resolve(&second)) {
            (Some(a), Some(b)) => return Some([a, b]),
            (Some(_), None) => queue.push_front(first),
            (None, Some(_)) => queue.push_front(second),
            (None, None) => {},
        }
    }
    None
}

async fn leave_matchmaking(state: &AppState, connection_id: ConnectionId) {
    let removed = state.queue.lock().await.remove(connection_id);
    if removed {
        state
            .registry
            .write()
            .await
            .release(connection_id, &SessionBinding::Queued);
        tracing::debug!(connection_id, "Left matchmaking");
    }
}

async fn create_room(
    state: &AppState,
    connection_id: ConnectionId,
    sender: &PlayerSender,
    msg: CreateRoomMsg,
) {
    let result = {
        let mut registry = state.registry.write().await;
        match registry.binding(connection_id) {
            Some(SessionBinding::Idle) => {
                let creator = Occupant {
                    connection_id,
                    name: registry.display_name(connection_id).unwrap_or_default(),
                    sender: sender.clone(),
                };
                let created =
                    state
                        .rooms
                        .write()
                        .await
                        .create_room(creator, msg.is_private, msg.password);
                if let Ok(ref room_id) = created {
                    registry.set_binding(connection_id, SessionBinding::InRoom(room_id.clone()));
                }
                created
            },
            Some(other) => Err(DuelError::Busy(busy_reason(&other))),
            None => Err(DuelError::SessionNotFound),
        }
    };

    match result {
        Ok(room_id) => {
            tracing::info!(connection_id, %room_id, private = msg.is_private, "Room created");
            send(
                sender,
                &ServerMessage::RoomCreated(RoomCreatedMsg {
                    room_id: room_id.clone(),
                }),
            );
            state.rooms.read().await.broadcast_room_update(&room_id);
        },
        Err(e) => send_error(sender, connection_id, &e),
    }
}

async fn join_room(
    state: &AppState,
    connection_id: ConnectionId,
    sender: &PlayerSender,
    msg: JoinRoomMsg,
) {
    let room_id = normalize_room_id(&msg.room_id);
    let result = if !is_valid_room_id(&room_id) {
        Err(DuelError::InvalidRoomId)
    } else {
        let mut registry = state.registry.write().await;
        match registry.binding(connection_id) {
            Some(SessionBinding::Idle) => {
                let occupant = Occupant {
                    connection_id,
                    name: registry.display_name(connection_id).unwrap_or_default(),
                    sender: sender.clone(),
                };
                let joined = state.rooms.write().await.join_room(
                    &room_id,
                    occupant,
                    msg.password.as_deref(),
                );
                if joined.is_ok() {
                    registry.set_binding(connection_id, SessionBinding::InRoom(room_id.clone()));
                }
                joined
            },
            Some(SessionBinding::InRoom(current)) if current == room_id => {
                Ok(JoinOutcome::AlreadyPresent)
            },
            Some(other) => Err(DuelError::Busy(busy_reason(&other))),
            None => Err(DuelError::SessionNotFound),
        }
    };

    match result {
        Ok(JoinOutcome::Joined) => {
            tracing::info!(connection_id, %room_id, "Joined room");
            state.rooms.read().await.broadcast_room_update(&room_id);
        },
        Ok(JoinOutcome::AlreadyPresent) => {
            tracing::debug!(connection_id, %room_id, "Already seated in room");
            let players = state.rooms.read().await.players(&room_id);
            if let Some(players) = players {
                send(sender, &ServerMessage::RoomUpdated(RoomUpdatedMsg { room_id, players }));
            }
        },
        Err(e) => {
            tracing::debug!(connection_id, %room_id, error = %e, "Room join failed");
            send(
                sender,
                &ServerMessage::RoomJoinFailed(RoomJoinFailedMsg {
                    error: e.to_string(),
                }),
            );
        },
    }
}

async fn start_room_battle(
    state: &AppState,
    connection_id: ConnectionId,
    sender: &PlayerSender,
    raw_room_id: &str,
) {
    let room_id = normalize_room_id(raw_room_id);
    let bound = state.registry.read().await.binding(connection_id);
    if bound != Some(SessionBinding::InRoom(room_id.clone())) {
        send_error(sender, connection_id, &DuelError::NotInRoom);
        return;
    }

    let taken = state
        .rooms
        .write()
        .await
        .take_for_battle(&room_id, connection_id);
    match taken {
        Ok(Some(pair)) => {
            let pair = pair.map(Participant::from);
            let ids = [pair[0].connection_id, pair[1].connection_id];
            match state
                .battles
                .start_battle(pair, BattleOrigin::Room, Some(room_id.clone()))
                .await
            {
                Ok(battle_id) => tracing::info!(%room_id, %battle_id, "Room battle started"),
                Err(e) => {
                    tracing::error!(%room_id, error = %e, "Failed to start room battle");
                    release_pair(state, ids, &SessionBinding::InRoom(room_id.clone())).await;
                    state.rooms.write().await.remove_room(&room_id);
                },
            }
        },
        Ok(None) => tracing::debug!(%room_id, "Start ignored, room not full"),
        Err(e) => send_error(sender, connection_id, &e),
    }
}

/// Forward a battle event. Connections not bound to a battle are ignored.
async fn to_battle(state: &AppState, connection_id: ConnectionId, cmd: BattleCommand) {
    let bound = state.registry.read().await.binding(connection_id);
    let Some(SessionBinding::InBattle(battle_id)) = bound else {
        tracing::debug!(connection_id, "Battle event with no battle bound");
        return;
    };
    if !state.battles.send_command(&battle_id, cmd).await {
        tracing::debug!(connection_id, %battle_id, "Battle already finished");
    }
}

/// Release whatever a closed connection was bound to.
pub async fn on_disconnect(state: &AppState, connection_id: ConnectionId) {
    let binding = state.registry.write().await.unregister(connection_id);
    match binding {
        Some(SessionBinding::Queued) => {
            state.queue.lock().await.remove(connection_id);
        },
        Some(SessionBinding::InRoom(room_id)) => {
            let mut rooms = state.rooms.write().await;
            if rooms.leave_room(&room_id, connection_id).is_none() {
                rooms.broadcast_room_update(&room_id);
            }
        },
        Some(SessionBinding::InBattle(battle_id)) => {
            state
                .battles
                .send_command(&battle_id, BattleCommand::PlayerLeft { connection_id })
                .await;
        },
        Some(SessionBinding::Idle) | None => {},
    }
}
