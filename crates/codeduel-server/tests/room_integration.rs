#[allow(dead_code)]
mod common;

use std::time::Duration;

use codeduel_core::net::messages::{
    ClientMessage, CreateRoomMsg, JoinRoomMsg, RoomUpdatedMsg, ServerMessage, StartBattleMsg,
};
use codeduel_core::room::is_valid_room_id;
use codeduel_server::config::ServerConfig;
use codeduel_server::sweep;
use common::{TestServer, WsStream, named_player, ws_read, ws_send, ws_try_read};

async fn create_room(stream: &mut WsStream, password: Option<&str>) -> String {
    ws_send(
        stream,
        &ClientMessage::CreateRoom(CreateRoomMsg {
            is_private: password.is_some(),
            password: password.map(String::from),
        }),
    )
    .await;
    let room_id = match ws_read(stream).await {
        ServerMessage::RoomCreated(m) => m.room_id,
        other => panic!("Expected RoomCreated, got: {other:?}"),
    };
    let update = expect_update(stream).await;
    assert_eq!(update.players.len(), 1);
    assert!(update.players[0].is_host);
    room_id
}

async fn join_room(stream: &mut WsStream, room_id: &str, password: Option<&str>) {
    ws_send(
        stream,
        &ClientMessage::JoinRoom(JoinRoomMsg {
            room_id: room_id.to_string(),
            password: password.map(String::from),
        }),
    )
    .await;
}

async fn expect_update(stream: &mut WsStream) -> RoomUpdatedMsg {
    match ws_read(stream).await {
        ServerMessage::RoomUpdated(m) => m,
        other => panic!("Expected RoomUpdated, got: {other:?}"),
    }
}

async fn expect_join_failed(stream: &mut WsStream) -> String {
    match ws_read(stream).await {
        ServerMessage::RoomJoinFailed(m) => m.error,
        other => panic!("Expected RoomJoinFailed, got: {other:?}"),
    }
}

#[tokio::test]
async fn create_and_join_room() {
    let server = TestServer::new().await;
    let mut host = named_player(&server, "Ada").await;
    let mut guest = named_player(&server, "Grace").await;

    let room_id = create_room(&mut host, None).await;
    assert!(is_valid_room_id(&room_id));

    // Lower-case ids are accepted.
    join_room(&mut guest, &room_id.to_ascii_lowercase(), None).await;
    for stream in [&mut host, &mut guest] {
        let update = expect_update(stream).await;
        assert_eq!(update.room_id, room_id);
        let names: Vec<_> = update.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Ada", "Grace"]);
        assert!(update.players[0].is_host);
        assert!(!update.players[1].is_host);
    }
}

#[tokio::test]
async fn rejoining_same_room_is_idempotent() {
    let server = TestServer::new().await;
    let mut host = named_player(&server, "Ada").await;
    let mut guest = named_player(&server, "Grace").await;
    let room_id = create_room(&mut host, None).await;

    join_room(&mut guest, &room_id, None).await;
    expect_update(&mut guest).await;
    expect_update(&mut host).await;

    join_room(&mut guest, &room_id, None).await;
    let update = expect_update(&mut guest).await;
    assert_eq!(update.players.len(), 2);
    assert!(
        ws_try_read(&mut host, Duration::from_millis(200))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn third_player_gets_room_full() {
    let server = TestServer::new().await;
    let mut host = named_player(&server, "Ada").await;
    let mut guest = named_player(&server, "Grace").await;
    let mut late = named_player(&server, "Linus").await;
    let room_id = create_room(&mut host, None).await;

    join_room(&mut guest, &room_id, None).await;
    expect_update(&mut guest).await;

    join_room(&mut late, &room_id, None).await;
    assert_eq!(expect_join_failed(&mut late).await, "Room is full");
}

#[tokio::test]
async fn private_room_checks_password() {
    let server = TestServer::new().await;
    let mut host = named_player(&server, "Ada").await;
    let mut guest = named_player(&server, "Grace").await;
    let room_id = create_room(&mut host, Some("hunter2")).await;

    join_room(&mut guest, &room_id, Some("wrong")).await;
    assert_eq!(expect_join_failed(&mut guest).await, "Wrong room password");
    join_room(&mut guest, &room_id, None).await;
    assert_eq!(expect_join_failed(&mut guest).await, "Wrong room password");

    join_room(&mut guest, &room_id, Some("hunter2")).await;
    assert_eq!(expect_update(&mut guest).await.players.len(), 2);
}

#[tokio::test]
async fn malformed_and_unknown_room_ids() {
    let server = TestServer::new().await;
    let mut guest = named_player(&server, "Grace").await;

    join_room(&mut guest, "nope", None).await;
    assert_eq!(expect_join_failed(&mut guest).await, "Invalid room id");
    join_room(&mut guest, "ZZZZ-0000", None).await;
    assert_eq!(expect_join_failed(&mut guest).await, "Room not found");
}

#[tokio::test]
async fn host_leaving_promotes_guest() {
    let server = TestServer::new().await;
    let mut host = named_player(&server, "Ada").await;
    let mut guest = named_player(&server, "Grace").await;
    let room_id = create_room(&mut host, None).await;
    join_room(&mut guest, &room_id, None).await;
    expect_update(&mut guest).await;

    drop(host);
    let update = expect_update(&mut guest).await;
    assert_eq!(update.players.len(), 1);
    assert_eq!(update.players[0].name, "Grace");
    assert!(update.players[0].is_host);
}

#[tokio::test]
async fn start_battle_notifies_both_and_consumes_room() {
    let server = TestServer::new().await;
    let mut host = named_player(&server, "Ada").await;
    let mut guest = named_player(&server, "Grace").await;
    let mut late = named_player(&server, "Linus").await;
    let room_id = create_room(&mut host, None).await;

    // Starting alone does nothing.
    ws_send(
        &mut host,
        &ClientMessage::StartBattle(StartBattleMsg {
            room_id: room_id.clone(),
        }),
    )
    .await;
    assert!(
        ws_try_read(&mut host, Duration::from_millis(200))
            .await
            .is_none()
    );

    join_room(&mut guest, &room_id, None).await;
    expect_update(&mut guest).await;
    expect_update(&mut host).await;

    // Any occupant may start.
    ws_send(
        &mut guest,
        &ClientMessage::StartBattle(StartBattleMsg {
            room_id: room_id.clone(),
        }),
    )
    .await;
    for stream in [&mut host, &mut guest] {
        match ws_read(stream).await {
            ServerMessage::RoomMatchFound(found) => {
                assert_eq!(found.state.players[0].name, "Ada");
                assert_eq!(found.state.players[1].name, "Grace");
            },
            other => panic!("Expected RoomMatchFound, got: {other:?}"),
        }
    }

    join_room(&mut late, &room_id, None).await;
    assert_eq!(
        expect_join_failed(&mut late).await,
        "Room already started a battle"
    );
}

#[tokio::test]
async fn outsider_cannot_start_battle() {
    let server = TestServer::new().await;
    let mut host = named_player(&server, "Ada").await;
    let mut outsider = named_player(&server, "Mallory").await;
    let room_id = create_room(&mut host, None).await;

    ws_send(
        &mut outsider,
        &ClientMessage::StartBattle(StartBattleMsg { room_id }),
    )
    .await;
    match ws_read(&mut outsider).await {
        ServerMessage::Error(e) => assert_eq!(e.message, "Not an occupant of this room"),
        other => panic!("Expected Error, got: {other:?}"),
    }
}

#[tokio::test]
async fn occupant_cannot_queue_for_matchmaking() {
    let server = TestServer::new().await;
    let mut host = named_player(&server, "Ada").await;
    create_room(&mut host, None).await;

    ws_send(&mut host, &ClientMessage::JoinMatchmaking).await;
    match ws_read(&mut host).await {
        ServerMessage::Error(e) => assert_eq!(e.message, "Already in a room"),
        other => panic!("Expected Error, got: {other:?}"),
    }
}

#[tokio::test]
async fn idle_room_is_closed_by_sweep() {
    let mut config = ServerConfig::default();
    config.rooms.idle_timeout_secs = 1;
    let server = TestServer::from_config(config).await;
    let mut host = named_player(&server, "Ada").await;
    let room_id = create_room(&mut host, None).await;

    tokio::time::sleep(Duration::from_millis(1100)).await;
    sweep(&server.state).await;
    match ws_read(&mut host).await {
        ServerMessage::RoomClosed(m) => assert_eq!(m.room_id, room_id),
        other => panic!("Expected RoomClosed, got: {other:?}"),
    }

    // The host is free again.
    create_room(&mut host, None).await;
}
