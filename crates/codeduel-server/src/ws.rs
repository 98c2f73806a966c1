use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::FromRequest;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use codeduel_core::net::messages::ServerMessage;
use codeduel_core::net::protocol::{MAX_MESSAGE_SIZE, decode_client_message};
use codeduel_core::player::ConnectionId;

use crate::broadcast::encode_frame;
use crate::dispatch::{dispatch, on_disconnect};
use crate::registry::PlayerSender;
use crate::state::{AppState, ConnectionGuard};

pub async fn ws_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    // Perform WebSocket upgrade manually
    let ws = WebSocketUpgrade::from_request(request, &state)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (ws_sender, mut ws_receiver) = socket.split();

    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    let connection_id = state.registry.write().await.register(tx.clone());
    tracing::info!(connection_id, "Connection opened");

    spawn_writer(ws_sender, rx);

    read_loop(&mut ws_receiver, &state, connection_id, &tx).await;

    on_disconnect(&state, connection_id).await;
    tracing::info!(connection_id, "Connection closed");
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            let Ok(text) = String::from_utf8(data.to_vec()) else {
                tracing::warn!("Dropping non-UTF-8 outbound frame");
                continue;
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    connection_id: ConnectionId,
    sender: &PlayerSender,
) {
    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        // Drop oversized messages
        if text.as_str().len() > MAX_MESSAGE_SIZE {
            tracing::debug!(connection_id, len = text.as_str().len(), "Oversized frame dropped");
            continue;
        }

        match decode_client_message(text.as_str()) {
            Ok(client_msg) => dispatch(state, connection_id, sender, client_msg).await,
            Err(e) => {
                tracing::debug!(connection_id, error = %e, "Undecodable frame");
                if let Some(frame) = encode_frame(&ServerMessage::error(e.to_string()))
                    && sender.try_send(frame).is_err()
                {
                    tracing::debug!(connection_id, "Dropping decode error reply");
                }
            },
        }
    }
}
