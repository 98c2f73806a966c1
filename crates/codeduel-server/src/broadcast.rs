use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;

use codeduel_core::net::messages::ServerMessage;
use codeduel_core::net::protocol::encode_server_message;
use codeduel_core::player::ConnectionId;

use crate::registry::PlayerSender;

/// How long a terminal frame waits for room in a slow client's buffer.
pub const TERMINAL_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Encode a message once so it can be cloned cheaply into every recipient's channel.
pub fn encode_frame(msg: &ServerMessage) -> Option<Bytes> {
    match encode_server_message(msg) {
        Ok(text) => Some(Bytes::from(text)),
        Err(e) => {
            tracing::error!(
                event = msg.message_type().as_event(),
                error = %e,
                "Failed to encode server message"
            );
            None
        },
    }
}

struct Member {
    connection_id: ConnectionId,
    /// `None` while the seat's connection is gone.
    sender: Option<PlayerSender>,
}

/// Fan-out channel for one battle, indexed by seat.
///
/// Only the battle's actor holds it, so every member sees messages in the
/// order the actor produced them. State frames that do not fit a slow
/// client's buffer are dropped, since the next snapshot supersedes them.
/// Match and game-over notices have no successor and wait up to
/// [`TERMINAL_SEND_TIMEOUT`] instead.
pub struct SessionChannel {
    session_id: String,
    members: [Member; 2],
}

impl SessionChannel {
    pub fn new(session_id: String, seats: [(ConnectionId, PlayerSender); 2]) -> Self {
        let [(a_id, a_tx), (b_id, b_tx)] = seats;
        Self {
            session_id,
            members: [
                Member {
                    connection_id: a_id,
                    sender: Some(a_tx),
                },
                Member {
                    connection_id: b_id,
                    sender: Some(b_tx),
                },
            ],
        }
    }

    /// Send to every attached member.
    pub fn broadcast(&self, msg: &ServerMessage) {
        let Some(bytes) = encode_frame(msg) else {
            return;
        };
        for seat in 0..self.members.len() {
            self.push(seat, bytes.clone());
        }
    }

    /// Send to one seat only.
    pub fn send_to_seat(&self, seat: usize, msg: &ServerMessage) {
        if let Some(bytes) = encode_frame(msg) {
            self.push(seat, bytes);
        }
    }

    /// Send to every attached member, waiting for buffer space.
    pub async fn broadcast_terminal(&self, msg: &ServerMessage) {
        let Some(bytes) = encode_frame(msg) else {
            return;
        };
        join_all((0..self.members.len()).map(|seat| self.deliver(seat, bytes.clone()))).await;
    }

    /// Send to one seat, waiting for buffer space.
    pub async fn send_to_seat_terminal(&self, seat: usize, msg: &ServerMessage) {
        if let Some(bytes) = encode_frame(msg) {
            self.deliver(seat, bytes).await;
        }
    }

    async fn deliver(&self, seat: usize, bytes: Bytes) {
        let member = &self.members[seat];
        if let Some(ref sender) = member.sender
            && let Err(e) = sender.send_timeout(bytes, TERMINAL_SEND_TIMEOUT).await
        {
            tracing::debug!(
                battle_id = %self.session_id,
                connection_id = member.connection_id,
                error = %e,
                "Gave up on terminal message to slow client"
            );
        }
    }

    fn push(&self, seat: usize, bytes: Bytes) {
        let member = &self.members[seat];
        if let Some(ref sender) = member.sender
            && let Err(e) = sender.try_send(bytes)
        {
            tracing::debug!(
                battle_id = %self.session_id,
                connection_id = member.connection_id,
                error = %e,
                "Skipping battle message to slow client"
            );
        }
    }

    pub fn detach(&mut self, seat: usize) {
        self.members[seat].sender = None;
    }

    pub fn attach(&mut self, seat: usize, connection_id: ConnectionId, sender: PlayerSender) {
        self.members[seat] = Member {
            connection_id,
            sender: Some(sender),
        };
    }

    pub fn is_attached(&self, seat: usize) -> bool {
        self.members[seat].sender.is_some()
    }

    pub fn attached_count(&self) -> usize {
        self.members.iter().filter(|m| m.sender.is_some()).count()
    }
}
