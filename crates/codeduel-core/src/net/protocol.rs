use serde::Serialize;
use serde::de::DeserializeOwned;

use super::messages::{
    ClientMessage, CreateRoomMsg, EmojiMsg, ErrorMsg, GameOverMsg, GetHintMsg, HintErrorMsg,
    HintResultMsg, JoinRoomMsg, MatchFoundMsg, MessageType, NameUpdatedMsg, QueuedMsg, RejoinMsg,
    RoomClosedMsg, RoomCreatedMsg, RoomJoinFailedMsg, RoomUpdatedMsg, RunCodeMsg, RunErrorMsg,
    SendEmojiMsg, ServerMessage, StartBattleMsg, StateUpdateMsg, UpdateNameMsg,
};

/// Maximum encoded frame size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    EmptyMessage,
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("event not accepted in this direction: {0}")]
    UnexpectedEvent(&'static str),
    #[error("payload too large: {0} bytes (max {max})", max = MAX_MESSAGE_SIZE)]
    PayloadTooLarge(usize),
    #[error("serialize error: {0}")]
    SerializeError(String),
    #[error("deserialize error: {0}")]
    DeserializeError(String),
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a, T: Serialize> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
}

#[derive(serde::Deserialize)]
struct IncomingEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn finish(json: String) -> Result<String, ProtocolError> {
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(json.len()));
    }
    Ok(json)
}

/// Encode `{"event": ..., "data": payload}`.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<String, ProtocolError> {
    let envelope = OutgoingEnvelope {
        event: msg_type.as_event(),
        data: Some(payload),
    };
    let json = serde_json::to_string(&envelope)
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    finish(json)
}

/// Encode a payload-less event as `{"event": ...}`.
pub fn encode_event(msg_type: MessageType) -> Result<String, ProtocolError> {
    let envelope: OutgoingEnvelope<'_, ()> = OutgoingEnvelope {
        event: msg_type.as_event(),
        data: None,
    };
    let json = serde_json::to_string(&envelope)
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    finish(json)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, ProtocolError> {
    let t = msg.message_type();
    match msg {
        ClientMessage::UpdateName(m) => encode_message(t, m),
        ClientMessage::JoinMatchmaking | ClientMessage::LeaveMatchmaking => encode_event(t),
        ClientMessage::CreateRoom(m) => encode_message(t, m),
        ClientMessage::JoinRoom(m) => encode_message(t, m),
        ClientMessage::StartBattle(m) => encode_message(t, m),
        ClientMessage::RunCode(m) => encode_message(t, m),
        ClientMessage::GetHint(m) => encode_message(t, m),
        ClientMessage::SendEmoji(m) => encode_message(t, m),
        ClientMessage::Rejoin(m) => encode_message(t, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, ProtocolError> {
    let t = msg.message_type();
    match msg {
        ServerMessage::NameUpdated(m) => encode_message(t, m),
        ServerMessage::MatchmakingQueued(m) => encode_message(t, m),
        ServerMessage::MatchmakingSuccess(m) | ServerMessage::RoomMatchFound(m) => {
            encode_message(t, m.as_ref())
        },
        ServerMessage::MatchmakingExpired => encode_event(t),
        ServerMessage::RoomCreated(m) => encode_message(t, m),
        ServerMessage::RoomUpdated(m) => encode_message(t, m),
        ServerMessage::RoomJoinFailed(m) => encode_message(t, m),
        ServerMessage::RoomClosed(m) => encode_message(t, m),
        ServerMessage::StateUpdate(m) => encode_message(t, m.as_ref()),
        ServerMessage::GameOver(m) => encode_message(t, m),
        ServerMessage::RunError(m) => encode_message(t, m),
        ServerMessage::HintResult(m) => encode_message(t, m),
        ServerMessage::HintError(m) => encode_message(t, m),
        ServerMessage::EmojiReceive(m) => encode_message(t, m),
        ServerMessage::Error(m) => encode_message(t, m),
    }
}

/// Split raw wire text into its event type and (possibly null) payload.
pub fn decode_envelope(text: &str) -> Result<(MessageType, serde_json::Value), ProtocolError> {
    if text.trim().is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(text.len()));
    }
    let envelope: IncomingEnvelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializeError(e.to_string()))?;
    let msg_type = MessageType::from_event(&envelope.event)
        .ok_or(ProtocolError::UnknownEvent(envelope.event))?;
    Ok((msg_type, envelope.data))
}

/// Deserialize an envelope payload. A missing payload decodes as an empty
/// object so all-default payload structs accept `{"event": ...}` alone.
pub fn decode_payload<T: DeserializeOwned>(data: serde_json::Value) -> Result<T, ProtocolError> {
    let data = if data.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire text into a `ClientMessage`.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let (msg_type, data) = decode_envelope(text)?;
    match msg_type {
        MessageType::UpdateName => Ok(ClientMessage::UpdateName(decode_payload::<
            UpdateNameMsg,
        >(data)?)),
        MessageType::JoinMatchmaking => Ok(ClientMessage::JoinMatchmaking),
        MessageType::LeaveMatchmaking => Ok(ClientMessage::LeaveMatchmaking),
        MessageType::CreateRoom => Ok(ClientMessage::CreateRoom(decode_payload::<
            CreateRoomMsg,
        >(data)?)),
        MessageType::JoinRoom => Ok(ClientMessage::JoinRoom(decode_payload::<JoinRoomMsg>(
            data,
        )?)),
        MessageType::StartBattle => Ok(ClientMessage::StartBattle(decode_payload::<
            StartBattleMsg,
        >(data)?)),
        MessageType::RunCode => Ok(ClientMessage::RunCode(decode_payload::<RunCodeMsg>(
            data,
        )?)),
        MessageType::GetHint => Ok(ClientMessage::GetHint(decode_payload::<GetHintMsg>(
            data,
        )?)),
        MessageType::SendEmoji => Ok(ClientMessage::SendEmoji(decode_payload::<SendEmojiMsg>(
            data,
        )?)),
        MessageType::Rejoin => Ok(ClientMessage::Rejoin(decode_payload::<RejoinMsg>(data)?)),
        other => Err(ProtocolError::UnexpectedEvent(other.as_event())),
    }
}

/// Decode raw wire text into a `ServerMessage`.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    let (msg_type, data) = decode_envelope(text)?;
    match msg_type {
        MessageType::NameUpdated => Ok(ServerMessage::NameUpdated(decode_payload::<
            NameUpdatedMsg,
        >(data)?)),
        MessageType::MatchmakingQueued => Ok(ServerMessage::MatchmakingQueued(decode_payload::<
            QueuedMsg,
        >(data)?)),
        MessageType::MatchmakingSuccess => Ok(ServerMessage::MatchmakingSuccess(Box::new(
            decode_payload::<MatchFoundMsg>(data)?,
        ))),
        MessageType::MatchmakingExpired => Ok(ServerMessage::MatchmakingExpired),
        MessageType::RoomCreated => Ok(ServerMessage::RoomCreated(decode_payload::<
            RoomCreatedMsg,
        >(data)?)),
        MessageType::RoomUpdated => Ok(ServerMessage::RoomUpdated(decode_payload::<
            RoomUpdatedMsg,
        >(data)?)),
        MessageType::RoomJoinFailed => Ok(ServerMessage::RoomJoinFailed(decode_payload::<
            RoomJoinFailedMsg,
        >(data)?)),
        MessageType::RoomMatchFound => Ok(ServerMessage::RoomMatchFound(Box::new(
            decode_payload::<MatchFoundMsg>(data)?,
        ))),
        MessageType::RoomClosed => Ok(ServerMessage::RoomClosed(decode_payload::<
            RoomClosedMsg,
        >(data)?)),
        MessageType::StateUpdate => Ok(ServerMessage::StateUpdate(Box::new(decode_payload::<
            StateUpdateMsg,
        >(data)?))),
        MessageType::GameOver => Ok(ServerMessage::GameOver(decode_payload::<GameOverMsg>(
            data,
        )?)),
        MessageType::RunError => Ok(ServerMessage::RunError(decode_payload::<RunErrorMsg>(
            data,
        )?)),
        MessageType::HintResult => Ok(ServerMessage::HintResult(decode_payload::<
            HintResultMsg,
        >(data)?)),
        MessageType::HintError => Ok(ServerMessage::HintError(decode_payload::<HintErrorMsg>(
            data,
        )?)),
        MessageType::EmojiReceive => Ok(ServerMessage::EmojiReceive(decode_payload::<EmojiMsg>(
            data,
        )?)),
        MessageType::Error => Ok(ServerMessage::Error(decode_payload::<ErrorMsg>(data)?)),
        other => Err(ProtocolError::UnexpectedEvent(other.as_event())),
    }
}
