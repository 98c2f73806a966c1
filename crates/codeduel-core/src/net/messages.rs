use serde::{Deserialize, Serialize};

use crate::battle::BattleState;
use crate::player::{ConnectionId, PlayerSummary};
use crate::room::RoomId;

/// Wire event discriminator. The string form is the `event` field of every
/// JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Client -> Server
    UpdateName,
    JoinMatchmaking,
    LeaveMatchmaking,
    CreateRoom,
    JoinRoom,
    StartBattle,
    RunCode,
    GetHint,
    SendEmoji,
    Rejoin,

    // Server -> Client
    NameUpdated,
    MatchmakingQueued,
    MatchmakingSuccess,
    MatchmakingExpired,
    RoomCreated,
    RoomUpdated,
    RoomJoinFailed,
    RoomMatchFound,
    RoomClosed,
    StateUpdate,
    GameOver,
    RunError,
    HintResult,
    HintError,
    EmojiReceive,
    Error,
}

impl MessageType {
    pub const ALL: [MessageType; 26] = [
        Self::UpdateName,
        Self::JoinMatchmaking,
        Self::LeaveMatchmaking,
        Self::CreateRoom,
        Self::JoinRoom,
        Self::StartBattle,
        Self::RunCode,
        Self::GetHint,
        Self::SendEmoji,
        Self::Rejoin,
        Self::NameUpdated,
        Self::MatchmakingQueued,
        Self::MatchmakingSuccess,
        Self::MatchmakingExpired,
        Self::RoomCreated,
        Self::RoomUpdated,
        Self::RoomJoinFailed,
        Self::RoomMatchFound,
        Self::RoomClosed,
        Self::StateUpdate,
        Self::GameOver,
        Self::RunError,
        Self::HintResult,
        Self::HintError,
        Self::EmojiReceive,
        Self::Error,
    ];

    pub fn as_event(self) -> &'static str {
        match self {
            Self::UpdateName => "player:updateName",
            Self::JoinMatchmaking => "matchmaking:join",
            Self::LeaveMatchmaking => "matchmaking:leave",
            Self::CreateRoom => "room:create",
            Self::JoinRoom => "room:join",
            Self::StartBattle => "room:start_battle",
            Self::RunCode => "battle:runCode",
            Self::GetHint => "battle:getHint",
            Self::SendEmoji => "battle:sendEmoji",
            Self::Rejoin => "battle:rejoin",
            Self::NameUpdated => "player:nameUpdated",
            Self::MatchmakingQueued => "matchmaking:queued",
            Self::MatchmakingSuccess => "matchmaking:success",
            Self::MatchmakingExpired => "matchmaking:expired",
            Self::RoomCreated => "room:created",
            Self::RoomUpdated => "room:updated",
            Self::RoomJoinFailed => "room:join_failed",
            Self::RoomMatchFound => "room:match_found",
            Self::RoomClosed => "room:closed",
            Self::StateUpdate => "battle:stateUpdate",
            Self::GameOver => "battle:gameOver",
            Self::RunError => "battle:runError",
            Self::HintResult => "battle:hintResult",
            Self::HintError => "battle:hintError",
            Self::EmojiReceive => "battle:emojiReceive",
            Self::Error => "error",
        }
    }

    pub fn from_event(event: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_event() == event)
    }

    /// True for events a client is allowed to send.
    pub fn is_client_event(self) -> bool {
        matches!(
            self,
            Self::UpdateName
                | Self::JoinMatchmaking
                | Self::LeaveMatchmaking
                | Self::CreateRoom
                | Self::JoinRoom
                | Self::StartBattle
                | Self::RunCode
                | Self::GetHint
                | Self::SendEmoji
                | Self::Rejoin
        )
    }
}

// ---------------------------------------------------------------------------
// Client -> Server payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNameMsg {
    pub player_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRoomMsg {
    pub is_private: bool,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomMsg {
    pub room_id: RoomId,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBattleMsg {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCodeMsg {
    pub code: String,
    /// Language name as sent by the client, resolved by the battle so an
    /// unknown name is reported as a run error.
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetHintMsg {
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmojiMsg {
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejoinMsg {
    pub session_token: String,
}

/// Decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    UpdateName(UpdateNameMsg),
    JoinMatchmaking,
    LeaveMatchmaking,
    CreateRoom(CreateRoomMsg),
    JoinRoom(JoinRoomMsg),
    StartBattle(StartBattleMsg),
    RunCode(RunCodeMsg),
    GetHint(GetHintMsg),
    SendEmoji(SendEmojiMsg),
    Rejoin(RejoinMsg),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::UpdateName(_) => MessageType::UpdateName,
            Self::JoinMatchmaking => MessageType::JoinMatchmaking,
            Self::LeaveMatchmaking => MessageType::LeaveMatchmaking,
            Self::CreateRoom(_) => MessageType::CreateRoom,
            Self::JoinRoom(_) => MessageType::JoinRoom,
            Self::StartBattle(_) => MessageType::StartBattle,
            Self::RunCode(_) => MessageType::RunCode,
            Self::GetHint(_) => MessageType::GetHint,
            Self::SendEmoji(_) => MessageType::SendEmoji,
            Self::Rejoin(_) => MessageType::Rejoin,
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameUpdatedMsg {
    pub player_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMsg {
    /// 1-based position in the matchmaking queue.
    pub position: usize,
}

/// Private match notification. The token lets this seat reclaim the battle
/// from a new connection after a disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundMsg {
    pub state: BattleState,
    pub session_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedMsg {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdatedMsg {
    pub room_id: RoomId,
    pub players: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomJoinFailedMsg {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomClosedMsg {
    pub room_id: RoomId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdateMsg {
    pub state: BattleState,
}

/// Why a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameOverReason {
    /// The winner passed every test case.
    Solved,
    /// The opponent disconnected and did not return within the grace period.
    Forfeit,
    /// Both players left.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverMsg {
    pub winner: Option<String>,
    pub winner_id: Option<ConnectionId>,
    pub reason: GameOverReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunErrorMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintResultMsg {
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintErrorMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiMsg {
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub message: String,
}

/// Outbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    NameUpdated(NameUpdatedMsg),
    MatchmakingQueued(QueuedMsg),
    MatchmakingSuccess(Box<MatchFoundMsg>),
    MatchmakingExpired,
    RoomCreated(RoomCreatedMsg),
    RoomUpdated(RoomUpdatedMsg),
    RoomJoinFailed(RoomJoinFailedMsg),
    RoomMatchFound(Box<MatchFoundMsg>),
    RoomClosed(RoomClosedMsg),
    StateUpdate(Box<StateUpdateMsg>),
    GameOver(GameOverMsg),
    RunError(RunErrorMsg),
    HintResult(HintResultMsg),
    HintError(HintErrorMsg),
    EmojiReceive(EmojiMsg),
    Error(ErrorMsg),
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::NameUpdated(_) => MessageType::NameUpdated,
            Self::MatchmakingQueued(_) => MessageType::MatchmakingQueued,
            Self::MatchmakingSuccess(_) => MessageType::MatchmakingSuccess,
            Self::MatchmakingExpired => MessageType::MatchmakingExpired,
            Self::RoomCreated(_) => MessageType::RoomCreated,
            Self::RoomUpdated(_) => MessageType::RoomUpdated,
            Self::RoomJoinFailed(_) => MessageType::RoomJoinFailed,
            Self::RoomMatchFound(_) => MessageType::RoomMatchFound,
            Self::RoomClosed(_) => MessageType::RoomClosed,
            Self::StateUpdate(_) => MessageType::StateUpdate,
            Self::GameOver(_) => MessageType::GameOver,
            Self::RunError(_) => MessageType::RunError,
            Self::HintResult(_) => MessageType::HintResult,
            Self::HintError(_) => MessageType::HintError,
            Self::EmojiReceive(_) => MessageType::EmojiReceive,
            Self::Error(_) => MessageType::Error,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMsg {
            message: message.into(),
        })
    }

    pub fn state_update(state: BattleState) -> Self {
        Self::StateUpdate(Box::new(StateUpdateMsg { state }))
    }
}
