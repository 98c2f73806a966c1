use codeduel_core::battle::BattleError;

/// Failure talking to the judge or hint service. Never fatal to a battle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("service timed out")]
    Timeout,
    #[error("service returned HTTP {0}")]
    Status(u16),
    #[error("invalid service response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

/// Coarse error class, used for logging and wire routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Capacity,
    Collaborator,
}

/// Every failure a lobby or battle operation reports back to its sender.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DuelError {
    #[error("Invalid player name")]
    InvalidName,
    #[error("Invalid room id")]
    InvalidRoomId,
    #[error("Password too long")]
    InvalidPassword,
    #[error("Wrong room password")]
    WrongPassword,
    #[error("{0}")]
    Busy(&'static str),
    #[error("Submission exceeds {0} bytes")]
    CodeTooLarge(usize),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Room not found")]
    RoomNotFound,
    #[error("Not an occupant of this room")]
    NotInRoom,
    #[error("Session not found or expired")]
    SessionNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Room already started a battle")]
    RoomInBattle,
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("Battle state rejected: {0}")]
    Battle(#[from] BattleError),
}

impl DuelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName
            | Self::InvalidRoomId
            | Self::InvalidPassword
            | Self::WrongPassword
            | Self::Busy(_)
            | Self::CodeTooLarge(_)
            | Self::UnsupportedLanguage(_)
            | Self::NotInRoom
            | Self::Battle(_) => ErrorKind::Validation,
            Self::RoomNotFound | Self::SessionNotFound => ErrorKind::NotFound,
            Self::RoomFull | Self::RoomInBattle => ErrorKind::Capacity,
            Self::Collaborator(_) => ErrorKind::Collaborator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(DuelError::InvalidRoomId.kind(), ErrorKind::Validation);
        assert_eq!(DuelError::RoomNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(DuelError::RoomFull.kind(), ErrorKind::Capacity);
        assert_eq!(
            DuelError::from(CollaboratorError::Timeout).kind(),
            ErrorKind::Collaborator
        );
    }

    #[test]
    fn messages_are_client_presentable() {
        assert_eq!(DuelError::RoomFull.to_string(), "Room is full");
        assert_eq!(
            DuelError::from(CollaboratorError::Status(502)).to_string(),
            "service returned HTTP 502"
        );
    }
}
