use crate::repositories::errors::store_errors::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum LobbyServiceError {
    ValidationError(String),
    SessionNotFound(String),
    AlreadyJoined,
    AlreadyStarted,
    SessionFull,
    Store(StoreError),
}

impl std::fmt::Display for LobbyServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobbyServiceError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            LobbyServiceError::SessionNotFound(id) => write!(f, "Game session not found: {}", id),
            LobbyServiceError::AlreadyJoined => write!(f, "Player already joined this session"),
            LobbyServiceError::AlreadyStarted => write!(f, "Game session already started"),
            LobbyServiceError::SessionFull => write!(f, "Game session is full"),
            LobbyServiceError::Store(err) => write!(f, "Store error: {}", err),
        }
    }
}

impl std::error::Error for LobbyServiceError {}

impl From<StoreError> for LobbyServiceError {
    fn from(err: StoreError) -> Self {
        LobbyServiceError::Store(err)
    }
}
