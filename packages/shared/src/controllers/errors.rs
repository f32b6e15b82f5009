use crate::models::game_session::SessionStatus;
use crate::repositories::errors::store_errors::StoreError;
use crate::services::errors::chess_service_errors::ChessServiceError;

/// Local rejection of a player action, or a failed store write. Rejections
/// never reach the store.
#[derive(Debug, Clone, PartialEq)]
pub enum GameActionError {
    SessionNotLoaded,
    NotCreator,
    InvalidPhase {
        expected: SessionStatus,
        actual: SessionStatus,
    },
    NotEnoughPlayers {
        required: usize,
        actual: usize,
    },
    NotYourTurn,
    IllegalMove(String),
    InvalidCard(usize),
    ColorRequired,
    DrawPileEmpty,
    UnknownCategory(String),
    LettersExhausted,
    AlreadyStopped,
    Chess(ChessServiceError),
    Store(StoreError),
}

impl std::fmt::Display for GameActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameActionError::SessionNotLoaded => write!(f, "Game session not loaded yet"),
            GameActionError::NotCreator => write!(f, "Only the session creator can do that"),
            GameActionError::InvalidPhase { expected, actual } => {
                write!(f, "Session is {}, expected {}", actual, expected)
            }
            GameActionError::NotEnoughPlayers { required, actual } => write!(
                f,
                "Need at least {} players, session has {}",
                required, actual
            ),
            GameActionError::NotYourTurn => write!(f, "Not your turn"),
            GameActionError::IllegalMove(msg) => write!(f, "Illegal move: {}", msg),
            GameActionError::InvalidCard(index) => write!(f, "No card at hand position {}", index),
            GameActionError::ColorRequired => write!(f, "A colour must be chosen for a wild card"),
            GameActionError::DrawPileEmpty => write!(f, "Draw pile is empty"),
            GameActionError::UnknownCategory(category) => {
                write!(f, "Unknown category: {}", category)
            }
            GameActionError::LettersExhausted => write!(f, "Every letter has been played"),
            GameActionError::AlreadyStopped => write!(f, "Round already stopped"),
            GameActionError::Chess(err) => write!(f, "{}", err),
            GameActionError::Store(err) => write!(f, "Store error: {}", err),
        }
    }
}

impl std::error::Error for GameActionError {}

impl From<StoreError> for GameActionError {
    fn from(err: StoreError) -> Self {
        GameActionError::Store(err)
    }
}

impl From<ChessServiceError> for GameActionError {
    fn from(err: ChessServiceError) -> Self {
        match err {
            ChessServiceError::NotYourTurn => GameActionError::NotYourTurn,
            ChessServiceError::IllegalMove(msg) => GameActionError::IllegalMove(msg),
            other => GameActionError::Chess(other),
        }
    }
}
