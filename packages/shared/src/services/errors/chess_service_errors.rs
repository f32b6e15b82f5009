#[derive(Debug, Clone, PartialEq)]
pub enum ChessServiceError {
    InvalidPosition(String),
    NotSeated,
    AwaitingOpponent,
    NotYourTurn,
    GameOver,
    IllegalMove(String),
}

impl std::fmt::Display for ChessServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChessServiceError::InvalidPosition(msg) => write!(f, "Invalid position: {}", msg),
            ChessServiceError::NotSeated => write!(f, "You are not playing in this game"),
            ChessServiceError::AwaitingOpponent => write!(f, "Waiting for an opponent"),
            ChessServiceError::NotYourTurn => write!(f, "Not your turn"),
            ChessServiceError::GameOver => write!(f, "Game is already over"),
            ChessServiceError::IllegalMove(msg) => write!(f, "Illegal move: {}", msg),
        }
    }
}

impl std::error::Error for ChessServiceError {}
