use serde::{Deserialize, Serialize};
use std::fmt;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AWAITING_OPPONENT_TEXT: &str = "Waiting for opponent...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    /// Colours are positional: first seat plays white.
    pub fn for_seat(index: usize) -> Option<Self> {
        match index {
            0 => Some(PlayerColor::White),
            1 => Some(PlayerColor::Black),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerColor::White => write!(f, "White"),
            PlayerColor::Black => write!(f, "Black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionPiece {
    Queen,
    Rook,
    Bishop,
    Knight,
}

/// `gameState` of a chess session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessGameState {
    pub fen: String,
    /// Moves in standard algebraic notation, oldest first.
    #[serde(default)]
    pub history: Vec<String>,
    pub winner: Option<String>,
    #[serde(default)]
    pub status_text: String,
}

impl Default for ChessGameState {
    fn default() -> Self {
        ChessGameState {
            fen: STARTING_FEN.to_string(),
            history: Vec::new(),
            winner: None,
            status_text: AWAITING_OPPONENT_TEXT.to_string(),
        }
    }
}
