use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Rank, Square, EMPTY};
use std::str::FromStr;

use crate::models::chess::{ChessGameState, PlayerColor, PromotionPiece, AWAITING_OPPONENT_TEXT};
use crate::models::game_session::GameSession;
use crate::services::errors::chess_service_errors::ChessServiceError;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub fen: String,
    /// Standard algebraic notation, e.g. `Nf3`, `exd5`, `O-O`, `Qh4#`.
    pub notation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Legal(AppliedMove),
    Illegal,
}

/// Position evaluation and move legality. A legal `attempt_move` also
/// advances the engine's own position.
#[cfg_attr(test, automock)]
pub trait MoveEngine: Send {
    fn load_position(&mut self, fen: &str) -> Result<(), ChessServiceError>;
    fn attempt_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> MoveOutcome;
    fn is_checkmate(&self) -> bool;
    fn is_draw(&self) -> bool;
    fn is_in_check(&self) -> bool;
    fn current_turn_color(&self) -> PlayerColor;
    fn fen(&self) -> String;
}

/// `MoveEngine` over the `chess` crate. The crate's board does not carry
/// the move clocks, so they are tracked here.
#[derive(Debug, Clone)]
pub struct ChessEngine {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
}

impl Default for ChessEngine {
    fn default() -> Self {
        ChessEngine {
            board: Board::default(),
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }
}

fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

fn file_char(square: Square) -> char {
    (b'a' + square.get_file().to_index() as u8) as char
}

fn rank_char(square: Square) -> char {
    (b'1' + square.get_rank().to_index() as u8) as char
}

fn promotion_piece(promotion: PromotionPiece) -> Piece {
    match promotion {
        PromotionPiece::Queen => Piece::Queen,
        PromotionPiece::Rook => Piece::Rook,
        PromotionPiece::Bishop => Piece::Bishop,
        PromotionPiece::Knight => Piece::Knight,
    }
}

impl ChessEngine {
    pub fn new() -> Self {
        ChessEngine::default()
    }

    fn is_capture(&self, chess_move: ChessMove) -> bool {
        let source = chess_move.get_source();
        let dest = chess_move.get_dest();
        self.board.piece_on(dest).is_some()
            || (self.board.piece_on(source) == Some(Piece::Pawn)
                && source.get_file() != dest.get_file())
    }

    fn disambiguation(&self, chess_move: ChessMove, piece: Piece) -> String {
        let source = chess_move.get_source();
        let rivals: Vec<Square> = MoveGen::new_legal(&self.board)
            .filter(|m| {
                m.get_dest() == chess_move.get_dest()
                    && m.get_source() != source
                    && self.board.piece_on(m.get_source()) == Some(piece)
            })
            .map(|m| m.get_source())
            .collect();

        if rivals.is_empty() {
            String::new()
        } else if rivals.iter().all(|s| s.get_file() != source.get_file()) {
            file_char(source).to_string()
        } else if rivals.iter().all(|s| s.get_rank() != source.get_rank()) {
            rank_char(source).to_string()
        } else {
            source.to_string()
        }
    }

    /// Notation for a legal move from the current position.
    fn san(&self, chess_move: ChessMove) -> String {
        let source = chess_move.get_source();
        let dest = chess_move.get_dest();
        let piece = self.board.piece_on(source).unwrap_or(Piece::Pawn);
        let file_distance = source.get_file().to_index().abs_diff(dest.get_file().to_index());

        let mut notation = if piece == Piece::King && file_distance == 2 {
            if dest.get_file().to_index() > source.get_file().to_index() {
                "O-O".to_string()
            } else {
                "O-O-O".to_string()
            }
        } else if piece == Piece::Pawn {
            let mut text = String::new();
            if self.is_capture(chess_move) {
                text.push(file_char(source));
                text.push('x');
            }
            text.push_str(&dest.to_string());
            if let Some(promoted) = chess_move.get_promotion() {
                text.push('=');
                text.push(piece_letter(promoted));
            }
            text
        } else {
            let mut text = String::new();
            text.push(piece_letter(piece));
            text.push_str(&self.disambiguation(chess_move, piece));
            if self.is_capture(chess_move) {
                text.push('x');
            }
            text.push_str(&dest.to_string());
            text
        };

        let after = self.board.make_move_new(chess_move);
        if after.status() == BoardStatus::Checkmate {
            notation.push('#');
        } else if *after.checkers() != EMPTY {
            notation.push('+');
        }
        notation
    }

    fn insufficient_material(&self) -> bool {
        match self.board.combined().popcnt() {
            2 => true,
            3 => {
                let minors =
                    *self.board.pieces(Piece::Knight) | *self.board.pieces(Piece::Bishop);
                minors.popcnt() == 1
            }
            _ => false,
        }
    }
}

impl MoveEngine for ChessEngine {
    fn load_position(&mut self, fen: &str) -> Result<(), ChessServiceError> {
        let board = Board::from_str(fen)
            .map_err(|e| ChessServiceError::InvalidPosition(format!("Invalid FEN: {}", e)))?;
        let fields: Vec<&str> = fen.split_whitespace().collect();

        self.board = board;
        self.halfmove_clock = fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(0);
        self.fullmove_number = fields
            .get(5)
            .and_then(|f| f.parse().ok())
            .unwrap_or(1)
            .max(1);
        Ok(())
    }

    fn attempt_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> MoveOutcome {
        let (Ok(source), Ok(dest)) = (Square::from_str(from), Square::from_str(to)) else {
            return MoveOutcome::Illegal;
        };
        let Some(piece) = self.board.piece_on(source) else {
            return MoveOutcome::Illegal;
        };

        let reaches_last_rank = dest.get_rank() == Rank::Eighth || dest.get_rank() == Rank::First;
        let promotion = if piece == Piece::Pawn && reaches_last_rank {
            Some(promotion_piece(promotion.unwrap_or(PromotionPiece::Queen)))
        } else {
            None
        };

        let chess_move = ChessMove::new(source, dest, promotion);
        if !MoveGen::new_legal(&self.board).any(|m| m == chess_move) {
            return MoveOutcome::Illegal;
        }

        let notation = self.san(chess_move);
        let resets_clock = piece == Piece::Pawn || self.is_capture(chess_move);
        let mover = self.board.side_to_move();

        self.board = self.board.make_move_new(chess_move);
        self.halfmove_clock = if resets_clock {
            0
        } else {
            self.halfmove_clock + 1
        };
        if mover == Color::Black {
            self.fullmove_number += 1;
        }

        MoveOutcome::Legal(AppliedMove {
            fen: self.fen(),
            notation,
        })
    }

    fn is_checkmate(&self) -> bool {
        self.board.status() == BoardStatus::Checkmate
    }

    /// Stalemate, bare kings (or a single minor piece) and the fifty-move
    /// rule. Repetition is not tracked.
    fn is_draw(&self) -> bool {
        self.board.status() == BoardStatus::Stalemate
            || self.insufficient_material()
            || self.halfmove_clock >= 100
    }

    fn is_in_check(&self) -> bool {
        *self.board.checkers() != EMPTY
    }

    fn current_turn_color(&self) -> PlayerColor {
        match self.board.side_to_move() {
            Color::White => PlayerColor::White,
            Color::Black => PlayerColor::Black,
        }
    }

    fn fen(&self) -> String {
        let rendered = format!("{}", self.board);
        let fields: Vec<&str> = rendered.split_whitespace().take(4).collect();
        format!(
            "{} {} {}",
            fields.join(" "),
            self.halfmove_clock,
            self.fullmove_number
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionStatus {
    AwaitingOpponent,
    InProgress { to_move: PlayerColor, in_check: bool },
    Checkmate { loser: PlayerColor },
    Draw,
}

impl PositionStatus {
    pub fn is_over(&self) -> bool {
        matches!(
            self,
            PositionStatus::Checkmate { .. } | PositionStatus::Draw
        )
    }

    pub fn status_text(&self) -> String {
        match self {
            PositionStatus::AwaitingOpponent => AWAITING_OPPONENT_TEXT.to_string(),
            PositionStatus::InProgress { to_move, in_check } => {
                let mut text = format!("{} to move.", to_move);
                if *in_check {
                    text.push_str(&format!(" {} is in check.", to_move));
                }
                text
            }
            PositionStatus::Checkmate { loser } => format!("Game over - {} is checkmated.", loser),
            PositionStatus::Draw => "Game over - draw.".to_string(),
        }
    }
}

/// Session-side chess orchestration: seat colours, turn gating and move
/// submission around a `MoveEngine`. Gating is advisory; nothing stops
/// another client from writing out of turn.
pub struct ChessService {
    engine: Box<dyn MoveEngine>,
}

impl ChessService {
    pub fn new(engine: Box<dyn MoveEngine>) -> Self {
        ChessService { engine }
    }

    pub fn with_default_engine() -> Self {
        ChessService::new(Box::new(ChessEngine::new()))
    }

    pub fn player_color(
        game_session: &GameSession<ChessGameState>,
        player_id: &str,
    ) -> Option<PlayerColor> {
        game_session
            .seat_index(player_id)
            .and_then(PlayerColor::for_seat)
    }

    pub fn sync_position(&mut self, state: &ChessGameState) -> Result<(), ChessServiceError> {
        self.engine.load_position(&state.fen)
    }

    pub fn fen(&self) -> String {
        self.engine.fen()
    }

    pub fn position_status(&self, seated_players: usize) -> PositionStatus {
        if self.engine.is_checkmate() {
            PositionStatus::Checkmate {
                loser: self.engine.current_turn_color(),
            }
        } else if self.engine.is_draw() {
            PositionStatus::Draw
        } else if seated_players < 2 {
            PositionStatus::AwaitingOpponent
        } else {
            PositionStatus::InProgress {
                to_move: self.engine.current_turn_color(),
                in_check: self.engine.is_in_check(),
            }
        }
    }

    /// Whether `player_id` may pick up a piece right now.
    pub fn check_can_move(
        &self,
        game_session: &GameSession<ChessGameState>,
        player_id: &str,
    ) -> Result<PlayerColor, ChessServiceError> {
        let color =
            Self::player_color(game_session, player_id).ok_or(ChessServiceError::NotSeated)?;
        match self.position_status(game_session.players.len()) {
            PositionStatus::AwaitingOpponent => Err(ChessServiceError::AwaitingOpponent),
            PositionStatus::Checkmate { .. } | PositionStatus::Draw => {
                Err(ChessServiceError::GameOver)
            }
            PositionStatus::InProgress { to_move, .. } if to_move != color => {
                Err(ChessServiceError::NotYourTurn)
            }
            PositionStatus::InProgress { .. } => Ok(color),
        }
    }

    /// Validates the move against the engine's current position and applies
    /// it there. Rejections leave the engine untouched.
    pub fn validate_and_make_move(
        &mut self,
        game_session: &GameSession<ChessGameState>,
        player_id: &str,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> Result<AppliedMove, ChessServiceError> {
        self.check_can_move(game_session, player_id)?;

        match self.engine.attempt_move(from, to, promotion) {
            MoveOutcome::Legal(applied) => Ok(applied),
            MoveOutcome::Illegal => Err(ChessServiceError::IllegalMove(format!(
                "{} to {}",
                from, to
            ))),
        }
    }
}
