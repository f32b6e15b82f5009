use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::models::document::Document;
use crate::repositories::errors::store_errors::StoreError;

pub const GAME_SESSIONS_COLLECTION: &str = "game_sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Stop,
    Uno,
    Chess,
}

impl GameType {
    pub fn max_players(&self) -> usize {
        match self {
            GameType::Stop => 8,
            GameType::Uno => 10,
            GameType::Chess => 2,
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Stop => write!(f, "stop"),
            GameType::Uno => write!(f, "uno"),
            GameType::Chess => write!(f, "chess"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Playing,
    Validating,
    Finished,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Waiting => write!(f, "waiting"),
            SessionStatus::Playing => write!(f, "playing"),
            SessionStatus::Validating => write!(f, "validating"),
            SessionStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Who is acting on this client. Passed to controllers explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerContext {
    pub user_id: String,
}

impl PlayerContext {
    pub fn new(user_id: &str) -> Self {
        PlayerContext {
            user_id: user_id.to_string(),
        }
    }
}

/// Result of checking whether a user may take a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatCheck {
    Open,
    AlreadySeated,
    Full,
    Closed,
}

/// One shared game instance. `S` is the game-specific state record; the
/// default `Value` decodes any game type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession<S = Value> {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub group_id: String,
    pub game_type: GameType,
    pub status: SessionStatus,
    pub created_by: String,
    pub players: Vec<String>,
    pub max_players: usize,
    pub game_state: S,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl<S> GameSession<S> {
    pub fn new(group_id: &str, game_type: GameType, created_by: &str, game_state: S) -> Self {
        GameSession {
            id: String::new(),
            group_id: group_id.to_string(),
            game_type,
            status: SessionStatus::Waiting,
            created_by: created_by.to_string(),
            players: vec![created_by.to_string()],
            max_players: game_type.max_players(),
            game_state,
            created_at: None,
        }
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.created_by == user_id
    }

    pub fn is_seated(&self, user_id: &str) -> bool {
        self.players.iter().any(|p| p == user_id)
    }

    pub fn seat_index(&self, user_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p == user_id)
    }

    /// Seats are only handed out in the lobby phase and never beyond
    /// `max_players`.
    pub fn seat_check(&self, user_id: &str) -> SeatCheck {
        if self.is_seated(user_id) {
            SeatCheck::AlreadySeated
        } else if self.status != SessionStatus::Waiting {
            SeatCheck::Closed
        } else if self.players.len() >= self.max_players {
            SeatCheck::Full
        } else {
            SeatCheck::Open
        }
    }
}

impl<S: DeserializeOwned> GameSession<S> {
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let mut session: GameSession<S> = serde_json::from_value(document.data.clone())
            .map_err(|e| StoreError::Serialization(format!("{}: {}", document.id, e)))?;
        session.id = document.id.clone();
        Ok(session)
    }
}
