use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `gameState` of a Stop (word categories) session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopGameState {
    pub round: u32,
    pub current_letter: Option<char>,
    pub categories: Vec<String>,
    /// user id -> category -> answer (uppercase).
    #[serde(default)]
    pub responses: BTreeMap<String, BTreeMap<String, String>>,
    /// Reserved; no scoring rules exist yet.
    #[serde(default)]
    pub scores: BTreeMap<String, i64>,
    pub stopped_by: Option<String>,
    #[serde(default)]
    pub used_letters: Vec<char>,
}

impl StopGameState {
    pub fn new(categories: Vec<String>) -> Self {
        StopGameState {
            round: 1,
            current_letter: None,
            categories,
            responses: BTreeMap::new(),
            scores: BTreeMap::new(),
            stopped_by: None,
            used_letters: Vec::new(),
        }
    }

    pub fn responses_of(&self, user_id: &str) -> BTreeMap<String, String> {
        self.responses.get(user_id).cloned().unwrap_or_default()
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}
