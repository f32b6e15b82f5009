use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    controllers::{
        errors::GameActionError,
        session_controller::{SessionController, SessionEvent},
    },
    models::{
        document::{FieldPath, FieldUpdates},
        game_session::{GameSession, PlayerContext, SessionStatus},
        stop::StopGameState,
    },
    repositories::document_store::DocumentStore,
    services::stop_rules,
};

pub const DEFAULT_RESPONSE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct StopView {
    pub status: SessionStatus,
    pub round: u32,
    pub current_letter: Option<char>,
    pub categories: Vec<String>,
    pub players: Vec<String>,
    pub is_creator: bool,
    /// Local answers, including ones not yet flushed.
    pub my_responses: BTreeMap<String, String>,
    /// Every player's answers; only filled while validating.
    pub validation_table: Option<BTreeMap<String, BTreeMap<String, String>>>,
    pub stopped_by: Option<String>,
    pub letters_left: usize,
}

pub struct StopController {
    session: SessionController<StopGameState>,
    player: PlayerContext,
    debounce: Duration,
    pending: BTreeMap<String, String>,
    /// Round the buffered answers were typed in.
    pending_round: Option<u32>,
    flush_at: Option<Instant>,
}

impl StopController {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        session_id: &str,
        player: PlayerContext,
    ) -> Result<Self, GameActionError> {
        let session = SessionController::subscribe(store, session_id).await?;
        Ok(StopController {
            session,
            player,
            debounce: DEFAULT_RESPONSE_DEBOUNCE,
            pending: BTreeMap::new(),
            pending_round: None,
            flush_at: None,
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn session(&self) -> &SessionController<StopGameState> {
        &self.session
    }

    pub fn has_pending_responses(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Next snapshot event. Pending answers are flushed when their debounce
    /// window closes while waiting, and dropped once the round they belong
    /// to is over.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let Some(deadline) = self.flush_at else {
                let event = self.session.next_event().await;
                self.discard_stale_responses();
                return event;
            };

            tokio::select! {
                biased;
                event = self.session.next_event() => {
                    self.discard_stale_responses();
                    return event;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if let Err(err) = self.flush_responses().await {
                        return Some(SessionEvent::Failed(err.to_string()));
                    }
                }
            }
        }
    }

    fn buffer_is_current(&self) -> bool {
        match self.session.snapshot() {
            Some(session) => {
                session.status == SessionStatus::Playing
                    && Some(session.game_state.round) == self.pending_round
            }
            None => false,
        }
    }

    fn discard_stale_responses(&mut self) {
        if self.pending.is_empty() || self.buffer_is_current() {
            return;
        }
        debug!(
            "Dropping {} unsaved answer(s) for {}: round {:?} is over",
            self.pending.len(),
            self.player.user_id,
            self.pending_round
        );
        self.pending.clear();
        self.pending_round = None;
        self.flush_at = None;
    }

    pub fn unsubscribe(&mut self) {
        self.session.unsubscribe();
    }

    pub fn view(&self) -> Option<StopView> {
        let session = self.session.snapshot()?;
        let state = &session.game_state;

        let mut my_responses = state.responses_of(&self.player.user_id);
        my_responses.extend(self.pending.clone());

        Some(StopView {
            status: session.status,
            round: state.round,
            current_letter: state.current_letter,
            categories: state.categories.clone(),
            players: session.players.clone(),
            is_creator: session.is_creator(&self.player.user_id),
            my_responses,
            validation_table: (session.status == SessionStatus::Validating)
                .then(|| state.responses.clone()),
            stopped_by: state.stopped_by.clone(),
            letters_left: stop_rules::available_letters(&state.used_letters).len(),
        })
    }

    fn creator_session_in(
        &self,
        expected: SessionStatus,
    ) -> Result<&GameSession<StopGameState>, GameActionError> {
        let session = self.session.session_in(expected)?;
        if !session.is_creator(&self.player.user_id) {
            return Err(GameActionError::NotCreator);
        }
        Ok(session)
    }

    /// Draws an unused letter and opens the round.
    pub async fn start_round<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<char, GameActionError> {
        let session = self.creator_session_in(SessionStatus::Waiting)?;
        let letter = stop_rules::draw_letter(&session.game_state.used_letters, rng)
            .ok_or(GameActionError::LettersExhausted)?;

        let updates = FieldUpdates::new()
            .set("status", &SessionStatus::Playing)?
            .set("gameState.currentLetter", &letter)?
            .array_union("gameState.usedLetters", &[letter])?;
        self.session.write(&updates).await?;

        info!(
            "Stop session {} round {} started on {}",
            self.session.session_id(),
            session.game_state.round,
            letter
        );
        Ok(letter)
    }

    /// Buffers an answer; it is written with the next flush.
    pub fn record_response(&mut self, category: &str, text: &str) -> Result<(), GameActionError> {
        let session = self.session.session_in(SessionStatus::Playing)?;
        if !session.game_state.has_category(category) {
            return Err(GameActionError::UnknownCategory(category.to_string()));
        }

        let round = session.game_state.round;
        if self.pending_round != Some(round) {
            self.pending.clear();
            self.pending_round = Some(round);
        }
        self.pending
            .insert(category.to_string(), stop_rules::normalize_response(text));
        self.flush_at = Some(Instant::now() + self.debounce);
        Ok(())
    }

    /// Writes every buffered answer in one update. Answers from a round
    /// that is no longer being played are dropped instead.
    pub async fn flush_responses(&mut self) -> Result<(), GameActionError> {
        self.flush_at = None;
        self.discard_stale_responses();
        if self.pending.is_empty() {
            return Ok(());
        }

        self.pending_round = None;
        let pending = std::mem::take(&mut self.pending);
        let mut updates = FieldUpdates::new();
        for (category, answer) in &pending {
            let path = FieldPath::from_segments([
                "gameState",
                "responses",
                self.player.user_id.as_str(),
                category.as_str(),
            ]);
            updates = updates.set(path, answer)?;
        }
        debug!(
            "Flushing {} answer(s) for {}",
            pending.len(),
            self.player.user_id
        );
        self.session.write(&updates).await
    }

    /// Ends the round for everyone. Pending answers go out first.
    pub async fn call_stop(&mut self) -> Result<(), GameActionError> {
        let session = self.session.session()?;
        if session.status == SessionStatus::Validating || session.game_state.stopped_by.is_some() {
            return Err(GameActionError::AlreadyStopped);
        }
        self.session.session_in(SessionStatus::Playing)?;

        if let Err(err) = self.flush_responses().await {
            warn!("Stopping without unsaved answers: {}", err);
        }

        let updates = FieldUpdates::new()
            .set("status", &SessionStatus::Validating)?
            .set("gameState.stoppedBy", &self.player.user_id)?;
        self.session.write(&updates).await?;

        info!(
            "{} stopped the round in session {}",
            self.player.user_id,
            self.session.session_id()
        );
        Ok(())
    }

    /// Back to the lobby phase for another letter.
    pub async fn next_round(&self) -> Result<(), GameActionError> {
        let session = self.creator_session_in(SessionStatus::Validating)?;

        let updates = FieldUpdates::new()
            .set("status", &SessionStatus::Waiting)?
            .set("gameState.round", &(session.game_state.round + 1))?
            .set("gameState.currentLetter", &Option::<char>::None)?
            .set("gameState.responses", &BTreeMap::<String, String>::new())?
            .set("gameState.stoppedBy", &Option::<String>::None)?;
        self.session.write(&updates).await
    }

    pub async fn finish_game(&self) -> Result<(), GameActionError> {
        let session = self.session.session()?;
        if !session.is_creator(&self.player.user_id) {
            return Err(GameActionError::NotCreator);
        }
        if session.status == SessionStatus::Finished {
            return Err(GameActionError::InvalidPhase {
                expected: SessionStatus::Validating,
                actual: session.status,
            });
        }

        self.session
            .write(&FieldUpdates::new().set("status", &SessionStatus::Finished)?)
            .await?;
        info!("Stop session {} finished", self.session.session_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentPath;
    use crate::models::game_session::GAME_SESSIONS_COLLECTION;
    use crate::repositories::memory_store::InMemoryDocumentStore;
    use crate::services::lobby_service::{GameSetup, LobbyService};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn stop_session(store: &InMemoryDocumentStore) -> String {
        let lobby = LobbyService::new(Arc::new(store.clone()));
        let id = lobby
            .create_session(
                "g",
                &PlayerContext::new("alice"),
                &GameSetup::stop_with_default_categories(),
            )
            .await
            .unwrap();
        lobby
            .join_session(&id, &PlayerContext::new("bob"))
            .await
            .unwrap();
        id
    }

    async fn open(store: &InMemoryDocumentStore, id: &str, player: &str) -> StopController {
        let mut controller = StopController::open(
            Arc::new(store.clone()),
            id,
            PlayerContext::new(player),
        )
        .await
        .unwrap();
        assert_eq!(controller.next_event().await, Some(SessionEvent::Updated));
        controller
    }

    #[tokio::test]
    async fn test_start_round_draws_unused_letter() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        let mut alice = open(&store, &id, "alice").await;
        let mut rng = StdRng::seed_from_u64(11);

        let letter = alice.start_round(&mut rng).await.unwrap();
        alice.next_event().await;

        let view = alice.view().unwrap();
        assert_eq!(view.status, SessionStatus::Playing);
        assert_eq!(view.current_letter, Some(letter));
        assert_eq!(view.letters_left, stop_rules::ALPHABET.len() - 1);
        assert!(stop_rules::ALPHABET.contains(&letter));
    }

    #[tokio::test]
    async fn test_only_creator_starts_round() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        let bob = open(&store, &id, "bob").await;
        let mut rng = StdRng::seed_from_u64(11);

        assert_eq!(
            bob.start_round(&mut rng).await,
            Err(GameActionError::NotCreator)
        );
    }

    #[tokio::test]
    async fn test_start_round_with_no_letters_left() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        store
            .update_fields(
                &DocumentPath::new(GAME_SESSIONS_COLLECTION, &id),
                &FieldUpdates::new()
                    .set("gameState.usedLetters", &stop_rules::ALPHABET)
                    .unwrap(),
            )
            .await
            .unwrap();
        let alice = open(&store, &id, "alice").await;
        let mut rng = StdRng::seed_from_u64(11);

        assert_eq!(
            alice.start_round(&mut rng).await,
            Err(GameActionError::LettersExhausted)
        );
        assert_eq!(alice.view().unwrap().status, SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn test_responses_are_buffered_and_flushed_together() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        let mut alice = open(&store, &id, "alice").await;
        alice
            .start_round(&mut StdRng::seed_from_u64(2))
            .await
            .unwrap();
        alice.next_event().await;

        alice.record_response("Nome", "ana").unwrap();
        alice.record_response("Cor", "azul").unwrap();
        assert!(alice.has_pending_responses());
        assert_eq!(alice.view().unwrap().my_responses["Nome"], "ANA");
        assert_eq!(
            alice.record_response("Fruta", "abacaxi"),
            Err(GameActionError::UnknownCategory("Fruta".to_string()))
        );

        alice.flush_responses().await.unwrap();
        alice.next_event().await;

        let session = alice.session().session().unwrap();
        let mine = session.game_state.responses_of("alice");
        assert_eq!(mine["Nome"], "ANA");
        assert_eq!(mine["Cor"], "AZUL");
        assert!(!alice.has_pending_responses());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_window_flushes_while_waiting() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        let mut alice = open(&store, &id, "alice")
            .await
            .with_debounce(Duration::from_millis(50));
        alice
            .start_round(&mut StdRng::seed_from_u64(2))
            .await
            .unwrap();
        alice.next_event().await;

        alice.record_response("Animal", "anta").unwrap();
        assert_eq!(alice.next_event().await, Some(SessionEvent::Updated));

        assert!(!alice.has_pending_responses());
        let mine = alice
            .session()
            .session()
            .unwrap()
            .game_state
            .responses_of("alice");
        assert_eq!(mine["Animal"], "ANTA");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsaved_answers_do_not_carry_into_next_round() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        let mut alice = open(&store, &id, "alice").await;
        alice
            .start_round(&mut StdRng::seed_from_u64(5))
            .await
            .unwrap();
        alice.next_event().await;
        let mut bob = open(&store, &id, "bob")
            .await
            .with_debounce(Duration::from_millis(50));

        bob.record_response("Cor", "bege").unwrap();
        alice.call_stop().await.unwrap();
        alice.next_event().await;
        alice.next_round().await.unwrap();
        alice.next_event().await;

        assert_eq!(bob.next_event().await, Some(SessionEvent::Updated));
        assert!(!bob.has_pending_responses());
        assert_eq!(bob.next_event().await, Some(SessionEvent::Updated));
        bob.flush_responses().await.unwrap();

        let document = store
            .get_document(&DocumentPath::new(GAME_SESSIONS_COLLECTION, &id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.data["status"], "waiting");
        assert_eq!(document.data["gameState"]["round"], 2);
        assert_eq!(document.data["gameState"]["responses"], serde_json::json!({}));
        let view = bob.view().unwrap();
        assert_eq!(view.round, 2);
        assert!(view.my_responses.is_empty());
    }

    #[tokio::test]
    async fn test_playing_view_hides_other_answers() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        let mut alice = open(&store, &id, "alice").await;
        alice
            .start_round(&mut StdRng::seed_from_u64(5))
            .await
            .unwrap();
        alice.next_event().await;
        let mut bob = open(&store, &id, "bob").await;

        bob.record_response("Cor", "bege").unwrap();
        bob.flush_responses().await.unwrap();
        alice.next_event().await;

        let view = alice.view().unwrap();
        assert!(view.my_responses.is_empty());
        assert!(view.validation_table.is_none());
    }

    #[tokio::test]
    async fn test_stop_flushes_then_validates() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        let mut alice = open(&store, &id, "alice").await;
        alice
            .start_round(&mut StdRng::seed_from_u64(5))
            .await
            .unwrap();
        alice.next_event().await;
        let mut bob = open(&store, &id, "bob").await;

        bob.record_response("Nome", "bruno").unwrap();
        bob.call_stop().await.unwrap();
        alice.next_event().await;
        alice.next_event().await;

        let view = alice.view().unwrap();
        assert_eq!(view.status, SessionStatus::Validating);
        assert_eq!(view.stopped_by.as_deref(), Some("bob"));
        let table = view.validation_table.unwrap();
        assert_eq!(table["bob"]["Nome"], "BRUNO");

        assert_eq!(alice.call_stop().await, Err(GameActionError::AlreadyStopped));
    }

    #[tokio::test]
    async fn test_next_round_and_finish() {
        let store = InMemoryDocumentStore::new();
        let id = stop_session(&store).await;
        let mut alice = open(&store, &id, "alice").await;
        let mut rng = StdRng::seed_from_u64(8);
        let first = alice.start_round(&mut rng).await.unwrap();
        alice.next_event().await;
        alice.record_response("Cor", "cinza").unwrap();
        alice.call_stop().await.unwrap();
        alice.next_event().await;
        alice.next_event().await;

        alice.next_round().await.unwrap();
        alice.next_event().await;

        let view = alice.view().unwrap();
        assert_eq!(view.status, SessionStatus::Waiting);
        assert_eq!(view.round, 2);
        assert_eq!(view.current_letter, None);
        assert!(view.my_responses.is_empty());
        assert_eq!(view.stopped_by, None);

        let second = alice.start_round(&mut rng).await.unwrap();
        assert_ne!(first, second);
        alice.next_event().await;

        alice.finish_game().await.unwrap();
        alice.next_event().await;
        assert_eq!(alice.view().unwrap().status, SessionStatus::Finished);
        assert!(matches!(
            alice.finish_game().await,
            Err(GameActionError::InvalidPhase { .. })
        ));
    }
}
