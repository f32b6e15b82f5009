use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    controllers::{
        errors::GameActionError,
        session_controller::{SessionController, SessionEvent},
    },
    models::{
        document::{FieldPath, FieldUpdates},
        game_session::{GameSession, PlayerContext, SessionStatus},
        uno::{Card, CardColor, UnoGameState},
    },
    repositories::document_store::DocumentStore,
    services::uno_rules,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpponentView {
    pub user_id: String,
    pub card_count: usize,
    pub is_current: bool,
}

/// Everything an Uno table shows to one player.
#[derive(Debug, Clone, PartialEq)]
pub struct UnoView {
    pub status: SessionStatus,
    pub players: Vec<String>,
    pub is_creator: bool,
    pub can_start: bool,
    pub my_hand: Vec<Card>,
    /// Index-aligned with `my_hand`; all false when it is not our turn.
    pub playable: Vec<bool>,
    pub top_discard: Option<Card>,
    pub current_color: Option<CardColor>,
    pub current_player: Option<String>,
    pub is_my_turn: bool,
    pub opponents: Vec<OpponentView>,
    pub draw_pile_count: usize,
    pub direction: i8,
    pub winner: Option<String>,
}

fn hand_path(user_id: &str) -> FieldPath {
    FieldPath::from_segments(["gameState", "playerHands", user_id])
}

pub struct UnoController {
    session: SessionController<UnoGameState>,
    player: PlayerContext,
}

impl UnoController {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        session_id: &str,
        player: PlayerContext,
    ) -> Result<Self, GameActionError> {
        let session = SessionController::subscribe(store, session_id).await?;
        Ok(UnoController { session, player })
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.session.next_event().await
    }

    pub fn session(&self) -> &SessionController<UnoGameState> {
        &self.session
    }

    pub fn unsubscribe(&mut self) {
        self.session.unsubscribe();
    }

    pub fn view(&self) -> Option<UnoView> {
        let session = self.session.snapshot()?;
        let state = &session.game_state;
        let me = &self.player.user_id;
        let current_player = session.players.get(state.turn).cloned();
        let is_my_turn = session.status == SessionStatus::Playing
            && current_player.as_deref() == Some(me.as_str());
        let my_hand = state.hand(me).to_vec();
        let playable = my_hand
            .iter()
            .map(|card| {
                is_my_turn
                    && state
                        .top_discard()
                        .map(|top| uno_rules::is_move_valid(card, top, state.current_color))
                        .unwrap_or(true)
            })
            .collect();

        Some(UnoView {
            status: session.status,
            players: session.players.clone(),
            is_creator: session.is_creator(me),
            can_start: session.is_creator(me)
                && session.status == SessionStatus::Waiting
                && session.players.len() >= uno_rules::MIN_PLAYERS,
            my_hand,
            playable,
            top_discard: state.top_discard().copied(),
            current_color: state.current_color,
            current_player: current_player.clone(),
            is_my_turn,
            opponents: session
                .players
                .iter()
                .filter(|p| *p != me)
                .map(|p| OpponentView {
                    user_id: p.clone(),
                    card_count: state.hand(p).len(),
                    is_current: current_player.as_ref() == Some(p),
                })
                .collect(),
            draw_pile_count: state.draw_pile.len(),
            direction: state.direction,
            winner: state.winner.clone(),
        })
    }

    fn my_turn(&self) -> Result<&GameSession<UnoGameState>, GameActionError> {
        let session = self.session.session_in(SessionStatus::Playing)?;
        match session.seat_index(&self.player.user_id) {
            Some(seat) if seat == session.game_state.turn => Ok(session),
            _ => {
                debug!("{} acted out of turn", self.player.user_id);
                Err(GameActionError::NotYourTurn)
            }
        }
    }

    /// Deals a fresh deck and opens play. Creator only, from the lobby, with
    /// at least two players seated.
    pub async fn start_game<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(), GameActionError> {
        let session = self.session.session_in(SessionStatus::Waiting)?;
        if !session.is_creator(&self.player.user_id) {
            return Err(GameActionError::NotCreator);
        }
        if session.players.len() < uno_rules::MIN_PLAYERS {
            return Err(GameActionError::NotEnoughPlayers {
                required: uno_rules::MIN_PLAYERS,
                actual: session.players.len(),
            });
        }

        let deal = uno_rules::deal_initial_hands(&session.players, rng);
        let current_color = deal.discard_pile.last().and_then(uno_rules::starting_color);
        let updates = FieldUpdates::new()
            .set("status", &SessionStatus::Playing)?
            .set("gameState.drawPile", &deal.draw_pile)?
            .set("gameState.discardPile", &deal.discard_pile)?
            .set("gameState.playerHands", &deal.player_hands)?
            .set("gameState.turn", &0)?
            .set("gameState.direction", &1)?
            .set("gameState.currentColor", &current_color)?
            .set("gameState.winner", &Option::<String>::None)?;
        self.session.write(&updates).await?;

        info!(
            "Uno session {} started with {} players",
            self.session.session_id(),
            session.players.len()
        );
        Ok(())
    }

    /// Plays the card at `index` of the local hand. Wilds need a concrete
    /// `chosen_color`. Forced draws of DRAW_2 and WILD_DRAW_4 are not applied.
    pub async fn play_card(
        &self,
        index: usize,
        chosen_color: Option<CardColor>,
    ) -> Result<(), GameActionError> {
        let session = self.my_turn()?;
        let state = &session.game_state;
        let me = &self.player.user_id;

        let hand = state.hand(me);
        let card = *hand.get(index).ok_or(GameActionError::InvalidCard(index))?;
        let legal = state
            .top_discard()
            .map(|top| uno_rules::is_move_valid(&card, top, state.current_color))
            .unwrap_or(true);
        if !legal {
            debug!("{} tried to play {} illegally", me, card);
            return Err(GameActionError::IllegalMove(card.to_string()));
        }
        if card.is_wild() && matches!(chosen_color, None | Some(CardColor::Wild)) {
            return Err(GameActionError::ColorRequired);
        }

        let change = uno_rules::get_next_turn(state, session.players.len(), &card, chosen_color);
        let mut remaining = hand.to_vec();
        remaining.remove(index);
        let mut discard_pile = state.discard_pile.clone();
        discard_pile.push(card);

        let mut updates = FieldUpdates::new()
            .set(hand_path(me), &remaining)?
            .set("gameState.discardPile", &discard_pile)?
            .set("gameState.turn", &change.turn)?
            .set("gameState.direction", &change.direction)?
            .set("gameState.currentColor", &change.current_color)?;
        if remaining.is_empty() {
            updates = updates
                .set("gameState.winner", me)?
                .set("status", &SessionStatus::Finished)?;
        }
        self.session.write(&updates).await?;

        if remaining.is_empty() {
            info!("{} won Uno session {}", me, self.session.session_id());
        }
        Ok(())
    }

    /// Takes the top card of the draw pile and passes the turn on.
    pub async fn draw_card(&self) -> Result<(), GameActionError> {
        let session = self.my_turn()?;
        let state = &session.game_state;
        let me = &self.player.user_id;

        let mut draw_pile = state.draw_pile.clone();
        let card = draw_pile.pop().ok_or(GameActionError::DrawPileEmpty)?;
        let mut hand = state.hand(me).to_vec();
        hand.push(card);
        let turn = uno_rules::step(state.turn, state.direction, session.players.len());

        let updates = FieldUpdates::new()
            .set("gameState.drawPile", &draw_pile)?
            .set(hand_path(me), &hand)?
            .set("gameState.turn", &turn)?;
        self.session.write(&updates).await
    }
}
