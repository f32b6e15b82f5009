use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    controllers::{
        errors::GameActionError,
        session_controller::{SessionController, SessionEvent},
    },
    models::{
        chess::{ChessGameState, PlayerColor, PromotionPiece},
        document::FieldUpdates,
        game_session::{PlayerContext, SessionStatus},
    },
    repositories::{document_store::DocumentStore, errors::store_errors::StoreError},
    services::chess_service::{AppliedMove, ChessService},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ChessView {
    pub status: SessionStatus,
    pub players: Vec<String>,
    /// `None` for spectators.
    pub my_color: Option<PlayerColor>,
    /// Side shown at the bottom of the board.
    pub orientation: PlayerColor,
    pub fen: String,
    pub history: Vec<String>,
    pub status_text: String,
    pub can_move: bool,
}

pub struct ChessController {
    session: SessionController<ChessGameState>,
    player: PlayerContext,
    service: ChessService,
}

impl ChessController {
    /// Opens the session and, when exactly one seat is taken by someone
    /// else, takes the second seat and starts the game.
    pub async fn enter(
        store: Arc<dyn DocumentStore>,
        session_id: &str,
        player: PlayerContext,
        service: ChessService,
    ) -> Result<Self, GameActionError> {
        let session = SessionController::subscribe(store, session_id).await?;
        let mut controller = ChessController {
            session,
            player,
            service,
        };

        match controller.next_event().await {
            Some(SessionEvent::Updated) => {}
            Some(SessionEvent::Failed(msg)) => {
                return Err(GameActionError::Store(StoreError::Serialization(msg)))
            }
            Some(SessionEvent::Closed) | None => {
                return Err(GameActionError::Store(StoreError::NotFound(
                    session_id.to_string(),
                )))
            }
        }

        controller.take_seat().await?;
        Ok(controller)
    }

    async fn take_seat(&self) -> Result<(), GameActionError> {
        let session = self.session.session()?;
        let me = &self.player.user_id;
        if session.players.len() != 1 || session.is_seated(me) {
            return Ok(());
        }

        let updates = FieldUpdates::new()
            .array_union("players", std::slice::from_ref(me))?
            .set("status", &SessionStatus::Playing)?;
        self.session.write(&updates).await?;

        info!("{} took the second seat in {}", me, self.session.session_id());
        Ok(())
    }

    /// Next snapshot event; the engine is reloaded from every new position.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.session.next_event().await?;
        if event == SessionEvent::Updated {
            if let Some(session) = self.session.snapshot() {
                if let Err(err) = self.service.sync_position(&session.game_state) {
                    warn!(
                        "Session {} holds an unreadable position: {}",
                        self.session.session_id(),
                        err
                    );
                    return Some(SessionEvent::Failed(err.to_string()));
                }
            }
        }
        Some(event)
    }

    pub fn unsubscribe(&mut self) {
        self.session.unsubscribe();
    }

    pub fn session(&self) -> &SessionController<ChessGameState> {
        &self.session
    }

    /// Position the local engine currently holds.
    pub fn engine_fen(&self) -> String {
        self.service.fen()
    }

    pub fn view(&self) -> Option<ChessView> {
        let session = self.session.snapshot()?;
        let my_color = ChessService::player_color(session, &self.player.user_id);
        let position = self.service.position_status(session.players.len());

        Some(ChessView {
            status: session.status,
            players: session.players.clone(),
            my_color,
            orientation: my_color.unwrap_or(PlayerColor::White),
            fen: session.game_state.fen.clone(),
            history: session.game_state.history.clone(),
            status_text: position.status_text(),
            can_move: self
                .service
                .check_can_move(session, &self.player.user_id)
                .is_ok(),
        })
    }

    /// Validates the move on the local engine, then writes the new position.
    /// Illegal moves never reach the store. Either way the engine is put back
    /// on the last snapshot until the store echoes the move.
    pub async fn submit_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<PromotionPiece>,
    ) -> Result<AppliedMove, GameActionError> {
        let session = self.session.session()?;
        let me = &self.player.user_id;

        let applied = self
            .service
            .validate_and_make_move(session, me, from, to, promotion)
            .map_err(|err| {
                debug!("{} move {} to {} rejected: {}", me, from, to, err);
                GameActionError::from(err)
            })?;

        let status_text = self
            .service
            .position_status(session.players.len())
            .status_text();
        let mut history = session.game_state.history.clone();
        history.push(applied.notation.clone());

        let updates = FieldUpdates::new()
            .set("gameState.fen", &applied.fen)?
            .set("gameState.history", &history)?
            .set("gameState.statusText", &status_text)?;

        // The engine follows the mirror; the new position arrives with the
        // next snapshot.
        let written = self.session.write(&updates).await;
        if let Err(restore_err) = self.service.sync_position(&session.game_state) {
            warn!("Could not restore position after move: {}", restore_err);
        }
        written?;

        debug!("{} played {} in {}", me, applied.notation, self.session.session_id());
        Ok(applied)
    }
}
