use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    models::{
        chess::ChessGameState,
        document::{Document, DocumentPath, FieldUpdates, FilterOp, Query},
        game_session::{
            GameSession, GameType, PlayerContext, SeatCheck, SessionStatus,
            GAME_SESSIONS_COLLECTION,
        },
        stop::StopGameState,
        uno::UnoGameState,
    },
    repositories::{
        document_store::{DocumentStore, Subscription},
        errors::store_errors::StoreError,
    },
    services::{errors::lobby_service_errors::LobbyServiceError, stop_rules},
};

/// What to create. Stop takes the raw comma-separated category prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameSetup {
    Stop { categories: String },
    Uno,
    Chess,
}

impl GameSetup {
    pub fn stop_with_default_categories() -> Self {
        GameSetup::Stop {
            categories: stop_rules::DEFAULT_CATEGORIES.to_string(),
        }
    }

    pub fn game_type(&self) -> GameType {
        match self {
            GameSetup::Stop { .. } => GameType::Stop,
            GameSetup::Uno => GameType::Uno,
            GameSetup::Chess => GameType::Chess,
        }
    }

    fn initial_state(&self) -> Result<Value, LobbyServiceError> {
        let state = match self {
            GameSetup::Stop { categories } => {
                let categories = stop_rules::parse_categories(categories);
                if categories.is_empty() {
                    return Err(LobbyServiceError::ValidationError(
                        "At least one category is required".to_string(),
                    ));
                }
                serde_json::to_value(StopGameState::new(categories))
            }
            GameSetup::Uno => serde_json::to_value(UnoGameState::default()),
            GameSetup::Chess => serde_json::to_value(ChessGameState::default()),
        };
        state.map_err(|e| LobbyServiceError::Store(StoreError::Serialization(e.to_string())))
    }
}

/// One row of a group's open-session list.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub game_type: GameType,
    pub status: SessionStatus,
    pub created_by: String,
    pub player_count: usize,
    pub max_players: usize,
}

impl SessionSummary {
    pub fn from_session(session: &GameSession) -> Self {
        SessionSummary {
            id: session.id.clone(),
            game_type: session.game_type,
            status: session.status,
            created_by: session.created_by.clone(),
            player_count: session.players.len(),
            max_players: session.max_players,
        }
    }

    pub fn is_joinable(&self) -> bool {
        self.status == SessionStatus::Waiting && self.player_count < self.max_players
    }
}

/// Summaries for every decodable document; the rest are logged and skipped.
pub fn summarize(documents: &[Document]) -> Vec<SessionSummary> {
    documents
        .iter()
        .filter_map(|document| match GameSession::<Value>::from_document(document) {
            Ok(session) => Some(SessionSummary::from_session(&session)),
            Err(err) => {
                warn!("Skipping undecodable session {}: {}", document.id, err);
                None
            }
        })
        .collect()
}

/// Live list of a group's unfinished sessions.
pub struct GroupSessionsWatch {
    subscription: Subscription<Vec<Document>>,
}

impl GroupSessionsWatch {
    pub async fn next(&mut self) -> Option<Result<Vec<SessionSummary>, LobbyServiceError>> {
        let snapshot = self.subscription.next().await?;
        Some(
            snapshot
                .map(|documents| summarize(&documents))
                .map_err(LobbyServiceError::from),
        )
    }

    pub fn unsubscribe(&mut self) {
        self.subscription.unsubscribe();
    }
}

#[derive(Clone)]
pub struct LobbyService {
    store: Arc<dyn DocumentStore>,
}

impl LobbyService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        LobbyService { store }
    }

    pub fn session_path(session_id: &str) -> DocumentPath {
        DocumentPath::new(GAME_SESSIONS_COLLECTION, session_id)
    }

    /// Creates a `waiting` session seated with the creator and returns its id.
    pub async fn create_session(
        &self,
        group_id: &str,
        creator: &PlayerContext,
        setup: &GameSetup,
    ) -> Result<String, LobbyServiceError> {
        if group_id.is_empty() {
            return Err(LobbyServiceError::ValidationError(
                "Group id is required".to_string(),
            ));
        }

        let session = GameSession::new(
            group_id,
            setup.game_type(),
            &creator.user_id,
            setup.initial_state()?,
        );
        let fields = FieldUpdates::from_object(&session)?.server_timestamp("createdAt");
        let path = self
            .store
            .create_document(GAME_SESSIONS_COLLECTION, &fields)
            .await?;

        info!(
            "Created {} session {} in group {} for {}",
            session.game_type, path.id, group_id, creator.user_id
        );
        Ok(path.id)
    }

    async fn load(&self, session_id: &str) -> Result<GameSession, LobbyServiceError> {
        let document = self
            .store
            .get_document(&Self::session_path(session_id))
            .await?
            .ok_or_else(|| LobbyServiceError::SessionNotFound(session_id.to_string()))?;
        Ok(GameSession::from_document(&document)?)
    }

    /// Takes a seat for `player` and returns the game type for routing.
    /// A chess session starts as soon as its second seat is taken.
    pub async fn join_session(
        &self,
        session_id: &str,
        player: &PlayerContext,
    ) -> Result<GameType, LobbyServiceError> {
        let session = self.load(session_id).await?;

        match session.seat_check(&player.user_id) {
            SeatCheck::AlreadySeated => return Err(LobbyServiceError::AlreadyJoined),
            SeatCheck::Closed => return Err(LobbyServiceError::AlreadyStarted),
            SeatCheck::Full => {
                debug!("{} rejected from full session {}", player.user_id, session_id);
                return Err(LobbyServiceError::SessionFull);
            }
            SeatCheck::Open => {}
        }

        let mut updates =
            FieldUpdates::new().array_union("players", std::slice::from_ref(&player.user_id))?;
        if session.game_type == GameType::Chess && session.players.len() + 1 == session.max_players
        {
            updates = updates.set("status", &SessionStatus::Playing)?;
        }
        self.store
            .update_fields(&Self::session_path(session_id), &updates)
            .await?;

        info!("{} joined {} session {}", player.user_id, session.game_type, session_id);
        Ok(session.game_type)
    }

    /// Game type of an existing session, for routing to its view.
    pub async fn enter_session(&self, session_id: &str) -> Result<GameType, LobbyServiceError> {
        Ok(self.load(session_id).await?.game_type)
    }

    pub async fn watch_group_sessions(
        &self,
        group_id: &str,
    ) -> Result<GroupSessionsWatch, LobbyServiceError> {
        let query = Query::new()
            .filter("groupId", FilterOp::Equal, json!(group_id))
            .filter("status", FilterOp::NotEqual, json!(SessionStatus::Finished))
            .order_by("createdAt", true);
        let subscription = self
            .store
            .subscribe_query(GAME_SESSIONS_COLLECTION, &query)
            .await?;
        Ok(GroupSessionsWatch { subscription })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chess::{AWAITING_OPPONENT_TEXT, STARTING_FEN};
    use crate::models::document::FieldPath;
    use crate::repositories::document_store::MockDocumentStore;
    use crate::repositories::memory_store::InMemoryDocumentStore;

    fn lobby() -> (LobbyService, InMemoryDocumentStore) {
        let store = InMemoryDocumentStore::new();
        (LobbyService::new(Arc::new(store.clone())), store)
    }

    async fn stored(store: &InMemoryDocumentStore, id: &str) -> GameSession {
        let document = store
            .get_document(&LobbyService::session_path(id))
            .await
            .unwrap()
            .unwrap();
        GameSession::from_document(&document).unwrap()
    }

    #[tokio::test]
    async fn test_create_stop_session() {
        let (lobby, store) = lobby();

        let id = lobby
            .create_session(
                "group-1",
                &PlayerContext::new("alice"),
                &GameSetup::Stop {
                    categories: " Fruta, ,Carro ".to_string(),
                },
            )
            .await
            .unwrap();

        let session = stored(&store, &id).await;
        assert_eq!(session.id, id);
        assert_eq!(session.game_type, GameType::Stop);
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.players, vec!["alice".to_string()]);
        assert_eq!(session.max_players, 8);
        assert!(session.created_at.is_some());
        assert_eq!(session.game_state["round"], 1);
        assert_eq!(session.game_state["categories"], json!(["Fruta", "Carro"]));
        assert_eq!(session.game_state["usedLetters"], json!([]));
    }

    #[tokio::test]
    async fn test_create_stop_session_requires_categories() {
        let (lobby, store) = lobby();

        let result = lobby
            .create_session(
                "group-1",
                &PlayerContext::new("alice"),
                &GameSetup::Stop {
                    categories: " , ".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(LobbyServiceError::ValidationError(_))));
        let all = store
            .subscribe_query(GAME_SESSIONS_COLLECTION, &Query::new())
            .await
            .unwrap()
            .next()
            .await
            .unwrap()
            .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_create_uno_and_chess_sessions() {
        let (lobby, store) = lobby();
        let alice = PlayerContext::new("alice");

        let uno = lobby.create_session("g", &alice, &GameSetup::Uno).await.unwrap();
        let chess = lobby.create_session("g", &alice, &GameSetup::Chess).await.unwrap();

        let uno = stored(&store, &uno).await;
        assert_eq!(uno.max_players, 10);
        assert_eq!(uno.game_state["direction"], 1);
        assert_eq!(uno.game_state["currentColor"], Value::Null);
        assert_eq!(uno.game_state["winner"], Value::Null);

        let chess = stored(&store, &chess).await;
        assert_eq!(chess.max_players, 2);
        assert_eq!(chess.game_state["fen"], STARTING_FEN);
        assert_eq!(chess.game_state["statusText"], AWAITING_OPPONENT_TEXT);
    }

    #[tokio::test]
    async fn test_join_session() {
        let (lobby, store) = lobby();
        let id = lobby
            .create_session("g", &PlayerContext::new("alice"), &GameSetup::Uno)
            .await
            .unwrap();

        let game_type = lobby
            .join_session(&id, &PlayerContext::new("bob"))
            .await
            .unwrap();

        assert_eq!(game_type, GameType::Uno);
        let session = stored(&store, &id).await;
        assert_eq!(session.players, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(session.status, SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn test_join_session_rejections() {
        let (lobby, store) = lobby();
        let id = lobby
            .create_session("g", &PlayerContext::new("alice"), &GameSetup::Chess)
            .await
            .unwrap();

        assert_eq!(
            lobby.join_session(&id, &PlayerContext::new("alice")).await,
            Err(LobbyServiceError::AlreadyJoined)
        );
        assert_eq!(
            lobby.join_session("missing", &PlayerContext::new("bob")).await,
            Err(LobbyServiceError::SessionNotFound("missing".to_string()))
        );

        lobby
            .join_session(&id, &PlayerContext::new("bob"))
            .await
            .unwrap();
        let session = stored(&store, &id).await;
        assert_eq!(session.status, SessionStatus::Playing);

        assert_eq!(
            lobby.join_session(&id, &PlayerContext::new("carol")).await,
            Err(LobbyServiceError::AlreadyStarted)
        );
        assert_eq!(stored(&store, &id).await.players.len(), 2);
    }

    #[tokio::test]
    async fn test_join_full_session_is_rejected_without_write() {
        let (lobby, store) = lobby();
        let id = lobby
            .create_session("g", &PlayerContext::new("p0"), &GameSetup::Uno)
            .await
            .unwrap();
        for i in 1..10 {
            lobby
                .join_session(&id, &PlayerContext::new(&format!("p{}", i)))
                .await
                .unwrap();
        }

        let result = lobby.join_session(&id, &PlayerContext::new("late")).await;

        assert_eq!(result, Err(LobbyServiceError::SessionFull));
        let session = stored(&store, &id).await;
        assert_eq!(session.players.len(), session.max_players);
        assert!(!session.is_seated("late"));
    }

    #[tokio::test]
    async fn test_enter_session_routes_by_game_type() {
        let (lobby, _) = lobby();
        let id = lobby
            .create_session("g", &PlayerContext::new("alice"), &GameSetup::Chess)
            .await
            .unwrap();

        assert_eq!(lobby.enter_session(&id).await, Ok(GameType::Chess));
        assert!(matches!(
            lobby.enter_session("nope").await,
            Err(LobbyServiceError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_group_sessions_lists_unfinished_sessions_of_group() {
        let (lobby, store) = lobby();
        let alice = PlayerContext::new("alice");
        let open = lobby.create_session("g", &alice, &GameSetup::Uno).await.unwrap();
        let done = lobby.create_session("g", &alice, &GameSetup::Chess).await.unwrap();
        lobby
            .create_session("other", &alice, &GameSetup::Uno)
            .await
            .unwrap();
        store
            .update_fields(
                &LobbyService::session_path(&done),
                &FieldUpdates::new()
                    .set("status", &SessionStatus::Finished)
                    .unwrap(),
            )
            .await
            .unwrap();

        let mut watch = lobby.watch_group_sessions("g").await.unwrap();
        let summaries = watch.next().await.unwrap().unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, open);
        assert_eq!(summaries[0].player_count, 1);
        assert!(summaries[0].is_joinable());

        lobby
            .join_session(&open, &PlayerContext::new("bob"))
            .await
            .unwrap();
        let summaries = watch.next().await.unwrap().unwrap();
        assert_eq!(summaries[0].player_count, 2);

        watch.unsubscribe();
        assert_eq!(store.watcher_count(), 0);
    }

    #[test]
    fn test_summarize_skips_undecodable_documents() {
        let documents = vec![
            Document::new("broken", json!({"gameType": "poker"})),
            Document::new(
                "ok",
                json!({
                    "groupId": "g",
                    "gameType": "stop",
                    "status": "playing",
                    "createdBy": "alice",
                    "players": ["alice"],
                    "maxPlayers": 8,
                    "gameState": {}
                }),
            ),
        ];

        let summaries = summarize(&documents);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "ok");
        assert!(!summaries[0].is_joinable());
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated() {
        let mut store = MockDocumentStore::new();
        store
            .expect_create_document()
            .times(1)
            .returning(|_, _| Err(StoreError::DynamoDb("throttled".to_string())));
        let lobby = LobbyService::new(Arc::new(store));

        let result = lobby
            .create_session("g", &PlayerContext::new("alice"), &GameSetup::Uno)
            .await;

        assert_eq!(
            result,
            Err(LobbyServiceError::Store(StoreError::DynamoDb(
                "throttled".to_string()
            )))
        );
    }

    #[tokio::test]
    async fn test_create_session_writes_server_timestamp() {
        let mut store = MockDocumentStore::new();
        store
            .expect_create_document()
            .withf(|collection, fields| {
                collection == GAME_SESSIONS_COLLECTION
                    && fields.get(&FieldPath::from("createdAt"))
                        == Some(&crate::models::document::FieldValue::ServerTimestamp)
            })
            .times(1)
            .returning(|collection, _| Ok(DocumentPath::new(collection, "new-id")));
        let lobby = LobbyService::new(Arc::new(store));

        let id = lobby
            .create_session("g", &PlayerContext::new("alice"), &GameSetup::Chess)
            .await
            .unwrap();

        assert_eq!(id, "new-id");
    }
}
