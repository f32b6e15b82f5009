use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    controllers::errors::GameActionError,
    models::{
        document::{Document, DocumentPath, FieldUpdates},
        game_session::{GameSession, SessionStatus, GAME_SESSIONS_COLLECTION},
    },
    repositories::{document_store::DocumentStore, document_store::Subscription},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new snapshot replaced the mirror.
    Updated,
    /// The session document is gone. The subscription has been released.
    Closed,
    /// A snapshot could not be read or decoded; the previous mirror is kept.
    Failed(String),
}

/// Holds one session's subscription and the last snapshot it delivered.
/// The mirror only ever changes when a snapshot arrives, never on write.
pub struct SessionController<S> {
    store: Arc<dyn DocumentStore>,
    path: DocumentPath,
    subscription: Option<Subscription<Option<Document>>>,
    mirror: Option<GameSession<S>>,
}

impl<S: DeserializeOwned> SessionController<S> {
    pub async fn subscribe(
        store: Arc<dyn DocumentStore>,
        session_id: &str,
    ) -> Result<Self, GameActionError> {
        let path = DocumentPath::new(GAME_SESSIONS_COLLECTION, session_id);
        let subscription = store.subscribe_document(&path).await?;
        debug!("Subscribed to {}", path);

        Ok(SessionController {
            store,
            path,
            subscription: Some(subscription),
            mirror: None,
        })
    }

    /// Waits for the next snapshot. `None` once unsubscribed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let snapshot = self.subscription.as_mut()?.next().await?;

        let event = match snapshot {
            Ok(Some(document)) => match GameSession::<S>::from_document(&document) {
                Ok(session) => {
                    self.mirror = Some(session);
                    SessionEvent::Updated
                }
                Err(err) => {
                    warn!("Ignoring undecodable snapshot of {}: {}", self.path, err);
                    SessionEvent::Failed(err.to_string())
                }
            },
            Ok(None) => {
                info!("Session {} no longer exists", self.path);
                self.unsubscribe();
                SessionEvent::Closed
            }
            Err(err) => {
                warn!("Subscription error on {}: {}", self.path, err);
                SessionEvent::Failed(err.to_string())
            }
        };
        Some(event)
    }
}

impl<S> SessionController<S> {
    pub fn session_id(&self) -> &str {
        &self.path.id
    }

    pub fn snapshot(&self) -> Option<&GameSession<S>> {
        self.mirror.as_ref()
    }

    pub fn session(&self) -> Result<&GameSession<S>, GameActionError> {
        self.mirror.as_ref().ok_or(GameActionError::SessionNotLoaded)
    }

    /// The loaded session, provided it is in `expected` phase.
    pub fn session_in(&self, expected: SessionStatus) -> Result<&GameSession<S>, GameActionError> {
        let session = self.session()?;
        if session.status != expected {
            return Err(GameActionError::InvalidPhase {
                expected,
                actual: session.status,
            });
        }
        Ok(session)
    }

    /// Optimistic partial write; the effect shows up with a later snapshot.
    pub async fn write(&self, updates: &FieldUpdates) -> Result<(), GameActionError> {
        self.store
            .update_fields(&self.path, updates)
            .await
            .map_err(|err| {
                warn!("Write to {} failed: {}", self.path, err);
                GameActionError::from(err)
            })
    }

    pub fn is_active(&self) -> bool {
        self.subscription
            .as_ref()
            .map(Subscription::is_active)
            .unwrap_or(false)
    }

    pub fn unsubscribe(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!("Unsubscribed from {}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game_session::{GameType, PlayerContext};
    use crate::models::uno::UnoGameState;
    use crate::repositories::document_store::MockDocumentStore;
    use crate::repositories::errors::store_errors::StoreError;
    use crate::repositories::memory_store::InMemoryDocumentStore;
    use crate::services::lobby_service::{GameSetup, LobbyService};

    async fn uno_session(store: &InMemoryDocumentStore) -> String {
        LobbyService::new(Arc::new(store.clone()))
            .create_session("g", &PlayerContext::new("alice"), &GameSetup::Uno)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_snapshot_loads_mirror() {
        let store = InMemoryDocumentStore::new();
        let id = uno_session(&store).await;
        let mut controller: SessionController<UnoGameState> =
            SessionController::subscribe(Arc::new(store.clone()), &id).await.unwrap();

        assert!(controller.snapshot().is_none());
        assert_eq!(controller.next_event().await, Some(SessionEvent::Updated));

        let session = controller.session().unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.game_type, GameType::Uno);
        assert_eq!(session.game_state.direction, 1);
    }

    #[tokio::test]
    async fn test_write_does_not_touch_mirror_until_snapshot() {
        let store = InMemoryDocumentStore::new();
        let id = uno_session(&store).await;
        let mut controller: SessionController<UnoGameState> =
            SessionController::subscribe(Arc::new(store.clone()), &id).await.unwrap();
        controller.next_event().await;

        controller
            .write(&FieldUpdates::new().set("gameState.turn", &1).unwrap())
            .await
            .unwrap();
        assert_eq!(controller.session().unwrap().game_state.turn, 0);

        assert_eq!(controller.next_event().await, Some(SessionEvent::Updated));
        assert_eq!(controller.session().unwrap().game_state.turn, 1);
    }

    #[tokio::test]
    async fn test_deleted_session_closes_subscription() {
        let store = InMemoryDocumentStore::new();
        let id = uno_session(&store).await;
        let mut controller: SessionController<UnoGameState> =
            SessionController::subscribe(Arc::new(store.clone()), &id).await.unwrap();
        controller.next_event().await;

        store
            .delete_document(&DocumentPath::new(GAME_SESSIONS_COLLECTION, &id))
            .await
            .unwrap();

        assert_eq!(controller.next_event().await, Some(SessionEvent::Closed));
        assert!(!controller.is_active());
        assert_eq!(controller.next_event().await, None);
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_snapshot_keeps_previous_mirror() {
        let store = InMemoryDocumentStore::new();
        let id = uno_session(&store).await;
        let mut controller: SessionController<UnoGameState> =
            SessionController::subscribe(Arc::new(store.clone()), &id).await.unwrap();
        controller.next_event().await;

        store
            .update_fields(
                &DocumentPath::new(GAME_SESSIONS_COLLECTION, &id),
                &FieldUpdates::new().set("gameState.turn", "first").unwrap(),
            )
            .await
            .unwrap();

        assert!(matches!(
            controller.next_event().await,
            Some(SessionEvent::Failed(_))
        ));
        assert_eq!(controller.session().unwrap().game_state.turn, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let store = InMemoryDocumentStore::new();
        let id = uno_session(&store).await;
        let mut controller: SessionController<UnoGameState> =
            SessionController::subscribe(Arc::new(store.clone()), &id).await.unwrap();

        controller.unsubscribe();

        assert_eq!(controller.next_event().await, None);
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_session_in_checks_phase() {
        let store = InMemoryDocumentStore::new();
        let id = uno_session(&store).await;
        let mut controller: SessionController<UnoGameState> =
            SessionController::subscribe(Arc::new(store.clone()), &id).await.unwrap();

        assert_eq!(
            controller.session_in(SessionStatus::Waiting).err(),
            Some(GameActionError::SessionNotLoaded)
        );
        controller.next_event().await;
        assert!(controller.session_in(SessionStatus::Waiting).is_ok());
        assert_eq!(
            controller.session_in(SessionStatus::Playing).err(),
            Some(GameActionError::InvalidPhase {
                expected: SessionStatus::Playing,
                actual: SessionStatus::Waiting,
            })
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_reported() {
        let mut store = MockDocumentStore::new();
        store.expect_subscribe_document().returning(|_| {
            let (_sender, receiver) = Subscription::channel();
            Ok(Subscription::new(receiver, || {}))
        });
        store
            .expect_update_fields()
            .returning(|_, _| Err(StoreError::DynamoDb("offline".to_string())));
        let controller: SessionController<UnoGameState> =
            SessionController::subscribe(Arc::new(store), "s-1").await.unwrap();

        let result = controller
            .write(&FieldUpdates::new().set("status", "playing").unwrap())
            .await;

        assert_eq!(
            result,
            Err(GameActionError::Store(StoreError::DynamoDb(
                "offline".to_string()
            )))
        );
    }
}
