use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::document::{Document, DocumentPath, FieldUpdates, Query};
use crate::repositories::errors::store_errors::StoreError;

#[cfg(test)]
use mockall::automock;

pub type SnapshotResult<T> = Result<T, StoreError>;
pub type SnapshotSender<T> = mpsc::UnboundedSender<SnapshotResult<T>>;

/// A live feed of snapshots. The current state is delivered first, then one
/// full snapshot per change. Once `unsubscribe` has run (explicitly or on
/// drop) `next` yields `None` forever.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<SnapshotResult<T>>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
    active: bool,
}

impl<T> Subscription<T> {
    pub fn new<F>(receiver: mpsc::UnboundedReceiver<SnapshotResult<T>>, cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Subscription {
            receiver,
            cancel: Some(Box::new(cancel)),
            active: true,
        }
    }

    pub fn channel() -> (SnapshotSender<T>, mpsc::UnboundedReceiver<SnapshotResult<T>>) {
        mpsc::unbounded_channel()
    }

    pub async fn next(&mut self) -> Option<SnapshotResult<T>> {
        if !self.active {
            return None;
        }
        self.receiver.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.receiver.close();
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.active)
            .finish()
    }
}

/// Realtime document database. Writes are partial field updates; concurrent
/// writers to the same field race and the last applied write wins.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError>;

    async fn create_document(
        &self,
        collection: &str,
        fields: &FieldUpdates,
    ) -> Result<DocumentPath, StoreError>;

    async fn update_fields(
        &self,
        path: &DocumentPath,
        updates: &FieldUpdates,
    ) -> Result<(), StoreError>;

    async fn delete_document(&self, path: &DocumentPath) -> Result<(), StoreError>;

    async fn subscribe_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Subscription<Option<Document>>, StoreError>;

    async fn subscribe_query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Subscription<Vec<Document>>, StoreError>;
}
