use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;
use uuid::Uuid;

use crate::models::document::{Document, DocumentPath, FieldUpdates, Query};
use crate::repositories::document_store::{DocumentStore, SnapshotSender, Subscription};
use crate::repositories::errors::store_errors::StoreError;
use crate::repositories::field_paths::{apply_updates, run_query};

struct DocumentWatcher {
    id: u64,
    path: DocumentPath,
    sender: SnapshotSender<Option<Document>>,
}

struct QueryWatcher {
    id: u64,
    collection: String,
    query: Query,
    sender: SnapshotSender<Vec<Document>>,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, BTreeMap<String, Value>>,
    document_watchers: Vec<DocumentWatcher>,
    query_watchers: Vec<QueryWatcher>,
    next_watcher_id: u64,
}

impl StoreState {
    fn document(&self, path: &DocumentPath) -> Option<Document> {
        self.collections
            .get(&path.collection)
            .and_then(|documents| documents.get(&path.id))
            .map(|data| Document::new(&path.id, data.clone()))
    }

    fn query(&self, collection: &str, query: &Query) -> Vec<Document> {
        let documents = self
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, data)| Document::new(id, data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        run_query(documents, query)
    }

    /// Fans the new state of `path` out to every interested watcher. Watchers
    /// whose receiving side is gone are dropped.
    fn notify(&mut self, path: &DocumentPath) {
        let snapshot = self.document(path);
        self.document_watchers.retain(|watcher| {
            watcher.path != *path || watcher.sender.send(Ok(snapshot.clone())).is_ok()
        });

        let results: Vec<(u64, Vec<Document>)> = self
            .query_watchers
            .iter()
            .filter(|watcher| watcher.collection == path.collection)
            .map(|watcher| (watcher.id, self.query(&watcher.collection, &watcher.query)))
            .collect();
        for (id, documents) in results {
            let delivered = self
                .query_watchers
                .iter()
                .find(|watcher| watcher.id == id)
                .map(|watcher| watcher.sender.send(Ok(documents)).is_ok())
                .unwrap_or(false);
            if !delivered {
                self.query_watchers.retain(|watcher| watcher.id != id);
            }
        }
    }

    fn allocate_watcher_id(&mut self) -> u64 {
        self.next_watcher_id += 1;
        self.next_watcher_id
    }
}

/// Process-local document store with synchronous fan-out. Every mutation is
/// applied under one lock and delivered to watchers before the call returns.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        InMemoryDocumentStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A poisoned lock only means another writer panicked mid-update; the
        // maps themselves are still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove_document_watcher(state: &Weak<Mutex<StoreState>>, id: u64) {
        if let Some(state) = state.upgrade() {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.document_watchers.retain(|watcher| watcher.id != id);
        }
    }

    fn remove_query_watcher(state: &Weak<Mutex<StoreState>>, id: u64) {
        if let Some(state) = state.upgrade() {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.query_watchers.retain(|watcher| watcher.id != id);
        }
    }

    pub fn watcher_count(&self) -> usize {
        let state = self.lock();
        state.document_watchers.len() + state.query_watchers.len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        Ok(self.lock().document(path))
    }

    async fn create_document(
        &self,
        collection: &str,
        fields: &FieldUpdates,
    ) -> Result<DocumentPath, StoreError> {
        let path = DocumentPath::new(collection, &Uuid::new_v4().to_string());
        let mut data = Value::Object(Map::new());
        apply_updates(&mut data, fields, Utc::now())?;

        let mut state = self.lock();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(path.id.clone(), data);
        state.notify(&path);
        debug!("Created document {}", path);
        Ok(path)
    }

    async fn update_fields(
        &self,
        path: &DocumentPath,
        updates: &FieldUpdates,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let document = state
            .collections
            .get_mut(&path.collection)
            .and_then(|documents| documents.get_mut(&path.id))
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        // Apply to a copy so a bad path leaves the stored document untouched.
        let mut updated = document.clone();
        apply_updates(&mut updated, updates, Utc::now())?;
        *document = updated;

        state.notify(path);
        debug!("Updated {} field(s) on {}", updates.len(), path);
        Ok(())
    }

    async fn delete_document(&self, path: &DocumentPath) -> Result<(), StoreError> {
        let mut state = self.lock();
        let removed = state
            .collections
            .get_mut(&path.collection)
            .and_then(|documents| documents.remove(&path.id));
        if removed.is_some() {
            state.notify(path);
            debug!("Deleted document {}", path);
        }
        Ok(())
    }

    async fn subscribe_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Subscription<Option<Document>>, StoreError> {
        let (sender, receiver) = Subscription::channel();
        let mut state = self.lock();
        let id = state.allocate_watcher_id();
        // Cannot fail: the receiver is still in scope.
        let _ = sender.send(Ok(state.document(path)));
        state.document_watchers.push(DocumentWatcher {
            id,
            path: path.clone(),
            sender,
        });
        debug!("Watcher {} subscribed to {}", id, path);

        let weak = Arc::downgrade(&self.state);
        Ok(Subscription::new(receiver, move || {
            InMemoryDocumentStore::remove_document_watcher(&weak, id)
        }))
    }

    async fn subscribe_query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Subscription<Vec<Document>>, StoreError> {
        let (sender, receiver) = Subscription::channel();
        let mut state = self.lock();
        let id = state.allocate_watcher_id();
        let _ = sender.send(Ok(state.query(collection, query)));
        state.query_watchers.push(QueryWatcher {
            id,
            collection: collection.to_string(),
            query: query.clone(),
            sender,
        });
        debug!("Watcher {} subscribed to query on {}", id, collection);

        let weak = Arc::downgrade(&self.state);
        Ok(Subscription::new(receiver, move || {
            InMemoryDocumentStore::remove_query_watcher(&weak, id)
        }))
    }
}
