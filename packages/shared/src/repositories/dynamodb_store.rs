use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use serde_dynamo::{from_item, to_attribute_value, to_item};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ConfigError, StoreConfig};
use crate::models::document::{Document, DocumentPath, FieldPath, FieldUpdates, FieldValue, Query};
use crate::repositories::document_store::{DocumentStore, Subscription};
use crate::repositories::errors::store_errors::StoreError;
use crate::repositories::field_paths::{
    anchor_update, apply_updates, lookup, resolve_value, run_query, set_path,
};

const ID_ATTRIBUTE: &str = "id";

/// Document store over DynamoDB: one table per collection, keyed by `id`.
/// Subscriptions poll and deliver only changed snapshots.
pub struct DynamoDbDocumentStore {
    client: Client,
    config: StoreConfig,
}

impl DynamoDbDocumentStore {
    pub fn new(client: Client, config: StoreConfig) -> Self {
        Self { client, config }
    }

    /// Store settings and AWS credentials both come from the environment.
    pub async fn from_env() -> Result<Self, ConfigError> {
        let config = StoreConfig::from_env()?;
        let aws_config = aws_config::load_from_env().await;
        Ok(Self::new(Client::new(&aws_config), config))
    }

    async fn fetch(client: &Client, table: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let result = client
            .get_item()
            .table_name(table)
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        match result.item {
            Some(item) => Ok(Some(document_from_item(item)?)),
            None => Ok(None),
        }
    }

    async fn scan(client: &Client, table: &str) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        let mut start_key = None;
        loop {
            let output = client
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

            for item in output.items.unwrap_or_default() {
                documents.push(document_from_item(item)?);
            }

            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }
        Ok(documents)
    }
}

fn document_from_item(item: HashMap<String, AttributeValue>) -> Result<Document, StoreError> {
    let mut data: Value =
        from_item(item).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let id = match &mut data {
        Value::Object(fields) => match fields.remove(ID_ATTRIBUTE) {
            Some(Value::String(id)) => id,
            _ => return Err(StoreError::Serialization("item without a string id".to_string())),
        },
        _ => return Err(StoreError::Serialization("item is not a map".to_string())),
    };
    Ok(Document::new(&id, data))
}

/// An `UpdateItem` request body: expression plus its placeholder maps.
#[derive(Debug, Default)]
pub struct UpdatePlan {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

impl UpdatePlan {
    fn path_expression(&mut self, index: usize, path: &FieldPath) -> String {
        path.segments()
            .iter()
            .enumerate()
            .map(|(depth, segment)| {
                let placeholder = format!("#f{}_{}", index, depth);
                self.names.insert(placeholder.clone(), segment.clone());
                placeholder
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn value_placeholder(&mut self, index: usize, value: &Value) -> Result<String, StoreError> {
        let placeholder = format!(":v{}", index);
        let attribute: AttributeValue =
            to_attribute_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.values.insert(placeholder.clone(), attribute);
        Ok(placeholder)
    }

    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }
}

fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() <= path.len() && prefix == &path[..prefix.len()]
}

/// Folds one resolved write into the pending anchored writes. A write under
/// an existing anchor is merged into that anchor's value; a write that covers
/// existing anchors replaces them.
fn merge_write(
    writes: &mut Vec<(FieldPath, Value)>,
    current: &Value,
    path: &FieldPath,
    value: Value,
) -> Result<(), StoreError> {
    if let Some((anchor, nested)) = writes
        .iter_mut()
        .find(|(anchor, _)| is_prefix(anchor.segments(), path.segments()))
    {
        let relative = &path.segments()[anchor.segments().len()..];
        if relative.is_empty() {
            *nested = value;
        } else {
            set_path(nested, &FieldPath::from_segments(relative.iter().cloned()), value)?;
        }
        return Ok(());
    }

    let (anchor, nested) = anchor_update(current, path, value);
    writes.retain(|(existing, _)| !is_prefix(anchor.segments(), existing.segments()));
    writes.push((anchor, nested));
    Ok(())
}

/// Translates partial updates into one SET expression against the current
/// item. Missing intermediate maps are created by anchoring the write at the
/// deepest existing ancestor, with one clause per anchor so sibling fields
/// under a new map land together. Array-union appends only values not yet
/// present.
pub fn plan_update(
    current: &Value,
    updates: &FieldUpdates,
    now: DateTime<Utc>,
) -> Result<UpdatePlan, StoreError> {
    let mut writes: Vec<(FieldPath, Value)> = Vec::new();
    let mut appends: Vec<(FieldPath, Vec<Value>)> = Vec::new();

    for (path, value) in updates.iter() {
        if path.segments().is_empty() || path.segments().iter().any(String::is_empty) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        if let (FieldValue::ArrayUnion(values), Some(Value::Array(existing))) =
            (value, lookup(current, path))
        {
            let missing: Vec<Value> = values
                .iter()
                .filter(|value| !existing.contains(value))
                .cloned()
                .collect();
            if !missing.is_empty() {
                appends.push((path.clone(), missing));
            }
            continue;
        }

        let resolved = resolve_value(current, path, value, now);
        merge_write(&mut writes, current, path, resolved)?;
    }

    // An append that overlaps a SET clause is written as the merged array.
    let mut list_appends = Vec::new();
    for (path, missing) in appends {
        let overlaps = writes.iter().any(|(anchor, _)| {
            is_prefix(anchor.segments(), path.segments())
                || is_prefix(path.segments(), anchor.segments())
        });
        if overlaps {
            let resolved = resolve_value(current, &path, &FieldValue::ArrayUnion(missing), now);
            merge_write(&mut writes, current, &path, resolved)?;
        } else {
            list_appends.push((path, missing));
        }
    }

    let mut plan = UpdatePlan::default();
    let mut clauses = Vec::new();
    for (index, (anchor, value)) in writes.iter().enumerate() {
        let target = plan.path_expression(index, anchor);
        let placeholder = plan.value_placeholder(index, value)?;
        clauses.push(format!("{} = {}", target, placeholder));
    }
    for (offset, (path, missing)) in list_appends.into_iter().enumerate() {
        let index = writes.len() + offset;
        let target = plan.path_expression(index, &path);
        let placeholder = plan.value_placeholder(index, &Value::Array(missing))?;
        clauses.push(format!("{} = list_append({}, {})", target, target, placeholder));
    }

    if !clauses.is_empty() {
        plan.expression = format!("SET {}", clauses.join(", "));
    }
    Ok(plan)
}

#[async_trait]
impl DocumentStore for DynamoDbDocumentStore {
    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let table = self.config.table_name(&path.collection);
        Self::fetch(&self.client, &table, &path.id).await
    }

    async fn create_document(
        &self,
        collection: &str,
        fields: &FieldUpdates,
    ) -> Result<DocumentPath, StoreError> {
        let path = DocumentPath::new(collection, &Uuid::new_v4().to_string());
        let mut data = Value::Object(Map::new());
        apply_updates(&mut data, fields, Utc::now())?;
        if let Value::Object(fields) = &mut data {
            fields.insert(ID_ATTRIBUTE.to_string(), Value::String(path.id.clone()));
        }

        let item: HashMap<String, AttributeValue> =
            to_item(&data).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.client
            .put_item()
            .table_name(self.config.table_name(collection))
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        debug!("Created document {}", path);
        Ok(path)
    }

    async fn update_fields(
        &self,
        path: &DocumentPath,
        updates: &FieldUpdates,
    ) -> Result<(), StoreError> {
        let table = self.config.table_name(&path.collection);
        let current = Self::fetch(&self.client, &table, &path.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let mut plan = plan_update(&current.data, updates, Utc::now())?;
        if plan.is_empty() {
            debug!("Nothing to write for {}", path);
            return Ok(());
        }
        plan.names
            .insert("#doc_id".to_string(), ID_ATTRIBUTE.to_string());

        self.client
            .update_item()
            .table_name(&table)
            .key(ID_ATTRIBUTE, AttributeValue::S(path.id.clone()))
            .update_expression(plan.expression)
            .condition_expression("attribute_exists(#doc_id)")
            .set_expression_attribute_names(Some(plan.names))
            .set_expression_attribute_values(Some(plan.values))
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    StoreError::NotFound(path.to_string())
                } else {
                    StoreError::DynamoDb(service_error.to_string())
                }
            })?;

        debug!("Updated {} field(s) on {}", updates.len(), path);
        Ok(())
    }

    async fn delete_document(&self, path: &DocumentPath) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(self.config.table_name(&path.collection))
            .key(ID_ATTRIBUTE, AttributeValue::S(path.id.clone()))
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        debug!("Deleted document {}", path);
        Ok(())
    }

    async fn subscribe_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Subscription<Option<Document>>, StoreError> {
        let client = self.client.clone();
        let table = self.config.table_name(&path.collection);
        let id = path.id.clone();
        let label = format!("{}/{}", table, id);

        Ok(poll_snapshots(self.config.poll_interval, label, move || {
            let client = client.clone();
            let table = table.clone();
            let id = id.clone();
            async move { DynamoDbDocumentStore::fetch(&client, &table, &id).await }
        }))
    }

    async fn subscribe_query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Subscription<Vec<Document>>, StoreError> {
        let client = self.client.clone();
        let table = self.config.table_name(collection);
        let query = query.clone();
        let label = table.clone();

        Ok(poll_snapshots(self.config.poll_interval, label, move || {
            let client = client.clone();
            let table = table.clone();
            let query = query.clone();
            async move {
                let documents = DynamoDbDocumentStore::scan(&client, &table).await?;
                Ok(run_query(documents, &query))
            }
        }))
    }
}

/// Calls `fetch` every `interval` and forwards a snapshot only when it
/// differs from the last one delivered. Fetch errors are forwarded and
/// polling continues. The task ends when the subscription is dropped or
/// unsubscribed.
pub fn poll_snapshots<T, F, Fut>(
    interval: Duration,
    label: String,
    mut fetch: F,
) -> Subscription<T>
where
    T: PartialEq + Clone + Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
{
    let (sender, receiver) = Subscription::channel();
    let mut ticker = tokio::time::interval(interval);

    let handle = tokio::spawn(async move {
        let mut last: Option<T> = None;
        loop {
            ticker.tick().await;
            if sender.is_closed() {
                break;
            }
            match fetch().await {
                Ok(snapshot) => {
                    if last.as_ref() == Some(&snapshot) {
                        continue;
                    }
                    if sender.send(Ok(snapshot.clone())).is_err() {
                        break;
                    }
                    last = Some(snapshot);
                }
                Err(e) => {
                    warn!("Polling {} failed: {}", label, e);
                    if sender.send(Err(e)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    Subscription::new(receiver, move || handle.abort())
}
