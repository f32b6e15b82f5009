//! Applying partial updates and evaluating queries over JSON documents.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::models::document::{
    Document, FieldPath, FieldUpdates, FieldValue, Filter, FilterOp, OrderBy, Query,
};
use crate::repositories::errors::store_errors::StoreError;

pub fn timestamp_value(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn lookup<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| current.get(segment.as_str()))
}

fn validate(path: &FieldPath) -> Result<(), StoreError> {
    if path.segments().is_empty() || path.segments().iter().any(String::is_empty) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Writes `value` at `path`, creating (or replacing non-map) intermediates.
pub fn set_path(root: &mut Value, path: &FieldPath, value: Value) -> Result<(), StoreError> {
    validate(path)?;
    let (last, parents) = path
        .segments()
        .split_last()
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(fields) => fields
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return Err(StoreError::InvalidPath(path.to_string())),
        };
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(fields) => {
            fields.insert(last.clone(), value);
            Ok(())
        }
        _ => Err(StoreError::InvalidPath(path.to_string())),
    }
}

/// Resolves a `FieldValue` against the current document contents.
pub fn resolve_value(
    root: &Value,
    path: &FieldPath,
    value: &FieldValue,
    now: DateTime<Utc>,
) -> Value {
    match value {
        FieldValue::Set(value) => value.clone(),
        FieldValue::ServerTimestamp => timestamp_value(now),
        FieldValue::ArrayUnion(values) => {
            let mut merged = match lookup(root, path) {
                Some(Value::Array(existing)) => existing.clone(),
                _ => Vec::new(),
            };
            for value in values {
                if !merged.contains(value) {
                    merged.push(value.clone());
                }
            }
            Value::Array(merged)
        }
    }
}

pub fn apply_updates(
    root: &mut Value,
    updates: &FieldUpdates,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    for (path, value) in updates.iter() {
        let resolved = resolve_value(root, path, value, now);
        set_path(root, path, resolved)?;
    }
    Ok(())
}

/// Finds the deepest ancestor of `path` that exists in `current` and nests
/// `value` under it, so a store that cannot create intermediate maps can
/// still write the field.
pub fn anchor_update(current: &Value, path: &FieldPath, value: Value) -> (FieldPath, Value) {
    let segments = path.segments();
    let mut node = current;
    for (index, segment) in segments.iter().enumerate() {
        if index == segments.len() - 1 {
            break;
        }
        match node.get(segment.as_str()) {
            Some(child) if child.is_object() => node = child,
            _ => {
                let anchor = FieldPath::from_segments(segments[..=index].iter().cloned());
                let nested = segments[index + 1..]
                    .iter()
                    .rev()
                    .fold(value, |inner, key| {
                        let mut map = Map::new();
                        map.insert(key.clone(), inner);
                        Value::Object(map)
                    });
                return (anchor, nested);
            }
        }
    }
    (path.clone(), value)
}

fn filter_matches(data: &Value, filter: &Filter) -> bool {
    let field = lookup(data, &filter.field);
    match filter.op {
        FilterOp::Equal => field == Some(&filter.value),
        FilterOp::NotEqual => matches!(field, Some(value) if value != &filter.value),
        FilterOp::ArrayContains => {
            matches!(field, Some(Value::Array(items)) if items.contains(&filter.value))
        }
    }
}

pub fn matches_query(data: &Value, query: &Query) -> bool {
    query.filters.iter().all(|filter| filter_matches(data, filter))
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Filters and orders documents; ties keep id order.
pub fn run_query(mut documents: Vec<Document>, query: &Query) -> Vec<Document> {
    documents.retain(|document| matches_query(&document.data, query));
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    if let Some(OrderBy { field, descending }) = &query.order_by {
        documents.sort_by(|a, b| {
            let ordering = compare_values(lookup(&a.data, field), lookup(&b.data, field));
            if *descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
    documents
}
