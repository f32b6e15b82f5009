use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::repositories::errors::store_errors::StoreError;

/// Location of one document: `<collection>/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub collection: String,
    pub id: String,
}

impl DocumentPath {
    pub fn new(collection: &str, id: &str) -> Self {
        DocumentPath {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document snapshot as delivered by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: &str, data: Value) -> Self {
        Document {
            id: id.to_string(),
            data,
        }
    }
}

/// Path to a (possibly nested) field. Segments are kept separate so that
/// user ids used as map keys are never re-split on dots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn from_segments<I, T>(segments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        FieldPath(segments.into_iter().map(Into::into).collect())
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        FieldPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for FieldPath {
    fn from(dotted: &str) -> Self {
        FieldPath(dotted.split('.').map(str::to_string).collect())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Set(Value),
    /// Appends each value not already present in the target array.
    ArrayUnion(Vec<Value>),
    /// Replaced by the store's clock when the write is applied.
    ServerTimestamp,
}

/// A partial update: every listed field is written, everything else in the
/// document is left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdates(BTreeMap<FieldPath, FieldValue>);

impl FieldUpdates {
    pub fn new() -> Self {
        FieldUpdates(BTreeMap::new())
    }

    pub fn set<P, T>(mut self, path: P, value: &T) -> Result<Self, StoreError>
    where
        P: Into<FieldPath>,
        T: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.0.insert(path.into(), FieldValue::Set(value));
        Ok(self)
    }

    pub fn array_union<P, T>(mut self, path: P, values: &[T]) -> Result<Self, StoreError>
    where
        P: Into<FieldPath>,
        T: Serialize,
    {
        let values = values
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.0.insert(path.into(), FieldValue::ArrayUnion(values));
        Ok(self)
    }

    pub fn server_timestamp<P: Into<FieldPath>>(mut self, path: P) -> Self {
        self.0.insert(path.into(), FieldValue::ServerTimestamp);
        self
    }

    /// Top-level `Set` for every field of a serialized object.
    pub fn from_object<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))? {
            Value::Object(fields) => Ok(FieldUpdates(
                fields
                    .into_iter()
                    .map(|(key, value)| (FieldPath(vec![key]), FieldValue::Set(value)))
                    .collect(),
            )),
            other => Err(StoreError::Serialization(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, path: &FieldPath) -> Option<&FieldValue> {
        self.0.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    /// Documents that lack the field never match.
    NotEqual,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: FieldPath,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: FieldPath,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn filter<P: Into<FieldPath>>(mut self, field: P, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn order_by<P: Into<FieldPath>>(mut self, field: P, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending,
        });
        self
    }
}
