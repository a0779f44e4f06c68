//! The document-store abstraction.
//!
//! Collections are addressed by slash-separated paths with an odd number of segments
//! (`DynamicQuestions`, `Templates/R186491/Statistics`); documents by a collection path plus an id.

use std::cmp::Ordering;

use async_trait::async_trait;
use compass_common::entities::random_suffix;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

impl StoredDocument {
    /// The document's fields with `id` folded in, the shape API consumers expect.
    pub fn into_flat(self) -> Document {
        let mut flat = self.data;
        flat.insert("id".into(), Value::String(self.id));
        flat
    }

    pub fn parse<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.into_flat()))?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub order_by: Option<String>,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl ListOptions {
    pub fn newest_first(field: &str) -> Self {
        Self { order_by: Some(field.to_string()), descending: true, limit: None }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Write a document. With `merge`, nested objects are merged into the existing document.
    async fn set(&self, collection: &str, id: &str, data: Document, merge: bool) -> Result<()>;

    /// Returns `true` when a document was removed. Subcollections are left untouched.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    async fn list(&self, collection: &str, opts: &ListOptions) -> Result<Vec<StoredDocument>>;

    /// Names of the subcollections under `collection/id`.
    async fn list_collections(&self, collection: &str, id: &str) -> Result<Vec<String>>;

    /// Store under a generated id and return it.
    async fn add(&self, collection: &str, data: Document) -> Result<String> {
        let id = generate_id();
        self.set(collection, &id, data, false).await?;
        Ok(id)
    }
}

pub fn generate_id() -> String {
    format!("{}{}", chrono::Utc::now().timestamp_millis(), random_suffix(8))
}

pub fn validate_collection(path: &str) -> Result<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 == 0 || segments.iter().any(|s| !is_valid_segment(s)) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

pub fn validate_id(id: &str) -> Result<()> {
    if !is_valid_segment(id) || id.contains('/') {
        return Err(StoreError::InvalidPath(id.to_string()));
    }
    Ok(())
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty() && !s.starts_with('.') && !s.contains(['\\', '\0'])
}

/// Deep-merge `patch` into `target`. Non-object values are replaced.
pub fn merge_documents(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match value {
            Value::Object(incoming) if matches!(target.get(&key), Some(Value::Object(_))) => {
                if let Some(Value::Object(existing)) = target.get_mut(&key) {
                    merge_documents(existing, incoming);
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}

/// Order and truncate a listing. Without `order_by`, documents are ordered by id.
pub fn apply_list_options(mut docs: Vec<StoredDocument>, opts: &ListOptions) -> Vec<StoredDocument> {
    match &opts.order_by {
        Some(field) => docs.sort_by(|a, b| compare_values(a.data.get(field), b.data.get(field))),
        None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
    }
    if opts.descending {
        docs.reverse();
    }
    if let Some(limit) = opts.limit {
        docs.truncate(limit);
    }
    docs
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Serialize any value into a document body.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Invalid("document must serialize to a JSON object".into())),
    }
}
