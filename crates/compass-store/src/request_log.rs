//! Audit log of backend operations (`FirebaseRequestLogs`).
//!
//! Logging is best effort: a failed write is reported through `tracing` and never reaches the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::document::{to_document, DocumentStore, ListOptions};
use crate::error::Result;

pub const REQUEST_LOGS: &str = "FirebaseRequestLogs";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Update,
    Delete,
    Query,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    /// RFC 3339.
    pub timestamp: String,
    pub operation: Operation,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RequestMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
}

impl RequestLogEntry {
    pub fn new(operation: Operation, collection: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            operation,
            collection: collection.into(),
            document_id: None,
            user_id: None,
            user_email: None,
            success,
            error: None,
            metadata: None,
            request_body: None,
            response_data: None,
        }
    }

    pub fn document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn user(mut self, id: Option<String>, email: Option<String>) -> Self {
        self.user_id = id;
        self.user_email = email;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    pub fn metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn bodies(mut self, request: Option<Value>, response: Option<Value>) -> Self {
        self.request_body = request;
        self.response_data = response;
        self
    }
}

#[derive(Clone)]
pub struct RequestLogger {
    store: Arc<dyn DocumentStore>,
}

impl RequestLogger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Append an entry. Returns the generated id, or `None` when the write failed.
    pub async fn log_request(&self, entry: RequestLogEntry) -> Option<String> {
        let doc = match to_document(&entry) {
            Ok(doc) => doc,
            Err(e) => {
                error!(error = %e, "Failed to serialize request log entry");
                return None;
            }
        };
        match self.store.add(REQUEST_LOGS, doc).await {
            Ok(id) => {
                debug!(id = %id, operation = ?entry.operation, collection = %entry.collection, "Request logged");
                Some(id)
            }
            Err(e) => {
                error!(error = %e, "Failed to write request log");
                None
            }
        }
    }

    /// Newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<RequestLogEntry>> {
        let docs = self.store.list(REQUEST_LOGS, &ListOptions::newest_first("timestamp").limit(limit)).await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| serde_json::from_value(Value::Object(d.data)).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, StoredDocument};
    use crate::error::StoreError;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn get(&self, _: &str, _: &str) -> Result<Option<Document>> {
            Err(StoreError::Invalid("down".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Document, _: bool) -> Result<()> {
            Err(StoreError::Invalid("down".into()))
        }
        async fn delete(&self, _: &str, _: &str) -> Result<bool> {
            Err(StoreError::Invalid("down".into()))
        }
        async fn list(&self, _: &str, _: &ListOptions) -> Result<Vec<StoredDocument>> {
            Err(StoreError::Invalid("down".into()))
        }
        async fn list_collections(&self, _: &str, _: &str) -> Result<Vec<String>> {
            Err(StoreError::Invalid("down".into()))
        }
    }

    #[tokio::test]
    async fn test_entries_drop_absent_fields() {
        let store = Arc::new(MemoryStore::new());
        let logger = RequestLogger::new(store.clone());
        let id = logger
            .log_request(
                RequestLogEntry::new(Operation::Update, "Statistics", true)
                    .document("empire-statistics")
                    .metadata(RequestMetadata { method: Some("POST".into()), ..Default::default() }),
            )
            .await
            .unwrap();

        let raw = store.get(REQUEST_LOGS, &id).await.unwrap().unwrap();
        assert_eq!(raw["operation"], "update");
        assert_eq!(raw["documentId"], "empire-statistics");
        assert_eq!(raw["metadata"], json!({"method": "POST"}));
        assert!(raw.get("userId").is_none());
        assert!(raw.get("error").is_none());
    }

    #[tokio::test]
    async fn test_error_marks_failure_and_lists() {
        let logger = RequestLogger::new(Arc::new(MemoryStore::new()));
        logger.log_request(RequestLogEntry::new(Operation::Read, "Users", true)).await;
        logger
            .log_request(RequestLogEntry::new(Operation::Update, "Statistics", true).error("boom"))
            .await;
        let entries = logger.list(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| !e.success && e.error.as_deref() == Some("boom")));
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let logger = RequestLogger::new(Arc::new(BrokenStore));
        assert!(logger.log_request(RequestLogEntry::new(Operation::Query, "Templates", true)).await.is_none());
    }
}
