//! Template statistics persisted at `Templates/<templateId>/Statistics/<statisticId>`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::document::{to_document, Document, DocumentStore};
use crate::error::Result;

pub const TEMPLATES: &str = "Templates";

pub fn statistics_collection(template_id: &str) -> String {
    format!("{TEMPLATES}/{template_id}/Statistics")
}

#[derive(Clone)]
pub struct StatisticsRepository {
    store: Arc<dyn DocumentStore>,
}

impl StatisticsRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Replace the statistic document and read it back.
    ///
    /// Returns `true` only when the document is present after the write.
    pub async fn save<T: Serialize + Sync>(&self, template_id: &str, statistic_id: &str, stats: &T) -> Result<bool> {
        if self.store.get(TEMPLATES, template_id).await?.is_none() {
            let mut template = Document::new();
            template.insert("id".into(), Value::String(template_id.to_string()));
            self.store.set(TEMPLATES, template_id, template, true).await?;
        }

        let mut data = to_document(stats)?;
        data.insert("updatedAt".into(), Value::String(chrono::Utc::now().to_rfc3339()));
        data.insert("id".into(), Value::String(statistic_id.to_string()));

        let collection = statistics_collection(template_id);
        self.store.set(&collection, statistic_id, data, false).await?;

        let verified = self.store.get(&collection, statistic_id).await?.is_some();
        if verified {
            info!(template = template_id, statistic = statistic_id, "Statistics persisted");
        } else {
            warn!(template = template_id, statistic = statistic_id, "Statistics write could not be verified");
        }
        Ok(verified)
    }

    pub async fn get(&self, template_id: &str, statistic_id: &str) -> Result<Option<Document>> {
        self.store.get(&statistics_collection(template_id), statistic_id).await
    }
}
