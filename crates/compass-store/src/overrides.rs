//! Versioned per-question overrides (`QuestionOverrides/<questionUid>`).
//!
//! Each save prepends a version; at most [`MAX_VERSIONS`] are kept, newest first.

use std::sync::Arc;

use compass_common::entities::random_suffix;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::document::{to_document, DocumentStore, StoredDocument};
use crate::error::{Result, StoreError};

pub const QUESTION_OVERRIDES: &str = "QuestionOverrides";
pub const MAX_VERSIONS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionVersion {
    pub version_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_analysis_information: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_settings: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOverrideDocument {
    pub id: String,
    pub latest_version: QuestionVersion,
    pub versions: Vec<QuestionVersion>,
}

/// The editable part of a version, as submitted by a curator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionDraft {
    pub author_name: Option<String>,
    pub change_description: Option<String>,
    pub title: Option<String>,
    pub data_analysis_information: Option<Value>,
    pub chart_settings: Option<Value>,
}

fn new_version_id() -> String {
    format!("v_{}_{}", chrono::Utc::now().timestamp_millis(), random_suffix(5))
}

#[derive(Clone)]
pub struct QuestionOverrideRepository {
    store: Arc<dyn DocumentStore>,
}

impl QuestionOverrideRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, question_uid: &str) -> Result<Option<QuestionOverrideDocument>> {
        match self.store.get(QUESTION_OVERRIDES, question_uid).await? {
            Some(data) => Ok(Some(StoredDocument { id: question_uid.to_string(), data }.parse()?)),
            None => Ok(None),
        }
    }

    /// Record a new version and make it the latest.
    pub async fn save_version(
        &self,
        question_uid: &str,
        author_id: &str,
        draft: VersionDraft,
    ) -> Result<QuestionVersion> {
        let version = QuestionVersion {
            version_id: new_version_id(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            author_id: author_id.to_string(),
            author_name: draft.author_name,
            change_description: draft.change_description,
            title: draft.title,
            data_analysis_information: draft.data_analysis_information,
            chart_settings: draft.chart_settings,
        };
        self.push_version(question_uid, version.clone()).await?;
        info!(question = question_uid, version = %version.version_id, "Saved question override");
        Ok(version)
    }

    /// Copy an earlier version's content into a fresh version.
    pub async fn restore_version(
        &self,
        question_uid: &str,
        version_id: &str,
        author_id: &str,
        author_name: Option<String>,
    ) -> Result<QuestionVersion> {
        let doc = self
            .get(question_uid)
            .await?
            .ok_or_else(|| StoreError::NotFound("Question overrides document not found".into()))?;
        let source = doc
            .versions
            .into_iter()
            .find(|v| v.version_id == version_id)
            .ok_or_else(|| StoreError::NotFound("Version not found".into()))?;

        let restored = QuestionVersion {
            version_id: new_version_id(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            author_id: author_id.to_string(),
            author_name,
            change_description: Some(format!("Restored from version {version_id}")),
            ..source
        };
        self.push_version(question_uid, restored.clone()).await?;
        info!(question = question_uid, from = version_id, "Restored question override");
        Ok(restored)
    }

    async fn push_version(&self, question_uid: &str, version: QuestionVersion) -> Result<()> {
        let mut versions = self.get(question_uid).await?.map(|d| d.versions).unwrap_or_default();
        versions.insert(0, version.clone());
        versions.truncate(MAX_VERSIONS);

        let doc = QuestionOverrideDocument { id: question_uid.to_string(), latest_version: version, versions };
        self.store.set(QUESTION_OVERRIDES, question_uid, to_document(&doc)?, false).await
    }
}
