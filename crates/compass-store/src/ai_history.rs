//! Bounded histories of AI-produced content, persisted in local state.

use std::sync::Arc;

use compass_common::entities::random_suffix;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::local::LocalStore;

pub const AI_HISTORY_KEY: &str = "dynamicAI_history";
pub const AI_HISTORY_PREFERENCES_KEY: &str = "dynamicAI_history_preferences";
pub const QUESTIONNAIRE_HISTORY_KEY: &str = "questionnaire-ai-history";
pub const MAX_AI_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AiContentKind {
    Query,
    ChartDescription,
    ChartHtml,
    Sparql,
    DataInterpretation,
    QuestionInterpretation,
    DataCollectionInterpretation,
    DataAnalysisInterpretation,
    #[serde(other)]
    Other,
}

impl AiContentKind {
    pub fn section(self) -> HistorySection {
        match self {
            AiContentKind::Query => HistorySection::QueryAndAnalysis,
            AiContentKind::ChartDescription | AiContentKind::ChartHtml => HistorySection::DataVisualization,
            AiContentKind::Sparql => HistorySection::SparqlAndDatabase,
            AiContentKind::DataInterpretation
            | AiContentKind::QuestionInterpretation
            | AiContentKind::DataCollectionInterpretation
            | AiContentKind::DataAnalysisInterpretation => HistorySection::ContentInterpretation,
            AiContentKind::Other => HistorySection::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HistorySection {
    #[serde(rename = "Query & Analysis")]
    QueryAndAnalysis,
    #[serde(rename = "Data Visualization")]
    DataVisualization,
    #[serde(rename = "SPARQL & Database")]
    SparqlAndDatabase,
    #[serde(rename = "Content Interpretation")]
    ContentInterpretation,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiHistoryItem {
    pub id: String,
    pub timestamp: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: AiContentKind,
    pub title: String,
    /// Older entries may lack a section; it is derived from the kind.
    #[serde(default)]
    pub section: Option<HistorySection>,
}

impl AiHistoryItem {
    pub fn section(&self) -> HistorySection {
        self.section.unwrap_or_else(|| self.kind.section())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Newest,
    Oldest,
    Alphabetical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryPreferences {
    pub max_history_items: usize,
    pub enable_auto_save: bool,
    pub categorize_by_section: bool,
    pub default_sort_order: SortOrder,
    pub enable_search: bool,
    pub compact_view: bool,
}

impl Default for HistoryPreferences {
    fn default() -> Self {
        Self {
            max_history_items: 100,
            enable_auto_save: true,
            categorize_by_section: true,
            default_sort_order: SortOrder::Newest,
            enable_search: true,
            compact_view: false,
        }
    }
}

/// `dynamicAI_history`: newest first, at most [`MAX_AI_HISTORY`] items.
pub struct AiHistory {
    store: Arc<LocalStore>,
    items: RwLock<Vec<AiHistoryItem>>,
}

impl AiHistory {
    pub async fn load(store: Arc<LocalStore>) -> Self {
        let items = store.load(AI_HISTORY_KEY).await;
        Self { store, items: RwLock::new(items) }
    }

    pub async fn items(&self) -> Vec<AiHistoryItem> {
        self.items.read().await.clone()
    }

    pub async fn add(
        &self,
        kind: AiContentKind,
        content: impl Into<String>,
        title: impl Into<String>,
        section: Option<HistorySection>,
    ) -> Result<AiHistoryItem> {
        let now = chrono::Utc::now().timestamp_millis();
        let item = AiHistoryItem {
            id: now.to_string(),
            timestamp: now,
            content: content.into(),
            kind,
            title: title.into(),
            section: Some(section.unwrap_or_else(|| kind.section())),
        };
        let mut items = self.items.write().await;
        items.insert(0, item.clone());
        items.truncate(MAX_AI_HISTORY);
        self.store.save(AI_HISTORY_KEY, &*items).await?;
        Ok(item)
    }

    pub async fn by_type(&self, kind: AiContentKind) -> Vec<AiHistoryItem> {
        self.items.read().await.iter().filter(|i| i.kind == kind).cloned().collect()
    }

    pub async fn by_section(&self, section: HistorySection) -> Vec<AiHistoryItem> {
        self.items.read().await.iter().filter(|i| i.section() == section).cloned().collect()
    }

    /// Case-insensitive match over title, content, type and section.
    pub async fn search(&self, term: &str) -> Vec<AiHistoryItem> {
        let needle = term.to_lowercase();
        self.items
            .read()
            .await
            .iter()
            .filter(|i| {
                let kind = serde_json::to_value(i.kind).ok();
                let section = serde_json::to_value(i.section()).ok();
                i.title.to_lowercase().contains(&needle)
                    || i.content.to_lowercase().contains(&needle)
                    || [kind, section]
                        .iter()
                        .flatten()
                        .filter_map(Value::as_str)
                        .any(|s| s.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub async fn remove(&self, kind: AiContentKind, id: &str) -> Result<()> {
        self.retain(|i| !(i.kind == kind && i.id == id)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.retain(|_| false).await
    }

    pub async fn clear_by_section(&self, section: HistorySection) -> Result<()> {
        self.retain(|i| i.section() != section).await
    }

    pub async fn clear_by_type(&self, kind: AiContentKind) -> Result<()> {
        self.retain(|i| i.kind != kind).await
    }

    async fn retain(&self, keep: impl Fn(&AiHistoryItem) -> bool) -> Result<()> {
        let mut items = self.items.write().await;
        items.retain(|i| keep(i));
        self.store.save(AI_HISTORY_KEY, &*items).await
    }

    pub async fn preferences(&self) -> HistoryPreferences {
        self.store.load(AI_HISTORY_PREFERENCES_KEY).await
    }

    pub async fn set_preferences(&self, preferences: &HistoryPreferences) -> Result<()> {
        self.store.save(AI_HISTORY_PREFERENCES_KEY, preferences).await
    }
}

// ---------------------------------------------------------------------------
// Questionnaire AI history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionnaireEntryType {
    Suggestion,
    Verification,
    Answer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionnaireAction {
    Generated,
    Applied,
    Verified,
    Edited,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireHistoryItem {
    pub id: String,
    pub timestamp: i64,
    pub question_id: String,
    pub question_text: String,
    #[serde(rename = "type")]
    pub kind: QuestionnaireEntryType,
    pub action: QuestionnaireAction,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Fields supplied by the caller; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewQuestionnaireEntry {
    pub question_id: String,
    pub question_text: String,
    pub kind: QuestionnaireEntryType,
    pub action: QuestionnaireAction,
    pub content: String,
    pub prompt: Option<String>,
    pub previous_content: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct QuestionnaireState {
    history: Vec<QuestionnaireHistoryItem>,
}

/// `questionnaire-ai-history`: appended in insertion order.
pub struct QuestionnaireHistory {
    store: Arc<LocalStore>,
    state: RwLock<QuestionnaireState>,
}

impl QuestionnaireHistory {
    pub async fn load(store: Arc<LocalStore>) -> Self {
        let state = store.load(QUESTIONNAIRE_HISTORY_KEY).await;
        Self { store, state: RwLock::new(state) }
    }

    pub async fn items(&self) -> Vec<QuestionnaireHistoryItem> {
        self.state.read().await.history.clone()
    }

    /// Returns the new entry's id.
    pub async fn add(&self, entry: NewQuestionnaireEntry) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let id = format!("qai_history_{}_{}", timestamp, random_suffix(9));
        let item = QuestionnaireHistoryItem {
            id: id.clone(),
            timestamp,
            question_id: entry.question_id,
            question_text: entry.question_text,
            kind: entry.kind,
            action: entry.action,
            content: entry.content,
            prompt: entry.prompt,
            previous_content: entry.previous_content,
            metadata: entry.metadata,
        };
        self.mutate(|s| s.history.push(item)).await?;
        Ok(id)
    }

    /// Merge `metadata` into the entry's existing metadata.
    pub async fn update_metadata(&self, id: &str, metadata: Map<String, Value>) -> Result<()> {
        self.mutate(|s| {
            if let Some(item) = s.history.iter_mut().find(|i| i.id == id) {
                item.metadata.get_or_insert_with(Map::new).extend(metadata);
            }
        })
        .await
    }

    /// Newest first.
    pub async fn by_question(&self, question_id: &str) -> Vec<QuestionnaireHistoryItem> {
        let mut items: Vec<_> = self
            .state
            .read()
            .await
            .history
            .iter()
            .filter(|i| i.question_id == question_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items
    }

    pub async fn by_type(&self, kind: QuestionnaireEntryType) -> Vec<QuestionnaireHistoryItem> {
        self.state.read().await.history.iter().filter(|i| i.kind == kind).cloned().collect()
    }

    pub async fn clear(&self) -> Result<()> {
        self.mutate(|s| s.history.clear()).await
    }

    pub async fn clear_for_question(&self, question_id: &str) -> Result<()> {
        self.mutate(|s| s.history.retain(|i| i.question_id != question_id)).await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.mutate(|s| s.history.retain(|i| i.id != id)).await
    }

    pub async fn remove_many(&self, ids: &[String]) -> Result<()> {
        self.mutate(|s| s.history.retain(|i| !ids.contains(&i.id))).await
    }

    /// Drop all history and the persisted key.
    pub async fn reset(&self) -> Result<()> {
        *self.state.write().await = QuestionnaireState::default();
        self.store.remove(QUESTIONNAIRE_HISTORY_KEY).await
    }

    async fn mutate(&self, f: impl FnOnce(&mut QuestionnaireState)) -> Result<()> {
        let mut state = self.state.write().await;
        f(&mut state);
        self.store.save(QUESTIONNAIRE_HISTORY_KEY, &*state).await
    }
}
