//! The working state of the dynamic question being edited.
//!
//! Every change is persisted to the `current-dynamic-question` key and published to
//! subscribers through a `watch` channel.

use std::sync::Arc;

use compass_common::{DynamicQuestionState, HistoryAction, HistoryEntry, HistoryKind, Row};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::error::Result;
use crate::local::LocalStore;

pub const CURRENT_QUESTION_KEY: &str = "current-dynamic-question";

type Field = fn(&mut DynamicQuestionState) -> &mut String;

pub struct DynamicQuestionSession {
    store: Arc<LocalStore>,
    state: watch::Sender<DynamicQuestionState>,
    /// Keeps the persisted copy in the same order as in-memory changes.
    persist: Mutex<()>,
}

impl DynamicQuestionSession {
    /// Resume the last persisted state, or start empty.
    pub async fn load(store: Arc<LocalStore>) -> Self {
        let initial: DynamicQuestionState = store.load(CURRENT_QUESTION_KEY).await;
        let (state, _) = watch::channel(initial);
        Self { store, state, persist: Mutex::new(()) }
    }

    pub fn subscribe(&self) -> watch::Receiver<DynamicQuestionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DynamicQuestionState {
        self.state.borrow().clone()
    }

    async fn apply(&self, f: impl FnOnce(&mut DynamicQuestionState)) -> Result<()> {
        let _guard = self.persist.lock().await;
        self.state.send_modify(f);
        let snapshot = self.snapshot();
        self.store.save(CURRENT_QUESTION_KEY, &snapshot).await
    }

    async fn update_tracked(
        &self,
        kind: HistoryKind,
        field: Field,
        value: String,
        prompt: Option<String>,
    ) -> Result<()> {
        debug!(kind = kind.as_str(), "Updating dynamic question");
        self.apply(move |s| {
            let action = HistoryAction::for_prompt(prompt.as_deref());
            let previous = std::mem::replace(field(s), value.clone());
            s.history.push(HistoryEntry::new(kind, action, value, prompt, Some(previous)));
        })
        .await
    }

    pub async fn update_question(&self, question: impl Into<String>) -> Result<()> {
        let question = question.into();
        self.apply(move |s| {
            s.question = question.clone();
            s.history.push(HistoryEntry::new(HistoryKind::Question, HistoryAction::Edited, question, None, None));
        })
        .await
    }

    pub async fn update_sparql_query(&self, query: impl Into<String>, prompt: Option<String>) -> Result<()> {
        self.update_tracked(HistoryKind::Sparql, |s| &mut s.sparql_query, query.into(), prompt).await
    }

    /// Results are not tracked in history.
    pub async fn update_query_results(&self, rows: Vec<Row>) -> Result<()> {
        self.apply(move |s| s.query_results = rows).await
    }

    pub async fn update_chart_html(&self, html: impl Into<String>, prompt: Option<String>) -> Result<()> {
        self.update_tracked(HistoryKind::Chart, |s| &mut s.chart_html, html.into(), prompt).await
    }

    pub async fn update_question_interpretation(&self, text: impl Into<String>, prompt: Option<String>) -> Result<()> {
        self.update_tracked(HistoryKind::Analysis, |s| &mut s.question_interpretation, text.into(), prompt)
            .await
    }

    pub async fn update_data_collection_interpretation(
        &self,
        text: impl Into<String>,
        prompt: Option<String>,
    ) -> Result<()> {
        self.update_tracked(HistoryKind::Analysis, |s| &mut s.data_collection_interpretation, text.into(), prompt)
            .await
    }

    pub async fn update_data_analysis_interpretation(
        &self,
        text: impl Into<String>,
        prompt: Option<String>,
    ) -> Result<()> {
        self.update_tracked(HistoryKind::Analysis, |s| &mut s.data_analysis_interpretation, text.into(), prompt)
            .await
    }

    pub async fn update_processing_function_code(
        &self,
        code: impl Into<String>,
        prompt: Option<String>,
    ) -> Result<()> {
        self.update_tracked(HistoryKind::Processing, |s| &mut s.processing_function_code, code.into(), prompt)
            .await
    }

    /// Record which template the question targets. Not tracked in history.
    pub async fn set_template(
        &self,
        template_id: Option<String>,
        target_class_id: Option<String>,
        template_mapping: Option<serde_json::Value>,
    ) -> Result<()> {
        self.apply(move |s| {
            s.template_id = template_id;
            s.target_class_id = target_class_id;
            s.template_mapping = template_mapping;
        })
        .await
    }

    pub async fn add_to_history(
        &self,
        kind: HistoryKind,
        action: HistoryAction,
        content: impl Into<String>,
        prompt: Option<String>,
        previous_content: Option<String>,
    ) -> Result<HistoryEntry> {
        let entry = HistoryEntry::new(kind, action, content, prompt, previous_content);
        let pushed = entry.clone();
        self.apply(move |s| s.history.push(pushed)).await?;
        Ok(entry)
    }

    pub fn history_by_type(&self, kind: HistoryKind) -> Vec<HistoryEntry> {
        self.state.borrow().history_by_kind(kind).into_iter().cloned().collect()
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.apply(|s| s.history.clear()).await
    }

    pub async fn remove_from_history(&self, id: &str) -> Result<()> {
        self.apply(|s| s.history.retain(|h| h.id != id)).await
    }

    pub async fn remove_many_from_history(&self, ids: &[String]) -> Result<()> {
        self.apply(|s| s.history.retain(|h| !ids.contains(&h.id))).await
    }

    /// Back to an empty question; the persisted key is removed rather than overwritten.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.persist.lock().await;
        self.state.send_replace(DynamicQuestionState::default());
        self.store.remove(CURRENT_QUESTION_KEY).await
    }

    pub async fn load_saved_state(&self, saved: DynamicQuestionState) -> Result<()> {
        self.apply(move |s| *s = saved).await
    }
}
