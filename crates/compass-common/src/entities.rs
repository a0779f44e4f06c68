/// Core entity types shared by the query pipeline, the document store and the web layer.
/// Field names serialize in camelCase so state written by the browser client stays loadable.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One result row: a SPARQL binding flattened to `{ variable: value }`.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Question,
    Sparql,
    Chart,
    Analysis,
    Processing,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Question => "question",
            HistoryKind::Sparql => "sparql",
            HistoryKind::Chart => "chart",
            HistoryKind::Analysis => "analysis",
            HistoryKind::Processing => "processing",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Generated,
    Edited,
    AiModified,
}

impl HistoryAction {
    /// `ai_modified` when the change was driven by a prompt, `edited` otherwise.
    pub fn for_prompt(prompt: Option<&str>) -> Self {
        match prompt {
            Some(p) if !p.is_empty() => HistoryAction::AiModified,
            _ => HistoryAction::Edited,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub action: HistoryAction,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_content: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        kind: HistoryKind,
        action: HistoryAction,
        content: impl Into<String>,
        prompt: Option<String>,
        previous_content: Option<String>,
    ) -> Self {
        let timestamp = Utc::now().timestamp_millis();
        Self {
            id: format!("history_{}_{}", timestamp, random_suffix(9)),
            timestamp,
            kind,
            action,
            content: content.into(),
            prompt,
            previous_content,
        }
    }
}

/// Lowercase alphanumeric suffix used in generated ids.
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Dynamic question state
// ---------------------------------------------------------------------------

/// Everything the user has built for one dynamic question.
///
/// Stored documents may carry `null` for any field; those load as the default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicQuestionState {
    #[serde(deserialize_with = "nullable")]
    pub question: String,
    #[serde(deserialize_with = "nullable")]
    pub sparql_query: String,
    #[serde(deserialize_with = "nullable")]
    pub query_results: Vec<Row>,
    /// Opaque chart markup; never interpreted server-side.
    #[serde(deserialize_with = "nullable")]
    pub chart_html: String,
    #[serde(deserialize_with = "nullable")]
    pub question_interpretation: String,
    #[serde(deserialize_with = "nullable")]
    pub data_collection_interpretation: String,
    #[serde(deserialize_with = "nullable")]
    pub data_analysis_interpretation: String,
    #[serde(deserialize_with = "nullable")]
    pub processing_function_code: String,
    #[serde(deserialize_with = "nullable")]
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_class_id: Option<String>,
    /// Predicate mapping the question was generated against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_mapping: Option<serde_json::Value>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DynamicQuestionState {
    pub fn history_by_kind(&self, kind: HistoryKind) -> Vec<&HistoryEntry> {
        self.history.iter().filter(|h| h.kind == kind).collect()
    }
}

// ---------------------------------------------------------------------------
// Stored dynamic question
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DynamicQuestion {
    pub id: String,
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub state: DynamicQuestionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default)]
    pub is_community: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_history_entry_id_shape() {
        let entry = HistoryEntry::new(HistoryKind::Sparql, HistoryAction::Generated, "SELECT", None, None);
        assert!(entry.id.starts_with("history_"));
        assert_eq!(entry.id.split('_').count(), 3);
    }

    #[test]
    fn test_action_for_prompt() {
        assert_eq!(HistoryAction::for_prompt(Some("make it better")), HistoryAction::AiModified);
        assert_eq!(HistoryAction::for_prompt(Some("")), HistoryAction::Edited);
        assert_eq!(HistoryAction::for_prompt(None), HistoryAction::Edited);
    }

    #[test]
    fn test_state_loads_with_missing_fields() {
        let state: DynamicQuestionState =
            serde_json::from_str(r#"{"question":"How many papers?","history":[]}"#).unwrap();
        assert_eq!(state.question, "How many papers?");
        assert!(state.sparql_query.is_empty());
        assert!(state.query_results.is_empty());
    }

    #[test]
    fn test_state_tolerates_nulls() {
        let state: DynamicQuestionState = serde_json::from_str(
            r#"{"question":"Q","chartHtml":null,"queryResults":null,"history":null,"templateId":"R186491"}"#,
        )
        .unwrap();
        assert!(state.chart_html.is_empty());
        assert!(state.history.is_empty());
        assert_eq!(state.template_id.as_deref(), Some("R186491"));
    }

    #[test]
    fn test_history_entry_wire_names() {
        let entry = HistoryEntry {
            id: "history_1_abc".into(),
            timestamp: 1,
            kind: HistoryKind::Processing,
            action: HistoryAction::AiModified,
            content: "function processData(r) { return r; }".into(),
            prompt: Some("p".into()),
            previous_content: Some("old".into()),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "processing");
        assert_eq!(json["action"], "ai_modified");
        assert_eq!(json["previousContent"], "old");
    }
}
