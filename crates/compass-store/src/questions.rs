//! Dynamic question repository.
//!
//! Curated examples live in `DynamicQuestions`, user submissions in `CommunityQuestions`.

use std::sync::Arc;

use compass_common::entities::{random_suffix, DynamicQuestion};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::document::{to_document, DocumentStore, ListOptions};
use crate::error::{Result, StoreError};

pub const DYNAMIC_QUESTIONS: &str = "DynamicQuestions";
pub const COMMUNITY_QUESTIONS: &str = "CommunityQuestions";
pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub success: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct DynamicQuestionRepository {
    store: Arc<dyn DocumentStore>,
}

impl DynamicQuestionRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn collection(is_community: bool) -> &'static str {
        if is_community {
            COMMUNITY_QUESTIONS
        } else {
            DYNAMIC_QUESTIONS
        }
    }

    /// Newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<DynamicQuestion>> {
        self.list_from(DYNAMIC_QUESTIONS, limit).await
    }

    pub async fn list_community(&self, limit: usize) -> Result<Vec<DynamicQuestion>> {
        self.list_from(COMMUNITY_QUESTIONS, limit).await
    }

    async fn list_from(&self, collection: &str, limit: usize) -> Result<Vec<DynamicQuestion>> {
        let docs = self
            .store
            .list(collection, &ListOptions::newest_first("timestamp").limit(limit))
            .await?;
        let mut questions = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.id.clone();
            match doc.parse::<DynamicQuestion>() {
                Ok(q) => questions.push(q),
                Err(e) => warn!(collection, id = %id, error = %e, "Skipping malformed question"),
            }
        }
        Ok(questions)
    }

    /// Template id is read from the root field, falling back to the one inside the state.
    pub async fn list_by_template(&self, template_id: &str, limit: usize) -> Result<Vec<DynamicQuestion>> {
        Ok(self
            .list(limit)
            .await?
            .into_iter()
            .filter(|q| q.template_id.as_deref().or(q.state.template_id.as_deref()) == Some(template_id))
            .collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<DynamicQuestion>> {
        self.get_in(id, false).await
    }

    pub async fn get_in(&self, id: &str, is_community: bool) -> Result<Option<DynamicQuestion>> {
        match self.store.get(Self::collection(is_community), id).await? {
            Some(data) => Ok(Some(crate::document::StoredDocument { id: id.to_string(), data }.parse()?)),
            None => Ok(None),
        }
    }

    /// Merge-save into the collection selected by `is_community`. Returns the document id.
    pub async fn save(&self, question: &DynamicQuestion) -> Result<String> {
        let id = if question.id.trim().is_empty() {
            format!("question_{}_{}", chrono::Utc::now().timestamp_millis(), random_suffix(9))
        } else {
            question.id.clone()
        };

        let mut data = to_document(question)?;
        data.remove("id");
        let template_id = question.state.template_id.clone().or_else(|| question.template_id.clone());
        data.insert("templateId".into(), template_id.map(Value::String).unwrap_or(Value::Null));

        self.store.set(Self::collection(question.is_community), &id, data, true).await?;
        Ok(id)
    }

    pub async fn delete(&self, id: &str, is_community: bool) -> Result<bool> {
        self.store.delete(Self::collection(is_community), id).await
    }

    /// Import an exported JSON array. Entries that fail to parse or save are counted, not fatal.
    pub async fn import(&self, payload: &Value) -> Result<ImportSummary> {
        let items = payload
            .as_array()
            .ok_or_else(|| StoreError::Invalid("Import payload must be a JSON array of questions".into()))?;

        let mut summary = ImportSummary::default();
        for item in items {
            let saved = match serde_json::from_value::<DynamicQuestion>(item.clone()) {
                Ok(q) => self.save(&q).await.map(|_| ()),
                Err(e) => Err(e.into()),
            };
            match saved {
                Ok(()) => summary.success += 1,
                Err(e) => {
                    warn!(id = ?item.get("id"), error = %e, "Failed to import question");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use compass_common::DynamicQuestionState;
    use serde_json::json;

    fn question(id: &str, ts: i64, community: bool, template: Option<&str>) -> DynamicQuestion {
        DynamicQuestion {
            id: id.into(),
            name: format!("Question {id}"),
            timestamp: ts,
            state: DynamicQuestionState {
                question: "How many papers?".into(),
                template_id: template.map(String::from),
                ..Default::default()
            },
            template_id: None,
            is_community: community,
            created_by: None,
            creator_name: None,
        }
    }

    #[tokio::test]
    async fn test_save_routes_by_community_flag() {
        let store = Arc::new(MemoryStore::new());
        let repo = DynamicQuestionRepository::new(store.clone());
        repo.save(&question("q1", 1, false, Some("R186491"))).await.unwrap();
        repo.save(&question("c1", 2, true, None)).await.unwrap();

        assert_eq!(repo.list(50).await.unwrap().len(), 1);
        let community = repo.list_community(50).await.unwrap();
        assert_eq!(community[0].id, "c1");

        let raw = store.get(DYNAMIC_QUESTIONS, "q1").await.unwrap().unwrap();
        assert_eq!(raw["templateId"], "R186491");
        assert!(raw.get("id").is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_and_by_template() {
        let repo = DynamicQuestionRepository::new(Arc::new(MemoryStore::new()));
        repo.save(&question("old", 1, false, Some("R186491"))).await.unwrap();
        repo.save(&question("new", 9, false, Some("R1544125"))).await.unwrap();

        let all = repo.list(50).await.unwrap();
        assert_eq!(all[0].id, "new");
        assert_eq!(repo.list(1).await.unwrap().len(), 1);

        let empire = repo.list_by_template("R186491", 50).await.unwrap();
        assert_eq!(empire.len(), 1);
        assert_eq!(empire[0].id, "old");
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let repo = DynamicQuestionRepository::new(Arc::new(MemoryStore::new()));
        repo.save(&question("q1", 1, false, None)).await.unwrap();
        assert_eq!(repo.get("q1").await.unwrap().unwrap().state.question, "How many papers?");
        assert!(repo.delete("q1", false).await.unwrap());
        assert!(repo.get("q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_counts_failures() {
        let repo = DynamicQuestionRepository::new(Arc::new(MemoryStore::new()));
        let payload = json!([
            {"id": "a", "name": "A", "timestamp": 1, "state": {"question": "Q", "chartHtml": null}},
            {"id": "b", "name": "B"},
            {"id": "c", "name": "C", "timestamp": 2, "isCommunity": true, "state": {}}
        ]);
        let summary = repo.import(&payload).await.unwrap();
        assert_eq!(summary, ImportSummary { success: 2, failed: 1 });
        assert!(repo.import(&json!({"not": "an array"})).await.is_err());
    }
}
