//! Whole-store backup and restore.
//!
//! A backup is `{ metadata: { timestamp, collectionsCount, documentsCount }, data: { Collection: [ {id, ...} ] } }`.
//! Template documents carry their `Questions` and `Statistics` subcollections inline as arrays.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::document::{Document, DocumentStore, ListOptions};
use crate::error::{Result, StoreError};
use crate::statistics::TEMPLATES;

pub const BACKUP_COLLECTIONS: &[&str] = &[
    "Templates",
    "Users",
    "HomeContent",
    "FirebaseRequestLogs",
    "Team",
    "DynamicQuestions",
    "CommunityQuestions",
    "QuestionOverrides",
];

const TEMPLATE_SUBCOLLECTIONS: &[(&str, &str)] = &[("Questions", "query"), ("Statistics", "stat")];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub timestamp: String,
    /// Collections that contained at least one document.
    pub collections_count: usize,
    pub documents_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Backup {
    pub metadata: BackupMetadata,
    pub data: BTreeMap<String, Vec<Document>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub success: bool,
    pub collections_restored: usize,
    pub documents_restored: usize,
    pub timestamp: String,
}

#[derive(Clone)]
pub struct BackupService {
    store: Arc<dyn DocumentStore>,
}

impl BackupService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Snapshot every backed-up collection. A collection that fails to list is recorded as empty.
    pub async fn backup(&self) -> Backup {
        let mut data = BTreeMap::new();
        let mut collections_count = 0;
        let mut documents_count = 0;

        for &name in BACKUP_COLLECTIONS {
            let documents = match self.backup_collection(name).await {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(collection = name, error = %e, "Skipping collection in backup");
                    Vec::new()
                }
            };
            if !documents.is_empty() {
                collections_count += 1;
            }
            documents_count += documents.len();
            data.insert(name.to_string(), documents);
        }

        info!(collections = collections_count, documents = documents_count, "Backup complete");
        Backup {
            metadata: BackupMetadata {
                timestamp: chrono::Utc::now().to_rfc3339(),
                collections_count,
                documents_count,
            },
            data,
        }
    }

    async fn backup_collection(&self, name: &str) -> Result<Vec<Document>> {
        let docs = self.store.list(name, &ListOptions::default()).await?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.id.clone();
            let mut flat = Document::new();
            flat.insert("id".into(), Value::String(id.clone()));
            flat.extend(doc.data.into_iter().filter(|(k, _)| k != "id"));

            if name == TEMPLATES {
                for (sub, _) in TEMPLATE_SUBCOLLECTIONS {
                    let path = format!("{TEMPLATES}/{id}/{sub}");
                    match self.store.list(&path, &ListOptions::default()).await {
                        Ok(nested) => {
                            let nested: Vec<Value> =
                                nested.into_iter().map(|d| Value::Object(d.into_flat())).collect();
                            flat.insert((*sub).to_string(), Value::Array(nested));
                        }
                        Err(e) => warn!(path = %path, error = %e, "Skipping subcollection in backup"),
                    }
                }
            }
            out.push(flat);
        }
        Ok(out)
    }

    /// Restore from a backup file body, either the metadata wrapper or a bare collection map.
    ///
    /// Documents are written without merge; entries lacking an `id` are skipped.
    pub async fn restore(&self, content: &Value) -> Result<RestoreSummary> {
        let collections = parse_backup(content)?;
        let mut collections_restored = 0;
        let mut documents_restored = 0;

        for (name, documents) in collections {
            let Some(documents) = documents.as_array() else {
                continue;
            };
            if documents.is_empty() {
                continue;
            }
            documents_restored += if name == TEMPLATES {
                self.restore_templates(documents).await?
            } else {
                self.restore_flat(name, documents).await?
            };
            collections_restored += 1;
        }

        info!(collections = collections_restored, documents = documents_restored, "Restore complete");
        Ok(RestoreSummary {
            success: true,
            collections_restored,
            documents_restored,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn restore_flat(&self, collection: &str, documents: &[Value]) -> Result<usize> {
        let mut restored = 0;
        for doc in documents {
            let Some(obj) = doc.as_object() else { continue };
            let Some(id) = obj.get("id").and_then(id_string) else { continue };
            self.store.set(collection, &id, without(obj, &["id"]), false).await?;
            restored += 1;
        }
        Ok(restored)
    }

    async fn restore_templates(&self, documents: &[Value]) -> Result<usize> {
        let mut excluded = vec!["id"];
        excluded.extend(TEMPLATE_SUBCOLLECTIONS.iter().map(|(sub, _)| *sub));

        let mut restored = 0;
        for doc in documents {
            let Some(obj) = doc.as_object() else { continue };
            let Some(template_id) = obj.get("id").and_then(id_string) else { continue };

            self.store.set(TEMPLATES, &template_id, without(obj, &excluded), false).await?;
            restored += 1;

            for (sub, fallback) in TEMPLATE_SUBCOLLECTIONS {
                let Some(nested) = obj.get(*sub).and_then(Value::as_array) else { continue };
                let path = format!("{TEMPLATES}/{template_id}/{sub}");
                for (i, item) in nested.iter().enumerate() {
                    let Some(item) = item.as_object() else { continue };
                    let id = item
                        .get("id")
                        .and_then(id_string)
                        .or_else(|| item.get("uid").and_then(id_string))
                        .unwrap_or_else(|| format!("{fallback}_{i}"));
                    self.store.set(&path, &id, without(item, &["id"]), false).await?;
                    restored += 1;
                }
            }
        }
        Ok(restored)
    }
}

fn parse_backup(content: &Value) -> Result<&serde_json::Map<String, Value>> {
    match content {
        Value::Object(map) => match map.get("data") {
            Some(Value::Object(data)) => Ok(data),
            _ => Ok(map),
        },
        _ => Err(StoreError::InvalidBackup),
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn without(doc: &Document, fields: &[&str]) -> Document {
    doc.iter()
        .filter(|(k, _)| !fields.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_backup_nests_template_subcollections() {
        let store = Arc::new(MemoryStore::new());
        store.set("Templates", "R186491", doc(json!({"title": "KG-EmpiRE"})), false).await.unwrap();
        store.set("Templates/R186491/Questions", "q1", doc(json!({"uid": "q1"})), false).await.unwrap();
        store.set("Users", "u1", doc(json!({"email": "a@b.c"})), false).await.unwrap();

        let backup = BackupService::new(store).backup().await;
        assert_eq!(backup.metadata.collections_count, 2);
        assert_eq!(backup.metadata.documents_count, 2);
        assert!(backup.data["Team"].is_empty());

        let template = &backup.data["Templates"][0];
        assert_eq!(template["id"], "R186491");
        assert_eq!(template["Questions"], json!([{"id": "q1", "uid": "q1"}]));
        assert_eq!(template["Statistics"], json!([]));
    }

    #[tokio::test]
    async fn test_backup_then_restore_into_empty_store() {
        let source = Arc::new(MemoryStore::new());
        source.set("Templates", "R1", doc(json!({"title": "T"})), false).await.unwrap();
        source.set("Templates/R1/Statistics", "empire-statistics", doc(json!({"paperCount": 4})), false).await.unwrap();
        source.set("DynamicQuestions", "d1", doc(json!({"name": "n"})), false).await.unwrap();
        let backup = serde_json::to_value(BackupService::new(source).backup().await).unwrap();

        let target = Arc::new(MemoryStore::new());
        let summary = BackupService::new(target.clone()).restore(&backup).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.collections_restored, 2);
        assert_eq!(summary.documents_restored, 3);

        let template = target.get("Templates", "R1").await.unwrap().unwrap();
        assert_eq!(Value::Object(template), json!({"title": "T"}));
        let stats = target.get("Templates/R1/Statistics", "empire-statistics").await.unwrap().unwrap();
        assert_eq!(stats["paperCount"], 4);
    }

    #[tokio::test]
    async fn test_restore_bare_map_with_fallback_ids() {
        let store = Arc::new(MemoryStore::new());
        let raw = json!({
            "Templates": [{"id": "R2", "Questions": [{"title": "no id"}, {"uid": "u9"}]}],
            "Team": [{"name": "skipped, no id"}, {"id": 7, "name": "numeric id"}]
        });
        let summary = BackupService::new(store.clone()).restore(&raw).await.unwrap();
        assert_eq!(summary.documents_restored, 4);
        assert!(store.get("Templates/R2/Questions", "query_0").await.unwrap().is_some());
        assert!(store.get("Templates/R2/Questions", "u9").await.unwrap().is_some());
        assert!(store.get("Team", "7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_restore_rejects_non_object() {
        let service = BackupService::new(Arc::new(MemoryStore::new()));
        let err = service.restore(&json!([1, 2])).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid backup file format");
    }
}
