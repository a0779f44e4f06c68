//! Filesystem-backed document store: one pretty-printed JSON file per document.
//!
//! `Templates/R1/Statistics/empire-statistics` lives at
//! `<root>/Templates/R1/Statistics/empire-statistics.json`, so a document file and the
//! directory holding its subcollections sit side by side.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::document::{
    apply_list_options, merge_documents, validate_collection, validate_id, Document, DocumentStore, ListOptions,
    StoredDocument,
};
use crate::error::Result;

pub struct FileStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles for merges.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, write_lock: Mutex::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        collection.split('/').fold(self.root.clone(), |dir, seg| dir.join(seg))
    }

    fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{id}.json"))
    }

    async fn read_document(path: &Path) -> Result<Option<Document>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        validate_collection(collection)?;
        validate_id(id)?;
        Self::read_document(&self.document_path(collection, id)).await
    }

    async fn set(&self, collection: &str, id: &str, data: Document, merge: bool) -> Result<()> {
        validate_collection(collection)?;
        validate_id(id)?;
        let _guard = self.write_lock.lock().await;

        let path = self.document_path(collection, id);
        let data = match (merge, Self::read_document(&path).await?) {
            (true, Some(mut existing)) => {
                merge_documents(&mut existing, data);
                existing
            }
            _ => data,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        // Readers never observe a partially written document.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&data)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        validate_collection(collection)?;
        validate_id(id)?;
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.document_path(collection, id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, collection: &str, opts: &ListOptions) -> Result<Vec<StoredDocument>> {
        validate_collection(collection)?;
        let dir = self.collection_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match Self::read_document(&path).await {
                Ok(Some(data)) => docs.push(StoredDocument { id, data }),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }
        Ok(apply_list_options(docs, opts))
    }

    async fn list_collections(&self, collection: &str, id: &str) -> Result<Vec<String>> {
        validate_collection(collection)?;
        validate_id(id)?;
        let dir = self.collection_dir(collection).join(id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_documents_persist_across_instances() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(tmp.path()).await.unwrap();
            store
                .set("Templates/R186491/Statistics", "empire-statistics", doc(json!({"paperCount": 2})), false)
                .await
                .unwrap();
        }
        let store = FileStore::open(tmp.path()).await.unwrap();
        let stats = store.get("Templates/R186491/Statistics", "empire-statistics").await.unwrap().unwrap();
        assert_eq!(stats["paperCount"], 2);
        assert!(tmp.path().join("Templates/R186491/Statistics/empire-statistics.json").exists());
        assert_eq!(store.list_collections("Templates", "R186491").await.unwrap(), vec!["Statistics"]);
    }

    #[tokio::test]
    async fn test_merge_and_list() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path()).await.unwrap();
        store.set("DynamicQuestions", "q1", doc(json!({"name": "a", "timestamp": 1})), false).await.unwrap();
        store.set("DynamicQuestions", "q2", doc(json!({"name": "b", "timestamp": 5})), false).await.unwrap();
        store.set("DynamicQuestions", "q1", doc(json!({"timestamp": 9})), true).await.unwrap();

        let listed = store.list("DynamicQuestions", &ListOptions::newest_first("timestamp")).await.unwrap();
        assert_eq!(listed[0].id, "q1");
        assert_eq!(listed[0].data["name"], "a");
        assert_eq!(listed.len(), 2);

        assert!(store.delete("DynamicQuestions", "q2").await.unwrap());
        assert_eq!(store.list("DynamicQuestions", &ListOptions::default()).await.unwrap().len(), 1);
        assert!(store.list("Nothing", &ListOptions::default()).await.unwrap().is_empty());
    }
}
