//! In-process document store, used for tests and ephemeral deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{
    apply_list_options, merge_documents, validate_collection, validate_id, Document, DocumentStore, ListOptions,
    StoredDocument,
};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryStore {
    /// collection path → id → document
    collections: RwLock<BTreeMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        validate_collection(collection)?;
        validate_id(id)?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn set(&self, collection: &str, id: &str, data: Document, merge: bool) -> Result<()> {
        validate_collection(collection)?;
        validate_id(id)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => merge_documents(existing, data),
            _ => {
                docs.insert(id.to_string(), data);
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        validate_collection(collection)?;
        validate_id(id)?;
        let mut collections = self.collections.write().await;
        Ok(collections.get_mut(collection).and_then(|c| c.remove(id)).is_some())
    }

    async fn list(&self, collection: &str, opts: &ListOptions) -> Result<Vec<StoredDocument>> {
        validate_collection(collection)?;
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| StoredDocument { id: id.clone(), data: data.clone() })
                    .collect()
            })
            .unwrap_or_default();
        Ok(apply_list_options(docs, opts))
    }

    async fn list_collections(&self, collection: &str, id: &str) -> Result<Vec<String>> {
        validate_collection(collection)?;
        validate_id(id)?;
        let prefix = format!("{collection}/{id}/");
        let collections = self.collections.read().await;
        Ok(collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .filter_map(|(path, _)| path.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}
