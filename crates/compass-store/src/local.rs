//! Local key/value state: one JSON file per key under a state directory.
//!
//! Values are loaded optimistically (unreadable or invalid content falls back to the default)
//! and fully overwritten on every change.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use compass_common::entities::random_suffix;
use compass_common::DynamicQuestionState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::document::validate_id;
use crate::error::{Result, StoreError};

pub const SAVED_QUESTIONS_KEY: &str = "saved-dynamic-questions";

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        validate_id(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    pub async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let path = match self.path(key) {
            Ok(path) => path,
            Err(e) => {
                warn!(key, error = %e, "Invalid state key");
                return T::default();
            }
        };
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(key, error = %e, "Discarding unreadable local state");
                T::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => T::default(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read local state");
                T::default()
            }
        }
    }

    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        fs::rename(&tmp, &path).await?;
        debug!(key, "Local state saved");
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Saved questions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedQuestion {
    pub id: String,
    pub name: String,
    pub timestamp: i64,
    pub state: DynamicQuestionState,
}

/// Named snapshots of dynamic-question state, kept in save order.
pub struct SavedQuestions {
    store: Arc<LocalStore>,
    items: RwLock<Vec<SavedQuestion>>,
}

impl SavedQuestions {
    pub async fn load(store: Arc<LocalStore>) -> Self {
        let items = store.load(SAVED_QUESTIONS_KEY).await;
        Self { store, items: RwLock::new(items) }
    }

    pub async fn list(&self) -> Vec<SavedQuestion> {
        self.items.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<SavedQuestion> {
        self.items.read().await.iter().find(|q| q.id == id).cloned()
    }

    pub async fn save(&self, name: &str, state: &DynamicQuestionState) -> Result<SavedQuestion> {
        if state.question.trim().is_empty() {
            return Err(StoreError::Invalid(
                "No question to save. Please enter a research question first.".into(),
            ));
        }
        if name.trim().is_empty() {
            return Err(StoreError::Invalid("Please enter a name for this saved question.".into()));
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        let saved = SavedQuestion {
            id: format!("question_{}_{}", timestamp, random_suffix(9)),
            name: name.trim().to_string(),
            timestamp,
            state: state.clone(),
        };

        let mut items = self.items.write().await;
        items.push(saved.clone());
        self.store.save(SAVED_QUESTIONS_KEY, &*items).await?;
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|q| q.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.store.save(SAVED_QUESTIONS_KEY, &*items).await?;
        Ok(true)
    }
}
