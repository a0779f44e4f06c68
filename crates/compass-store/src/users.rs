//! User profiles (`Users/<id>`).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::document::{to_document, DocumentStore, StoredDocument};
use crate::error::{Result, StoreError};

pub const USERS: &str = "Users";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_curation_allowed: bool,
    #[serde(default)]
    pub observatory_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &str) -> Result<Option<UserProfile>> {
        match self.store.get(USERS, id).await? {
            Some(data) => Ok(Some(StoredDocument { id: id.to_string(), data }.parse()?)),
            None => Ok(None),
        }
    }

    /// Create or refresh a profile after sign-in.
    ///
    /// The admin flag follows `admin_emails` on every sync; curation rights are never touched
    /// for existing users.
    pub async fn sync_user(
        &self,
        id: &str,
        email: &str,
        display_name: Option<&str>,
        admin_emails: &[String],
    ) -> Result<UserProfile> {
        let now = chrono::Utc::now().to_rfc3339();
        let is_admin = admin_emails.iter().any(|a| a.eq_ignore_ascii_case(email));

        match self.get(id).await? {
            Some(_) => {
                let patch = json!({
                    "email": email,
                    "display_name": display_name,
                    "last_login": now,
                    "is_admin": is_admin,
                });
                if let Value::Object(patch) = patch {
                    self.store.set(USERS, id, patch, true).await?;
                }
            }
            None => {
                let profile = UserProfile {
                    id: id.to_string(),
                    email: email.to_string(),
                    display_name: display_name.map(String::from),
                    created_at: Some(now.clone()),
                    last_login: Some(now),
                    is_admin,
                    is_curation_allowed: false,
                    observatory_id: None,
                    organization_id: None,
                };
                self.store.set(USERS, id, to_document(&profile)?, false).await?;
                info!(user = id, is_admin, "Created user profile");
            }
        }

        self.get(id).await?.ok_or_else(|| StoreError::NotFound(format!("{USERS}/{id}")))
    }

    /// Only an explicit `is_admin: true` grants admin.
    pub async fn is_admin(&self, id: &str) -> Result<bool> {
        Ok(self
            .store
            .get(USERS, id)
            .await?
            .and_then(|doc| doc.get("is_admin").and_then(Value::as_bool))
            .unwrap_or(false))
    }
}
