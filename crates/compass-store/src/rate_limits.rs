//! Per-user AI request counters (`AIRateLimits/<userId>`).
//!
//! Each user gets a fixed window that opens with their first request. Once the window's
//! budget is spent further requests are refused until `reset_at`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::document::{to_document, DocumentStore, StoredDocument};
use crate::error::Result;

pub const AI_RATE_LIMITS: &str = "AIRateLimits";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    /// Zero disables limiting.
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window_hours: u32) -> Self {
        Self { max_requests, window: Duration::hours(window_hours.into()) }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(5, 24)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Counter {
    user_id: String,
    count: u32,
    reset_at: DateTime<Utc>,
    last_request_at: DateTime<Utc>,
}

/// Outcome of one [`AiRateLimitRepository::consume`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub struct AiRateLimitRepository {
    store: Arc<dyn DocumentStore>,
    policy: RateLimitPolicy,
    // Serializes read-modify-write of counters within this process.
    guard: Mutex<()>,
}

impl AiRateLimitRepository {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy, guard: Mutex::new(()) }
    }

    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.max_requests > 0
    }

    /// Count one request for `user_id` at `now`. A refused request is not counted.
    pub async fn consume(&self, user_id: &str, now: DateTime<Utc>) -> Result<RateLimitStatus> {
        let limit = self.policy.max_requests;
        let _held = self.guard.lock().await;

        let current = match self.store.get(AI_RATE_LIMITS, user_id).await? {
            Some(data) => Some(StoredDocument { id: user_id.to_string(), data }.parse::<Counter>()?),
            None => None,
        };

        let counter = match current {
            Some(c) if now < c.reset_at && c.count >= limit => {
                debug!(user = user_id, count = c.count, "AI request limit reached");
                return Ok(RateLimitStatus { allowed: false, limit, remaining: 0, reset_at: c.reset_at });
            }
            Some(c) if now < c.reset_at => Counter { count: c.count + 1, last_request_at: now, ..c },
            // First request, or the previous window has lapsed.
            _ => Counter {
                user_id: user_id.to_string(),
                count: 1,
                reset_at: now + self.policy.window,
                last_request_at: now,
            },
        };

        self.store.set(AI_RATE_LIMITS, user_id, to_document(&counter)?, false).await?;
        Ok(RateLimitStatus {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(counter.count),
            reset_at: counter.reset_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn repo(max_requests: u32) -> AiRateLimitRepository {
        AiRateLimitRepository::new(
            Arc::new(MemoryStore::new()),
            RateLimitPolicy { max_requests, window: Duration::hours(1) },
        )
    }

    #[tokio::test]
    async fn test_budget_is_spent_then_refused() {
        let limits = repo(2);
        let t0 = Utc::now();

        let first = limits.consume("u1", t0).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.reset_at, t0 + Duration::hours(1));

        let second = limits.consume("u1", t0 + Duration::minutes(1)).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert_eq!(second.reset_at, first.reset_at);

        let third = limits.consume("u1", t0 + Duration::minutes(2)).await.unwrap();
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset_at, first.reset_at);

        // Other users have their own window.
        assert!(limits.consume("u2", t0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_window_reopens_after_reset() {
        let limits = repo(1);
        let t0 = Utc::now();
        assert!(limits.consume("u1", t0).await.unwrap().allowed);
        assert!(!limits.consume("u1", t0 + Duration::minutes(30)).await.unwrap().allowed);

        let later = t0 + Duration::hours(1);
        let status = limits.consume("u1", later).await.unwrap();
        assert!(status.allowed);
        assert_eq!(status.reset_at, later + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_counter_document_shape() {
        let store = Arc::new(MemoryStore::new());
        let limits = AiRateLimitRepository::new(store.clone(), RateLimitPolicy::default());
        limits.consume("u1", Utc::now()).await.unwrap();

        let doc = store.get(AI_RATE_LIMITS, "u1").await.unwrap().unwrap();
        assert_eq!(doc["userId"], "u1");
        assert_eq!(doc["count"], 1);
        assert!(doc.contains_key("resetAt"));
        assert!(doc.contains_key("lastRequestAt"));
    }
}
