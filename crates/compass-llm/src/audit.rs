//! Audit logging for LLM calls.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cost::CostBreakdown;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuditEntry {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub model: String,
    pub provider: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

impl LlmAuditEntry {
    pub fn new(session_id: Option<String>, cost: &CostBreakdown, output: &str, latency_ms: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(output.as_bytes());
        let output_hash = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4(),
            session_id,
            model: cost.model.clone(),
            provider: cost.provider.as_str().to_string(),
            prompt_tokens: cost.prompt_tokens,
            completion_tokens: cost.completion_tokens,
            cost_usd: cost.total_cost,
            output_hash,
            latency_ms,
            called_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::calculate_cost;
    use crate::router::Provider;

    #[test]
    fn test_output_hash_is_stable() {
        let cost = calculate_cost(Provider::Mistral, "mistral-large-latest", 10, 10);
        let a = LlmAuditEntry::new(None, &cost, "SELECT ?x", 5);
        let b = LlmAuditEntry::new(Some("s1".into()), &cost, "SELECT ?x", 9);
        assert_eq!(a.output_hash, b.output_hash);
        assert_ne!(a.id, b.id);
        assert_eq!(a.output_hash.len(), 64);
        assert_eq!(a.provider, "mistral");
    }
}
