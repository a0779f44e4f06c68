//! Provider routing: the single entry point the rest of Compass uses to talk to an LLM.
//! Picks a backend per call (explicit provider or the configured default), records
//! token usage and cost, and keeps a bounded audit trail.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::audit::LlmAuditEntry;
use crate::backend::{LlmBackend, LlmError, LlmRequest, Message};
use crate::cost::{calculate_cost, CostBreakdown};

const AUDIT_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    Groq,
    Mistral,
    Google,
    Ollama,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::OpenAi,
        Provider::Groq,
        Provider::Mistral,
        Provider::Google,
        Provider::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi  => "openai",
            Provider::Groq    => "groq",
            Provider::Mistral => "mistral",
            Provider::Google  => "google",
            Provider::Ollama  => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi  => "gpt-4o-mini",
            Provider::Groq    => "llama-3.1-8b-instant",
            Provider::Mistral => "mistral-large-latest",
            Provider::Google  => "gemini-2.5-flash",
            Provider::Ollama  => "llama3:8b",
        }
    }

    /// Environment variable consulted when keys come from the environment.
    pub fn env_key(&self) -> String {
        format!("COMPASS_{}_API_KEY", self.as_str().to_uppercase())
    }
}

impl Default for Provider {
    fn default() -> Self {
        Provider::Mistral
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LlmError::Unavailable(format!("unknown provider: {s}")))
    }
}

/// Knobs for a single `generate_text` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub system: Option<String>,
    pub session_id: Option<String>,
}

impl GenerateOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub provider: Provider,
    pub cost: CostBreakdown,
}

pub struct AiService {
    backends: HashMap<Provider, Arc<dyn LlmBackend>>,
    default_provider: Provider,
    audit: Mutex<VecDeque<LlmAuditEntry>>,
}

impl AiService {
    pub fn new(default_provider: Provider) -> Self {
        Self {
            backends: HashMap::new(),
            default_provider,
            audit: Mutex::new(VecDeque::new()),
        }
    }

    pub fn register_backend(&mut self, provider: Provider, backend: Arc<dyn LlmBackend>) {
        self.backends.insert(provider, backend);
    }

    pub fn default_provider(&self) -> Provider {
        self.default_provider
    }

    pub fn configured_providers(&self) -> Vec<Provider> {
        Provider::ALL.into_iter().filter(|p| self.backends.contains_key(p)).collect()
    }

    pub fn is_configured(&self) -> bool {
        self.backends.contains_key(&self.default_provider)
    }

    /// Send one prompt to the selected provider and account for the call.
    pub async fn generate_text(&self, prompt: &str, opts: GenerateOptions) -> Result<Generation, LlmError> {
        let provider = opts.provider.unwrap_or(self.default_provider);
        let backend = self
            .backends
            .get(&provider)
            .ok_or_else(|| LlmError::NotConfigured(provider.as_str().to_uppercase()))?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = opts.system.filter(|s| !s.is_empty()) {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        let req = LlmRequest {
            messages,
            model: opts.model,
            max_tokens: opts.max_tokens.map(|t| t.min(backend.max_output_tokens())),
            temperature: Some(opts.temperature.unwrap_or(0.3)),
        };

        tracing::info!(
            provider = provider.as_str(),
            model = backend.model_id(),
            is_local = backend.is_local(),
            "LLM request routed"
        );

        let started = Instant::now();
        let resp = backend.complete(req).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let cost = calculate_cost(provider, &resp.model, resp.prompt_tokens, resp.completion_tokens);
        tracing::debug!(
            prompt_tokens = resp.prompt_tokens,
            completion_tokens = resp.completion_tokens,
            cost_usd = cost.total_cost,
            latency_ms,
            "LLM call completed"
        );
        self.record(LlmAuditEntry::new(opts.session_id, &cost, &resp.content, latency_ms));

        Ok(Generation {
            text: resp.content,
            model: resp.model,
            provider,
            cost,
        })
    }

    /// Most recent audit entries, newest first.
    pub fn recent_calls(&self, limit: usize) -> Vec<LlmAuditEntry> {
        match self.audit.lock() {
            Ok(log) => log.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn record(&self, entry: LlmAuditEntry) {
        if let Ok(mut log) = self.audit.lock() {
            if log.len() == AUDIT_CAPACITY {
                log.pop_front();
            }
            log.push_back(entry);
        }
    }
}
