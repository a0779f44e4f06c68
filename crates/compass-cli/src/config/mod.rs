//! Configuration loading for Compass.
//! Reads compass.toml from the current directory or the path in COMPASS_CONFIG.

use std::path::{Path, PathBuf};

use compass_llm::Provider;
use compass_store::RateLimitPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sparql: SparqlConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Accept `x-user-id` / `x-user-email` headers in place of a token.
    #[serde(default)]
    pub dev_header_auth: bool,
}

fn default_bind() -> String { "0.0.0.0:3000".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), dev_header_auth: false }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Falls back to COMPASS_JWT_SECRET when unset.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default = "default_true")]
    pub use_environment_keys: bool,
    pub openai: Option<ProviderConfig>,
    pub groq: Option<ProviderConfig>,
    pub mistral: Option<ProviderConfig>,
    pub google: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
}

fn default_provider() -> Provider { Provider::Mistral }
fn default_true() -> bool { true }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            use_environment_keys: default_true(),
            openai: None,
            groq: None,
            mistral: None,
            google: None,
            ollama: None,
        }
    }
}

impl LlmConfig {
    pub fn provider_config(&self, provider: Provider) -> Option<&ProviderConfig> {
        match provider {
            Provider::OpenAi => self.openai.as_ref(),
            Provider::Groq => self.groq.as_ref(),
            Provider::Mistral => self.mistral.as_ref(),
            Provider::Google => self.google.as_ref(),
            Provider::Ollama => self.ollama.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparqlConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_endpoint() -> String { compass_sparql::DEFAULT_ENDPOINT.to_string() }
fn default_api_base() -> String { compass_stats::DEFAULT_API_BASE.to_string() }

impl Default for SparqlConfig {
    fn default() -> Self {
        Self { endpoint: default_endpoint(), api_base: default_api_base() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_backend() -> StoreBackend { StoreBackend::File }
fn default_store_path() -> PathBuf { PathBuf::from("./data/store") }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: default_backend(), path: default_store_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

fn default_state_dir() -> PathBuf { PathBuf::from("./data/state") }

impl Default for StateConfig {
    fn default() -> Self {
        Self { dir: default_state_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 { compass_query::DEFAULT_MAX_ITERATIONS }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { max_iterations: default_max_iterations() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Attempts per ORKG request, including the first.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_retries() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 5000 }

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self { retries: default_retries(), base_delay_ms: default_base_delay_ms() }
    }
}

/// Per-user budget for the LLM-backed routes. Admins are exempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per window; 0 turns the limit off.
    #[serde(default = "default_ai_requests")]
    pub ai_requests: u32,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

fn default_ai_requests() -> u32 { 5 }
fn default_window_hours() -> u32 { 24 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { ai_requests: default_ai_requests(), window_hours: default_window_hours() }
    }
}

impl RateLimitConfig {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(self.ai_requests, self.window_hours)
    }
}

impl Config {
    /// Missing file means defaults; a file that fails to parse is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("COMPASS_CONFIG").unwrap_or_else(|_| "compass.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "Config file not found: {}. Using defaults; copy compass.example.toml to compass.toml to customise.",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn jwt_secret(&self) -> Option<String> {
        self.auth
            .jwt_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("COMPASS_JWT_SECRET").ok().filter(|s| !s.is_empty()))
    }
}

mod tests;
