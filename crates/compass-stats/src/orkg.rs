//! ORKG access for the statistics pipeline: the paper list (SPARQL) and per-paper
//! statement bundles (REST API).

use std::sync::OnceLock;
use std::time::Duration;

use compass_common::sandbox::SandboxClient;
use compass_sparql::SparqlClient;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StatsError};

pub const DEFAULT_API_BASE: &str = "https://www.orkg.org/api";

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles with every further attempt.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(5) }
    }
}

impl RetryConfig {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeClass {
    Resource,
    Literal,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "_class")]
    pub class: NodeClass,
    #[serde(default)]
    pub label: Option<String>,
}

impl Node {
    pub fn is_resource(&self) -> bool {
        self.class == NodeClass::Resource
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Node,
    #[serde(default)]
    pub predicate: Option<Predicate>,
    pub object: Node,
}

impl Statement {
    pub fn predicate_id(&self) -> Option<&str> {
        self.predicate.as_ref().and_then(|p| p.id.as_deref()).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct Bundle {
    #[serde(default)]
    statements: Vec<Statement>,
}

/// `http://orkg.org/orkg/resource/R123` → `R123`.
pub fn resource_id(iri: &str) -> Option<String> {
    static RESOURCE: OnceLock<Regex> = OnceLock::new();
    let re = RESOURCE.get_or_init(|| Regex::new(r"/resource/([^/]+)$").expect("static regex"));
    if let Some(caps) = re.captures(iri) {
        return Some(caps[1].to_string());
    }
    iri.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct OrkgClient {
    http: SandboxClient,
    sparql: SparqlClient,
    api_base: String,
    retry: RetryConfig,
}

impl OrkgClient {
    pub fn new(sparql_endpoint: &str, api_base: &str) -> Result<Self> {
        let mut http = SandboxClient::new()?;
        http.allow_url(api_base)?;
        Ok(Self {
            http,
            sparql: SparqlClient::new(sparql_endpoint)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Paper resource ids returned by a template's paper-list query, in result order.
    pub async fn paper_ids(&self, query: &str) -> Result<Vec<String>> {
        let rows = self.sparql.select_get(query).await?;
        let ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("paper").and_then(Value::as_str))
            .filter_map(resource_id)
            .collect();
        debug!(papers = ids.len(), "Fetched paper list");
        Ok(ids)
    }

    /// All statements reachable from a paper. A missing paper yields an empty bundle.
    pub async fn statements_bundle(&self, paper_id: &str) -> Result<Vec<Statement>> {
        let mut attempt = 0;
        loop {
            match self.fetch_bundle(paper_id).await {
                Ok(statements) => return Ok(statements),
                Err(e) if attempt + 1 < self.retry.max_attempts => {
                    let wait = self.retry.delay_for(attempt);
                    warn!(paper = paper_id, attempt = attempt + 1, wait_ms = wait.as_millis() as u64, error = %e, "Bundle fetch failed, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_bundle(&self, paper_id: &str) -> Result<Vec<Statement>> {
        let url = format!("{}/statements/{}/bundle", self.api_base, paper_id);
        let resp = self
            .http
            .get(&url)?
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StatsError::Bundle { paper: paper_id.to_string(), message: format!("{status}. {body}") });
        }
        let bundle: Bundle = resp.json().await?;
        Ok(bundle.statements)
    }
}
