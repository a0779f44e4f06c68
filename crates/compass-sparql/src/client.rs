//! Triplestore client. Queries are sent with the standard ORKG prefix block prepended
//! and JSON result bindings are flattened into rows of plain string values.

use async_trait::async_trait;
use compass_common::sandbox::SandboxClient;
use compass_common::Row;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::SparqlError;

pub const DEFAULT_ENDPOINT: &str = "https://orkg.org/triplestore";

pub const PREFIXES: &str = "\
PREFIX orkgr: <http://orkg.org/orkg/resource/>
PREFIX orkgc: <http://orkg.org/orkg/class/>
PREFIX orkgp: <http://orkg.org/orkg/predicate/>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>
PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>";

/// Separates the endpoint's message from the query echoed after it in endpoint errors.
pub const QUERY_ECHO: &str = "\n\nSPARQL query:\n";

const RESULTS_JSON: &str = "application/sparql-results+json";

/// Anything that can answer a SELECT query with rows.
#[async_trait]
pub trait SparqlExecutor: Send + Sync {
    async fn select(&self, query: &str) -> Result<Vec<Row>, SparqlError>;
}

#[derive(Debug, Clone)]
pub struct SparqlClient {
    http: SandboxClient,
    endpoint: String,
}

impl SparqlClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SparqlError> {
        let endpoint = endpoint.into();
        let mut http = SandboxClient::new()?;
        http.allow_url(&endpoint)?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// GET variant used for self-contained queries that carry their own prefixes.
    #[instrument(skip(self, query))]
    pub async fn select_get(&self, query: &str) -> Result<Vec<Row>, SparqlError> {
        let resp = self
            .http
            .get(&self.endpoint)?
            .query(&[("query", query)])
            .header(reqwest::header::ACCEPT, RESULTS_JSON)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SparqlError::Endpoint(format!("SPARQL query failed: {status}. {body}")));
        }
        if body.trim().is_empty() {
            return Err(SparqlError::Endpoint("Received empty response from SPARQL endpoint".into()));
        }
        flatten_bindings(&serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SparqlExecutor for SparqlClient {
    #[instrument(skip(self, query), fields(endpoint = %self.endpoint))]
    async fn select(&self, query: &str) -> Result<Vec<Row>, SparqlError> {
        let full_query = format!("{PREFIXES}\n{query}");
        let resp = self
            .http
            .post(&self.endpoint)?
            .header(reqwest::header::ACCEPT, RESULTS_JSON)
            .form(&[("query", full_query.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            // Virtuoso puts the parser message in the body; keep it verbatim for the repair loop.
            let body = resp.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                format!("SPARQL query failed: {status}")
            } else {
                body
            };
            return Err(SparqlError::Endpoint(format!("{message}{QUERY_ECHO}{full_query}")));
        }

        let json: Value = resp.json().await?;
        let rows = flatten_bindings(&json)?;
        debug!(rows = rows.len(), "SPARQL query returned");
        Ok(rows)
    }
}

/// `results.bindings[*][var].value` → `{ var: value }`.
pub fn flatten_bindings(json: &Value) -> Result<Vec<Row>, SparqlError> {
    let bindings = json["results"]["bindings"]
        .as_array()
        .ok_or_else(|| SparqlError::Endpoint("SPARQL response has no results.bindings".into()))?;

    Ok(bindings
        .iter()
        .filter_map(Value::as_object)
        .map(|binding| {
            binding
                .iter()
                .map(|(var, cell)| {
                    let value = cell["value"].as_str().map(|s| Value::String(s.to_string())).unwrap_or(Value::Null);
                    (var.clone(), value)
                })
                .collect::<Row>()
        })
        .collect())
}
