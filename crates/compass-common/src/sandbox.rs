use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::CompassError;

/// HTTP client that refuses to talk to hosts outside an allowlist.
/// Every outbound call Compass makes (triplestore, ORKG REST API) goes through here.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client allowing the ORKG hosts and loopback.
    pub fn new() -> Result<Self, CompassError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, CompassError> {
        let domains = [
            "orkg.org",       // triplestore and REST API, incl. www.
            "localhost",
            "127.0.0.1",
        ];
        let allowlist = domains.iter().map(|d| d.to_string()).collect();

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| CompassError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allows the host of `url`, e.g. a configured endpoint.
    pub fn allow_url(&mut self, url: &str) -> Result<(), CompassError> {
        let parsed = Url::parse(url).map_err(|e| CompassError::Config(format!("Invalid URL {url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CompassError::Config(format!("URL has no host: {url}")))?;
        self.allow_domain(host);
        Ok(())
    }

    /// Exact match or subdomain of an allowed domain.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else { return false };
        let Some(host) = parsed.host_str() else { return false };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, CompassError> {
        self.request(reqwest::Method::GET, url)
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, CompassError> {
        self.request(reqwest::Method::POST, url)
    }

    pub fn request(&self, method: reqwest::Method, url: &str) -> Result<reqwest::RequestBuilder, CompassError> {
        if !self.is_allowed(url) {
            return Err(CompassError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }
        Ok(self.client.request(method, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orkg_hosts_allowed() {
        let client = SandboxClient::new().unwrap();
        assert!(client.is_allowed("https://orkg.org/triplestore"));
        assert!(client.is_allowed("https://www.orkg.org/api/statements/R1/bundle"));
        assert!(client.is_allowed("http://127.0.0.1:1234/sparql"));
    }

    #[test]
    fn test_foreign_hosts_rejected() {
        let client = SandboxClient::new().unwrap();
        assert!(!client.is_allowed("https://evilorkg.org/"));
        assert!(!client.is_allowed("https://example.com/"));
        assert!(!client.is_allowed("not a url"));
        assert!(client.get("https://example.com/").is_err());
    }

    #[test]
    fn test_allow_url_adds_host() {
        let mut client = SandboxClient::new().unwrap();
        client.allow_url("https://sparql.example.org/query").unwrap();
        assert!(client.is_allowed("https://sparql.example.org/other"));
    }
}
