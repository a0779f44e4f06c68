use thiserror::Error;

#[derive(Debug, Error)]
pub enum SparqlError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid SPARQL response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Non-2xx answer from the endpoint. The message already carries the offending query.
    #[error("{0}")]
    Endpoint(String),

    #[error(transparent)]
    Common(#[from] compass_common::CompassError),
}
