use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error(transparent)]
    Sparql(#[from] compass_sparql::SparqlError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to fetch statements bundle for {paper}: {message}")]
    Bundle { paper: String, message: String },

    #[error("A statistics update for {0} is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Store(#[from] compass_store::StoreError),

    #[error(transparent)]
    Common(#[from] compass_common::CompassError),
}

pub type Result<T> = std::result::Result<T, StatsError>;
