//! compass-sparql: everything between an LLM's Markdown answer and a list of result rows:
//! fenced-block extraction and the triplestore client.

pub mod error;
pub mod markdown;
pub mod client;

pub use client::{SparqlClient, SparqlExecutor, DEFAULT_ENDPOINT, PREFIXES, QUERY_ECHO};
pub use error::SparqlError;
pub use markdown::{combine_sparql_blocks, extract_from_markdown, parse_sparql_blocks, sanitize_sparql_query, Extracted, SparqlBlock};
