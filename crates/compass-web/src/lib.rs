//! compass-web: HTTP API for Compass.
//! Serves:
//!   - Statistics updates with progress streaming
//!   - Question → SPARQL generation, execution and result processing
//!   - Saved and community questions, question overrides
//!   - User sync, request logs, LLM call audit, backup and restore

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod router;
pub mod sse;
pub mod state;

pub use router::build_router;
pub use state::{AppState, AuthConfig, SharedState};
