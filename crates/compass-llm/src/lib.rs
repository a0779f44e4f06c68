//! compass-llm: LLM backend abstraction layer.
//! Provider backends, the `AiService` front door used by the query pipeline,
//! per-call cost accounting and an audit trail of every completion.

pub mod backend;
pub mod router;
pub mod cost;
pub mod audit;

pub use audit::LlmAuditEntry;
pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use router::{AiService, GenerateOptions, Generation, Provider};
