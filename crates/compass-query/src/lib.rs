//! compass-query: turning a research question into an answered SPARQL query.
//!
//! ```text
//! question ─▶ PromptBuilder ─▶ AiService ─▶ extract blocks ─▶ SparqlExecutor
//!                 ▲                                                │
//!                 └──────── feedback ◀── evaluator rule table ◀────┘
//! ```
//!
//! Accepted rows are then reshaped by an AI-generated `processData` function running in a
//! sandboxed interpreter, or by the generic transformer when that fails.

pub mod error;
pub mod evaluation;
pub mod generation;
pub mod processing;
pub mod prompt;
pub mod transform;

pub use error::{CompileError, GenerationError};
pub use evaluation::{evaluate, Evaluation, Observation};
pub use generation::{
    execute_blocks, Execution, GenerationOutcome, GenerationRequest, IterationEvent, Phase, QueryGenerator,
    DEFAULT_MAX_ITERATIONS,
};
pub use processing::{GeneratedProcessing, ProcessingFunction, ProcessingGenerator, SandboxLimits};
pub use prompt::{PredicatesMapping, PromptBuilder, PropertyMapping, TemplateSchema, QUESTION_PLACEHOLDER};
pub use transform::process_dynamic_data;
