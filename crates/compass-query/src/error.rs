//! Query pipeline error types.

use compass_llm::LlmError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("The AI did not return a SPARQL code block after multiple attempts. Please try rephrasing your question.")]
    NoQueryBlock,

    #[error("After {iterations} iterations, the query still returns no results. {feedback}")]
    Exhausted { iterations: u32, feedback: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Failures of an AI-generated `processData` function.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("Invalid processing function: {0}")]
    Syntax(String),

    #[error("Processing code does not define a processData function")]
    MissingProcessData,

    #[error("processData failed: {0}")]
    Runtime(String),

    #[error("processData returned {0}, expected an array")]
    NotAnArray(String),

    #[error("Sandbox task failed: {0}")]
    Join(String),
}
