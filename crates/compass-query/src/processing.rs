//! AI-generated `processData` functions, run inside an embedded JavaScript interpreter.
//!
//! The interpreter has no host bindings (no console, network or filesystem) and runs with loop
//! and recursion limits. A `Context` is not `Send`, so every evaluation builds a fresh one on a
//! blocking thread. Values cross the boundary as JSON text.

use std::sync::{Arc, LazyLock};

use boa_engine::{Context, Source};
use compass_common::Row;
use compass_llm::{AiService, GenerateOptions};
use compass_sparql::extract_from_markdown;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{CompileError, GenerationError};
use crate::prompt::PromptBuilder;
use crate::transform::process_dynamic_data;

static EXPORT_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s+default\s+").expect("static regex"));

#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    pub loop_iterations: u64,
    pub recursion: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self { loop_iterations: 1_000_000, recursion: 256 }
    }
}

/// A processing function that is known to define `processData`.
#[derive(Debug, Clone)]
pub struct ProcessingFunction {
    source: String,
    limits: SandboxLimits,
}

impl ProcessingFunction {
    pub async fn compile(code: &str) -> Result<Self, CompileError> {
        Self::compile_with_limits(code, SandboxLimits::default()).await
    }

    pub async fn compile_with_limits(code: &str, limits: SandboxLimits) -> Result<Self, CompileError> {
        let source = format!("\"use strict\";\n{}", EXPORT_DEFAULT.replace_all(code.trim(), ""));
        let script = format!("{source}\n;typeof processData === 'function'");

        let defined = run_sandboxed(limits, move |ctx| {
            let value = ctx
                .eval(Source::from_bytes(script.as_bytes()))
                .map_err(|e| CompileError::Syntax(e.to_string()))?;
            Ok(value.as_boolean().unwrap_or(false))
        })
        .await?;

        if !defined {
            return Err(CompileError::MissingProcessData);
        }
        Ok(Self { source, limits })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run `processData(input)`. `null` input short-circuits to an empty array.
    pub async fn try_apply(&self, input: &Value) -> Result<Vec<Value>, CompileError> {
        if input.is_null() {
            return Ok(Vec::new());
        }
        let script = format!(
            "{}\n;JSON.stringify((function () {{ const __result = processData({}); return __result === undefined ? null : __result; }})())",
            self.source, input
        );

        let json = run_sandboxed(self.limits, move |ctx| {
            let value = ctx
                .eval(Source::from_bytes(script.as_bytes()))
                .map_err(|e| CompileError::Runtime(e.to_string()))?;
            Ok(value.as_string().map(|s| s.to_std_string_escaped()))
        })
        .await?;

        let Some(json) = json else {
            return Err(CompileError::NotAnArray("undefined".into()));
        };
        match serde_json::from_str::<Value>(&json) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(other) => Err(CompileError::NotAnArray(js_kind(&other).into())),
            Err(e) => Err(CompileError::Runtime(e.to_string())),
        }
    }

    /// Like [`try_apply`](Self::try_apply) but a failing function yields `[]`.
    pub async fn apply(&self, input: &Value) -> Vec<Value> {
        match self.try_apply(input).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Processing function failed");
                Vec::new()
            }
        }
    }

    /// Process result rows, falling back to the generic transformer on any failure.
    pub async fn apply_or_fallback(&self, rows: &[Row]) -> Vec<Value> {
        let input = Value::Array(rows.iter().cloned().map(Value::Object).collect());
        match self.try_apply(&input).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Processing function failed, using generic transformer");
                process_dynamic_data(rows).into_iter().map(Value::Object).collect()
            }
        }
    }
}

async fn run_sandboxed<T, F>(limits: SandboxLimits, f: F) -> Result<T, CompileError>
where
    T: Send + 'static,
    F: FnOnce(&mut Context) -> Result<T, CompileError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut ctx = Context::default();
        ctx.runtime_limits_mut().set_loop_iteration_limit(limits.loop_iterations);
        ctx.runtime_limits_mut().set_recursion_limit(limits.recursion);
        f(&mut ctx)
    })
    .await
    .map_err(|e| CompileError::Join(e.to_string()))?
}

fn js_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub struct GeneratedProcessing {
    pub code: String,
    pub prompt: String,
    pub function: ProcessingFunction,
}

/// Asks the LLM for a `processData` function shaped to a concrete result set.
pub struct ProcessingGenerator {
    ai: Arc<AiService>,
    prompts: Arc<PromptBuilder>,
}

impl ProcessingGenerator {
    pub fn new(ai: Arc<AiService>, prompts: Arc<PromptBuilder>) -> Self {
        Self { ai, prompts }
    }

    /// `Ok(None)` when there is nothing to process or the model answered without a code block.
    pub async fn generate(&self, rows: &[Row], question: &str) -> Result<Option<GeneratedProcessing>, GenerationError> {
        if rows.is_empty() {
            return Ok(None);
        }

        let prompt = self.prompts.processing_prompt(question, rows)?;
        let generation = self.ai.generate_text(&prompt, GenerateOptions::new(0.2, 1500)).await?;
        debug!(chars = generation.text.len(), "Processing function response received");

        let Some(code) = extract_from_markdown(&generation.text).javascript else {
            warn!("LLM response contained no JavaScript block");
            return Ok(None);
        };

        let function = ProcessingFunction::compile(&code).await?;
        info!(rows = rows.len(), "Processing function generated");
        Ok(Some(GeneratedProcessing { code, prompt, function }))
    }
}
