//! The generate → execute → evaluate → refine loop.
//!
//! Each iteration asks the LLM for SPARQL, runs it, and grades the outcome with the evaluator
//! rule table. The first accepted attempt wins. When the budget runs out, the attempt with the
//! most rows is returned flagged as degraded; with no rows at all the loop fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use compass_common::Row;
use compass_llm::{AiService, GenerateOptions, Provider};
use compass_sparql::{combine_sparql_blocks, extract_from_markdown, SparqlBlock, SparqlExecutor};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use crate::error::{GenerationError, Result};
use crate::evaluation::{evaluate, Evaluation, Observation};
use crate::prompt::{PromptBuilder, TemplateSchema};

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;
const MAX_TOKENS: u32 = 2000;

const NO_BLOCK_FEEDBACK: &str =
    "No SPARQL code block was generated. Please ensure the response contains a valid SPARQL query in a code block.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    pub question: String,
    pub max_iterations: Option<u32>,
    #[serde(flatten)]
    pub schema: TemplateSchema,
    pub provider: Option<Provider>,
    pub session_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Generating,
    Executing,
    Evaluating,
    Accepted,
    Exhausted,
}

/// Progress notification for one step of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationEvent {
    pub iteration: u32,
    pub max_iterations: u32,
    pub phase: Phase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub blocks: Vec<SparqlBlock>,
    /// Blocks joined back into the `# id:` form stored with a question.
    pub combined_query: String,
    /// Rows of the first block.
    pub rows: Vec<Row>,
    /// Rows of every block, keyed by block id.
    pub datasets: BTreeMap<String, Vec<Row>>,
    pub final_prompt: String,
    pub iterations: u32,
    pub needs_improvement: bool,
    pub feedback: String,
    /// True when no attempt was accepted and the best-so-far result is returned.
    pub degraded: bool,
}

/// Result of running every block of one attempt.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub rows: Vec<Row>,
    pub datasets: BTreeMap<String, Vec<Row>>,
    pub error: Option<String>,
}

/// Run blocks sequentially. Transport errors are captured, not raised.
pub async fn execute_blocks(executor: &dyn SparqlExecutor, blocks: &[SparqlBlock]) -> Execution {
    let mut execution = Execution::default();
    let multi = blocks.len() > 1;

    for (i, block) in blocks.iter().enumerate() {
        match executor.select(&block.query).await {
            Ok(rows) => {
                debug!(block = %block.id, rows = rows.len(), "Block executed");
                if i == 0 {
                    execution.rows = rows.clone();
                }
                execution.datasets.insert(block.id.clone(), rows);
            }
            Err(e) => {
                let message = if multi { format!("[{}] {e}", block.id) } else { e.to_string() };
                execution.error = Some(message);
                break;
            }
        }
    }
    execution
}

struct Attempt {
    blocks: Vec<SparqlBlock>,
    rows: Vec<Row>,
    datasets: BTreeMap<String, Vec<Row>>,
    prompt: String,
    iteration: u32,
}

pub struct QueryGenerator {
    ai: Arc<AiService>,
    executor: Arc<dyn SparqlExecutor>,
    prompts: Arc<PromptBuilder>,
    max_iterations: u32,
}

impl QueryGenerator {
    pub fn new(ai: Arc<AiService>, executor: Arc<dyn SparqlExecutor>, prompts: Arc<PromptBuilder>) -> Self {
        Self { ai, executor, prompts, max_iterations: DEFAULT_MAX_ITERATIONS }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn executor(&self) -> &Arc<dyn SparqlExecutor> {
        &self.executor
    }

    #[instrument(skip(self, req, events), fields(question = %req.question))]
    pub async fn generate(
        &self,
        req: &GenerationRequest,
        events: Option<UnboundedSender<IterationEvent>>,
    ) -> Result<GenerationOutcome> {
        // A request may lower the budget but never raise it.
        let max = req.max_iterations.unwrap_or(self.max_iterations).clamp(1, self.max_iterations);
        let notify = |iteration: u32, phase: Phase, message: String, rows: Option<usize>| {
            if let Some(tx) = &events {
                let _ = tx.send(IterationEvent { iteration, max_iterations: max, phase, message, rows });
            }
        };

        let mut previous_query = String::new();
        let mut feedback = String::new();
        let mut best: Option<Attempt> = None;

        for iteration in 1..=max {
            let prompt = if iteration == 1 {
                self.prompts.generation_prompt(&req.schema, &req.question)?
            } else {
                self.prompts
                    .refinement_prompt(&req.schema, &req.question, &previous_query, &feedback, iteration)?
            };

            notify(iteration, Phase::Generating, format!("Generating SPARQL (iteration {iteration}/{max})"), None);
            let opts = GenerateOptions {
                provider: req.provider,
                session_id: req.session_id.clone(),
                ..GenerateOptions::new(0.1 + (iteration - 1) as f32 * 0.05, MAX_TOKENS)
            };
            let generation = self.ai.generate_text(&prompt, opts).await?;
            let blocks = extract_from_markdown(&generation.text).sparql_blocks;

            if blocks.is_empty() {
                warn!(iteration, "LLM response contained no SPARQL block");
                if iteration == max {
                    notify(iteration, Phase::Exhausted, NO_BLOCK_FEEDBACK.to_string(), None);
                    return Err(GenerationError::NoQueryBlock);
                }
                feedback = NO_BLOCK_FEEDBACK.to_string();
                continue;
            }

            notify(iteration, Phase::Executing, format!("Executing {} query block(s)", blocks.len()), None);
            let execution = execute_blocks(self.executor.as_ref(), &blocks).await;

            let combined = combine_sparql_blocks(&blocks);
            let Evaluation { needs_improvement, feedback: verdict, rule } = evaluate(&Observation {
                rows: &execution.rows,
                query: &combined,
                error: execution.error.as_deref(),
            });
            debug!(iteration, rule, rows = execution.rows.len(), needs_improvement, "Attempt evaluated");
            notify(iteration, Phase::Evaluating, verdict.clone(), Some(execution.rows.len()));
            previous_query = combined.clone();

            if !needs_improvement {
                info!(iteration, rows = execution.rows.len(), "SPARQL query accepted");
                notify(iteration, Phase::Accepted, verdict.clone(), Some(execution.rows.len()));
                return Ok(GenerationOutcome {
                    blocks,
                    combined_query: combined,
                    rows: execution.rows,
                    datasets: execution.datasets,
                    final_prompt: prompt,
                    iterations: iteration,
                    needs_improvement: false,
                    feedback: verdict,
                    degraded: false,
                });
            }

            // Rows from blocks that ran before a failing one are not a result.
            let failed = execution.error.is_some();
            if !failed && execution.rows.len() > best.as_ref().map_or(0, |b| b.rows.len()) {
                best = Some(Attempt {
                    blocks,
                    rows: execution.rows,
                    datasets: execution.datasets,
                    prompt,
                    iteration,
                });
            }
            feedback = verdict;
        }

        notify(max, Phase::Exhausted, feedback.clone(), best.as_ref().map(|b| b.rows.len()));
        match best {
            Some(best) => {
                warn!(
                    iterations = max,
                    best_iteration = best.iteration,
                    rows = best.rows.len(),
                    "No attempt accepted, returning best result"
                );
                Ok(GenerationOutcome {
                    combined_query: combine_sparql_blocks(&best.blocks),
                    blocks: best.blocks,
                    rows: best.rows,
                    datasets: best.datasets,
                    final_prompt: best.prompt,
                    iterations: max,
                    needs_improvement: true,
                    feedback,
                    degraded: true,
                })
            }
            None => Err(GenerationError::Exhausted { iterations: max, feedback }),
        }
    }
}
