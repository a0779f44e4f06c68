//! Per-call cost accounting. Prices are USD per one million tokens.

use serde::{Deserialize, Serialize};

use crate::router::Provider;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

const fn p(input: f64, output: f64) -> Pricing {
    Pricing { input, output }
}

const OPENAI_PRICING: &[(&str, Pricing)] = &[
    ("gpt-5",          p(1.25, 10.0)),
    ("gpt-5-mini",     p(0.25, 2.0)),
    ("gpt-5-nano",     p(0.05, 0.4)),
    ("gpt-4.1",        p(3.0, 12.0)),
    ("gpt-4o",         p(2.5, 10.0)),
    ("gpt-4o-mini",    p(0.15, 0.6)),
    ("gpt-4-turbo",    p(10.0, 30.0)),
    ("o1-mini",        p(1.1, 4.4)),
    ("gpt-3.5-turbo",  p(0.5, 1.5)),
];

// Groq's hosted models are billed at zero on the free tier.
const GROQ_PRICING: &[(&str, Pricing)] = &[
    ("llama-3.1-8b-instant",    p(0.0, 0.0)),
    ("llama-3.3-70b-versatile", p(0.0, 0.0)),
    ("openai/gpt-oss-120b",     p(0.0, 0.0)),
    ("openai/gpt-oss-20b",      p(0.0, 0.0)),
];

const MISTRAL_PRICING: &[(&str, Pricing)] = &[
    ("mistral-large-latest",  p(2.7, 8.1)),
    ("mistral-medium-latest", p(2.7, 8.1)),
    ("mistral-small-latest",  p(0.2, 0.6)),
    ("pixtral-large-latest",  p(2.7, 8.1)),
    ("open-mistral-nemo",     p(0.0, 0.0)),
];

const GOOGLE_PRICING: &[(&str, Pricing)] = &[
    ("gemini-2.5-pro",        p(1.25, 10.0)),
    ("gemini-2.5-flash",      p(0.1, 0.4)),
    ("gemini-2.0-flash",      p(0.1, 0.4)),
    ("gemini-2.0-flash-lite", p(0.019, 0.019)),
    ("gemini-1.5-pro",        p(1.25, 5.0)),
    ("gemini-1.5-flash",      p(0.075, 0.3)),
];

/// Known price for `model`; unknown models and local providers cost nothing.
pub fn pricing_for(provider: Provider, model: &str) -> Pricing {
    let table = match provider {
        Provider::OpenAi  => OPENAI_PRICING,
        Provider::Groq    => GROQ_PRICING,
        Provider::Mistral => MISTRAL_PRICING,
        Provider::Google  => GOOGLE_PRICING,
        Provider::Ollama  => &[],
    };
    table
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, pricing)| *pricing)
        .unwrap_or(p(0.0, 0.0))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub model: String,
    pub provider: Provider,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

pub fn calculate_cost(
    provider: Provider,
    model: &str,
    prompt_tokens: u32,
    completion_tokens: u32,
) -> CostBreakdown {
    let pricing = pricing_for(provider, model);
    let input_cost = prompt_tokens as f64 / 1_000_000.0 * pricing.input;
    let output_cost = completion_tokens as f64 / 1_000_000.0 * pricing.output;

    CostBreakdown {
        model: model.to_string(),
        provider,
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

/// Sums a batch of calls, e.g. every iteration of one query generation.
pub fn total_cost(costs: &[CostBreakdown]) -> f64 {
    costs.iter().map(|c| c.total_cost).sum()
}
