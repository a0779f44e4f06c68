//! Prompt construction for SPARQL generation, refinement and processing-function synthesis.
//!
//! Prompts are minijinja templates bundled into the binary. The generation prompt ends with
//! the `[Research Question]` placeholder so the schema part can be reused on refinement rounds.

use std::collections::BTreeMap;

use compass_common::Row;
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};

pub const QUESTION_PLACEHOLDER: &str = "[Research Question]";
pub const DEFAULT_TARGET_CLASS: &str = "C27001";
const DEFAULT_TEMPLATE_ID: &str = "R186491";
const SAMPLE_ROWS: usize = 5;

const GENERATION: &str = "sparql_generation.md";
const REFINEMENT: &str = "sparql_refinement.md";
const PROCESSING: &str = "processing_function.md";

/// Predicate id → property description, as produced from an ORKG template.
pub type PredicatesMapping = BTreeMap<String, PropertyMapping>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropertyMapping {
    pub label: String,
    /// `one to one` or `one to many`.
    pub cardinality: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtemplate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtemplate_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtemplate_properties: Option<PredicatesMapping>,
}

/// Which template the question targets. Everything is optional; defaults describe KG-EmpiRE.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateSchema {
    pub template_mapping: Option<PredicatesMapping>,
    pub template_id: Option<String>,
    pub template_label: Option<String>,
    pub target_class_id: Option<String>,
}

impl TemplateSchema {
    /// A mapping without a template id is ignored, as is an id without a mapping.
    pub fn is_dynamic(&self) -> bool {
        self.template_mapping.as_ref().is_some_and(|m| !m.is_empty()) && self.template_id.is_some()
    }
}

fn guidance_for(template_id: &str) -> Option<&'static str> {
    match template_id {
        "R186491" => Some(include_str!("../prompts/guidance/R186491.md")),
        "R1544125" => Some(include_str!("../prompts/guidance/R1544125.md")),
        _ => None,
    }
}

fn label_for(template_id: &str) -> &str {
    match template_id {
        "R186491" => "Empirical Research Practice",
        "R1544125" => "NLP for Requirements Engineering (NLP4RE)",
        other => other,
    }
}

pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template(GENERATION, include_str!("../prompts/sparql_generation.md"))?;
        env.add_template(REFINEMENT, include_str!("../prompts/sparql_refinement.md"))?;
        env.add_template(PROCESSING, include_str!("../prompts/processing_function.md"))?;
        Ok(Self { env })
    }

    /// Full generation prompt, still containing the question placeholder.
    pub fn schema_prompt(&self, schema: &TemplateSchema) -> Result<String, minijinja::Error> {
        let template_id = schema.template_id.as_deref().unwrap_or(DEFAULT_TEMPLATE_ID);
        let template_label = schema
            .template_label
            .as_deref()
            .unwrap_or_else(|| label_for(template_id));
        let target_class = schema.target_class_id.as_deref().unwrap_or(DEFAULT_TARGET_CLASS);
        let mapping = schema.is_dynamic().then_some(schema.template_mapping.as_ref()).flatten();

        self.env.get_template(GENERATION)?.render(context! {
            template_id,
            template_label,
            target_class,
            mapping,
            guidance => guidance_for(template_id),
        })
    }

    pub fn generation_prompt(&self, schema: &TemplateSchema, question: &str) -> Result<String, minijinja::Error> {
        Ok(self.schema_prompt(schema)?.replacen(QUESTION_PLACEHOLDER, question, 1))
    }

    /// Prompt for iteration `iteration` (≥ 2), built from the previous attempt and its feedback.
    pub fn refinement_prompt(
        &self,
        schema: &TemplateSchema,
        question: &str,
        previous_query: &str,
        feedback: &str,
        iteration: u32,
    ) -> Result<String, minijinja::Error> {
        let schema_text = if schema.is_dynamic() {
            let full = self.schema_prompt(schema)?;
            full.split(QUESTION_PLACEHOLDER).next().map(str::to_string)
        } else {
            None
        };

        self.env.get_template(REFINEMENT)?.render(context! {
            question,
            previous_query,
            feedback,
            previous_iteration => iteration.saturating_sub(1),
            schema => schema_text,
        })
    }

    /// Prompt asking for a `processData` function fitted to `rows`.
    pub fn processing_prompt(&self, question: &str, rows: &[Row]) -> Result<String, minijinja::Error> {
        let columns: Vec<&String> = rows.first().map(|r| r.keys().collect()).unwrap_or_default();
        let data_types: BTreeMap<&String, &str> = rows
            .first()
            .map(|r| r.iter().map(|(k, v)| (k, js_type_name(v))).collect())
            .unwrap_or_default();
        let sample = &rows[..rows.len().min(SAMPLE_ROWS)];

        self.env.get_template(PROCESSING)?.render(context! {
            question,
            total_rows => rows.len(),
            columns,
            data_types => serde_json::to_string_pretty(&data_types).unwrap_or_default(),
            sample_size => sample.len(),
            sample => serde_json::to_string_pretty(sample).unwrap_or_default(),
        })
    }
}

fn js_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "object",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => "object",
    }
}
