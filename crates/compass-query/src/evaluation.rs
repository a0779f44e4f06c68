//! Heuristic evaluation of one executed attempt.
//!
//! Rules are checked in order; the first one that fires produces the feedback fed into the
//! next refinement prompt. An attempt that trips no rule is accepted.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use compass_common::Row;
use compass_sparql::QUERY_ECHO;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

pub const ACCEPTED_FEEDBACK: &str = "Query results look good!";

const EMPTY_FEEDBACK: &str = "Query returned no results. The query may be too restrictive or the data may not exist in the knowledge graph. Consider: 1) Removing optional filters, 2) Checking if the property paths are correct, 3) Verifying the class and predicate URIs are accurate.";

const SPARSE_THRESHOLD: f64 = 0.5;

static SELECT_PROJECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\b(.*?)\bWHERE\b").expect("static regex"));
static CONDITIONAL_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:IF|BIND)\s*\(").expect("static regex"));
static LITERAL_COMPARISON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\?(\w+)\s*=\s*"[^"]*""#).expect("static regex"));
static CONTRIBUTION_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?contribution\s+orkgp:P29\b").expect("static regex"));
static UNDEFINED_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:undefined|unknown|not\s+defined)\s+(?:namespace\s+)?prefix\b|\bprefix\s+\S+\s+(?:is\s+)?not\s+defined")
        .expect("static regex")
});
static CLASS_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\ba|rdf:type)\s+orkgc:\w+").expect("static regex"));

/// What came back from executing an attempt.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub rows: &'a [Row],
    pub query: &'a str,
    pub error: Option<&'a str>,
}

impl Observation<'_> {
    fn failed_or_empty(&self) -> bool {
        self.error.is_some() || self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub needs_improvement: bool,
    pub feedback: String,
    /// Name of the rule that produced the verdict.
    pub rule: &'static str,
}

pub struct Rule {
    pub name: &'static str,
    pub check: fn(&Observation<'_>) -> Option<String>,
}

pub static RULES: &[Rule] = &[
    Rule { name: "conditional_in_projection", check: conditional_in_projection },
    Rule { name: "literal_without_label", check: literal_without_label },
    Rule { name: "undefined_prefix", check: undefined_prefix },
    Rule { name: "year_on_contribution", check: year_on_contribution },
    Rule { name: "missing_class", check: missing_class },
    Rule { name: "execution_error", check: execution_error },
    Rule { name: "empty_result", check: empty_result },
    Rule { name: "empty_columns", check: empty_columns },
    Rule { name: "sparse_result", check: sparse_result },
];

pub fn evaluate(obs: &Observation<'_>) -> Evaluation {
    for rule in RULES {
        if let Some(feedback) = (rule.check)(obs) {
            return Evaluation { needs_improvement: true, feedback, rule: rule.name };
        }
    }
    Evaluation {
        needs_improvement: false,
        feedback: ACCEPTED_FEEDBACK.to_string(),
        rule: "accepted",
    }
}

fn conditional_in_projection(obs: &Observation<'_>) -> Option<String> {
    obs.error?;
    let projection = SELECT_PROJECTION.captures(obs.query)?.get(1)?.as_str();
    CONDITIONAL_CALL.is_match(projection).then(|| {
        "The query failed because IF() or BIND() is used inside the SELECT clause. \
         Move the conditional into the WHERE clause as BIND(IF(condition, 1, 0) AS ?flag) \
         and aggregate the bound variable, e.g. SELECT (SUM(?flag) AS ?count) WHERE { ... }. \
         Make sure every variable used in the BIND is bound before it."
            .to_string()
    })
}

fn literal_without_label(obs: &Observation<'_>) -> Option<String> {
    if !obs.failed_or_empty() {
        return None;
    }
    let var = LITERAL_COMPARISON
        .captures_iter(obs.query)
        .map(|cap| cap[1].to_string())
        .find(|var| !obs.query.contains(&format!("rdfs:label ?{var}")))?;
    Some(format!(
        "The query compares ?{var} directly with a string literal, but ORKG properties return \
         resource URIs. Fetch the label first and compare it case-insensitively: \
         ?{var} rdfs:label ?{var}_label . FILTER(LCASE(STR(?{var}_label)) = LCASE(\"...\"))"
    ))
}

/// The endpoint's own message, without the query echoed after it.
fn server_message(err: &str) -> &str {
    err.split_once(QUERY_ECHO).map_or(err, |(message, _)| message)
}

fn undefined_prefix(obs: &Observation<'_>) -> Option<String> {
    UNDEFINED_PREFIX
        .is_match(server_message(obs.error?))
        .then(|| {
            "The query uses a namespace prefix that is not defined. Only use the provided prefixes \
             orkgr:, orkgc:, orkgp:, rdfs:, xsd: and rdf:, or write full URIs in angle brackets."
                .to_string()
        })
}

fn year_on_contribution(obs: &Observation<'_>) -> Option<String> {
    if !obs.failed_or_empty() || !CONTRIBUTION_YEAR.is_match(obs.query) {
        return None;
    }
    Some(
        "The publication year (orkgp:P29) belongs to the paper, not the contribution. \
         Use ?paper orkgp:P29 ?year . ?paper orkgp:P31 ?contribution ."
            .to_string(),
    )
}

fn missing_class(obs: &Observation<'_>) -> Option<String> {
    if obs.error.is_some() || !obs.rows.is_empty() || CLASS_DECLARATION.is_match(obs.query) {
        return None;
    }
    Some(
        "Query returned no results and does not declare the contribution class. \
         Add ?contribution a orkgc:<class> . using the target class from the schema."
            .to_string(),
    )
}

fn execution_error(obs: &Observation<'_>) -> Option<String> {
    obs.error.map(|err| {
        format!("Query execution failed with error: {err}. Please fix the syntax or logic issues.")
    })
}

fn empty_result(obs: &Observation<'_>) -> Option<String> {
    obs.rows.is_empty().then(|| EMPTY_FEEDBACK.to_string())
}

fn columns(rows: &[Row]) -> BTreeSet<&str> {
    rows.iter().flat_map(|r| r.keys().map(String::as_str)).collect()
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn is_zero(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().is_ok_and(|f| f == 0.0),
        _ => false,
    }
}

fn empty_columns(obs: &Observation<'_>) -> Option<String> {
    let empty: Vec<&str> = columns(obs.rows)
        .into_iter()
        .filter(|col| obs.rows.iter().all(|r| is_blank(r.get(*col)) || is_zero(r.get(*col))))
        .collect();
    if empty.is_empty() {
        return None;
    }
    Some(format!(
        "The following columns contain only null, empty or zero values: {}. \
         Check the property paths for these variables or bind them with OPTIONAL only when the data exists.",
        empty.join(", ")
    ))
}

fn sparse_result(obs: &Observation<'_>) -> Option<String> {
    let cols = columns(obs.rows);
    let total = cols.len() * obs.rows.len();
    if total == 0 {
        return None;
    }
    let blank = obs
        .rows
        .iter()
        .map(|r| cols.iter().filter(|c| is_blank(r.get(**c))).count())
        .sum::<usize>();
    (blank as f64 / total as f64 > SPARSE_THRESHOLD).then(|| {
        "Query returned data but over 50% of values are null/empty. \
         Review the OPTIONAL patterns and make sure the selected variables are actually bound."
            .to_string()
    })
}
