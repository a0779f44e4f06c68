//! RPL metrics: resource, predicate and literal counts per paper and across a template.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::orkg::Statement;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperAnalysis {
    pub paper_id: String,
    pub paper_title: String,
    pub total_statements: usize,
    pub resource_count: usize,
    pub literal_count: usize,
    pub predicate_count: usize,
    pub resource_ids: Vec<String>,
    pub literal_ids: Vec<String>,
    pub predicate_ids: Vec<String>,
}

impl PaperAnalysis {
    /// Zero counts, recorded when a paper's bundle could not be fetched.
    pub fn empty(paper_id: &str) -> Self {
        Self { paper_id: paper_id.to_string(), paper_title: paper_id.to_string(), ..Default::default() }
    }
}

/// Subject and object ids are sorted into resources and literals by their class;
/// anything that is not a resource counts as a literal.
pub fn analyze_paper(paper_id: &str, statements: &[Statement]) -> PaperAnalysis {
    let mut analysis = PaperAnalysis::empty(paper_id);
    analysis.total_statements = statements.len();

    for stmt in statements {
        for node in [&stmt.subject, &stmt.object] {
            if node.is_resource() {
                analysis.resource_ids.push(node.id.clone());
            } else {
                analysis.literal_ids.push(node.id.clone());
            }
        }
        if let Some(pred) = stmt.predicate_id() {
            analysis.predicate_ids.push(pred.to_string());
        }
    }

    analysis.resource_count = analysis.resource_ids.len();
    analysis.literal_count = analysis.literal_ids.len();
    analysis.predicate_count = analysis.predicate_ids.len();
    analysis
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatistics {
    pub total_statements: usize,
    pub total_resources: usize,
    pub total_literals: usize,
    pub total_predicates: usize,
    pub global_distinct_resources: usize,
    pub global_distinct_literals: usize,
    pub global_distinct_predicates: usize,
    pub paper_count: usize,
}

impl GlobalStatistics {
    pub fn from_papers(papers: &[PaperAnalysis]) -> Self {
        let mut resources = HashSet::new();
        let mut literals = HashSet::new();
        let mut predicates = HashSet::new();
        let mut stats = GlobalStatistics { paper_count: papers.len(), ..Default::default() };

        for paper in papers {
            stats.total_statements += paper.total_statements;
            stats.total_resources += paper.resource_count;
            stats.total_literals += paper.literal_count;
            stats.total_predicates += paper.predicate_count;
            resources.extend(paper.resource_ids.iter().map(String::as_str));
            literals.extend(paper.literal_ids.iter().map(String::as_str));
            predicates.extend(paper.predicate_ids.iter().map(String::as_str));
        }

        stats.global_distinct_resources = resources.len();
        stats.global_distinct_literals = literals.len();
        stats.global_distinct_predicates = predicates.len();
        stats
    }

    /// (resource, literal, predicate) reuse: total occurrences per distinct id, 0 when nothing was seen.
    pub fn reuse_ratios(&self) -> (f64, f64, f64) {
        fn ratio(total: usize, distinct: usize) -> f64 {
            if distinct == 0 {
                0.0
            } else {
                total as f64 / distinct as f64
            }
        }
        (
            ratio(self.total_resources, self.global_distinct_resources),
            ratio(self.total_literals, self.global_distinct_literals),
            ratio(self.total_predicates, self.global_distinct_predicates),
        )
    }
}
