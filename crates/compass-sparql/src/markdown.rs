//! Extraction of fenced ```sparql / ```javascript blocks from LLM output.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static SPARQL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```sparql\r?\n([\s\S]*?)\r?\n```").expect("static regex"));
static JS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:javascript|js)\r?\n([\s\S]*?)\r?\n```").expect("static regex"));
static BLOCK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#\s*id\s*:\s*([A-Za-z0-9_-]+)").expect("static regex"));
static FENCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```.*$").expect("static regex"));

pub const DEFAULT_BLOCK_ID: &str = "main";

/// One labelled query. `id` comes from a leading `# id: X` line, else `main`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparqlBlock {
    pub id: String,
    pub query: String,
}

impl SparqlBlock {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self { id: id.into(), query: query.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub sparql_blocks: Vec<SparqlBlock>,
    /// First javascript/js block, trimmed.
    pub javascript: Option<String>,
}

pub fn extract_from_markdown(markdown: &str) -> Extracted {
    let sparql_blocks = SPARQL_BLOCK
        .captures_iter(markdown)
        .filter_map(|cap| parse_block(cap.get(1)?.as_str()))
        .collect();

    let javascript = JS_BLOCK
        .captures(markdown)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|js| !js.is_empty());

    Extracted { sparql_blocks, javascript }
}

fn parse_block(body: &str) -> Option<SparqlBlock> {
    let body = body.trim();
    let mut lines = body.lines();
    let first = lines.next().unwrap_or("");

    let (id, query) = match first
        .trim()
        .starts_with('#')
        .then(|| BLOCK_ID.captures(first))
        .flatten()
    {
        Some(cap) => (cap[1].to_string(), lines.collect::<Vec<_>>().join("\n")),
        None => (DEFAULT_BLOCK_ID.to_string(), body.to_string()),
    };

    let query = query.trim();
    (!query.is_empty()).then(|| SparqlBlock { id, query: query.to_string() })
}

/// Strips stray Markdown fences from a hand-edited query.
pub fn sanitize_sparql_query(query: &str) -> String {
    FENCE_LINE.replace_all(query, "").trim().to_string()
}

/// Splits a stored query string back into blocks, treating it as one `main` block if no ids parse.
pub fn parse_sparql_blocks(query: &str) -> Vec<SparqlBlock> {
    let cleaned = sanitize_sparql_query(query);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let mut blocks: Vec<SparqlBlock> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in cleaned.lines() {
        let id = line
            .trim()
            .starts_with('#')
            .then(|| BLOCK_ID.captures(line))
            .flatten()
            .map(|cap| cap[1].to_string());
        match id {
            Some(id) => {
                if let Some((prev_id, body)) = current.take() {
                    push_block(&mut blocks, prev_id, &body);
                }
                current = Some((id, Vec::new()));
            }
            None => match current.as_mut() {
                Some((_, body)) => body.push(line),
                None => current = Some((DEFAULT_BLOCK_ID.to_string(), vec![line])),
            },
        }
    }
    if let Some((id, body)) = current {
        push_block(&mut blocks, id, &body);
    }

    if blocks.is_empty() {
        vec![SparqlBlock::new(DEFAULT_BLOCK_ID, cleaned)]
    } else {
        blocks
    }
}

fn push_block(blocks: &mut Vec<SparqlBlock>, id: String, body: &[&str]) {
    let query = body.join("\n").trim().to_string();
    if !query.is_empty() {
        blocks.push(SparqlBlock { id, query });
    }
}

/// Joins blocks as `# id: X\n<query>` separated by blank lines.
pub fn combine_sparql_blocks(blocks: &[SparqlBlock]) -> String {
    blocks
        .iter()
        .map(|b| format!("# id: {}\n{}", b.id, b.query))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_block_with_id_line() {
        let md = "Here you go:\n```sparql\n# id: X\nSELECT ?s WHERE { ?s ?p ?o }\n```\n";
        let out = extract_from_markdown(md);
        assert_eq!(out.sparql_blocks, vec![SparqlBlock::new("X", "SELECT ?s WHERE { ?s ?p ?o }")]);
        assert_eq!(out.javascript, None);
    }

    #[test]
    fn test_block_without_id_defaults_to_main() {
        let md = "```SPARQL\n  SELECT ?paper WHERE { ?paper ?p ?o }  \n```";
        let out = extract_from_markdown(md);
        assert_eq!(out.sparql_blocks.len(), 1);
        assert_eq!(out.sparql_blocks[0].id, "main");
        assert_eq!(out.sparql_blocks[0].query, "SELECT ?paper WHERE { ?paper ?p ?o }");
    }

    #[test]
    fn test_plain_comment_is_kept_in_query() {
        let md = "```sparql\n# count papers per year\nSELECT ?year WHERE { ?p ?x ?year }\n```";
        let out = extract_from_markdown(md);
        assert_eq!(out.sparql_blocks[0].id, "main");
        assert!(out.sparql_blocks[0].query.starts_with("# count papers"));
    }

    #[test]
    fn test_multiple_blocks_and_empty_skipped() {
        let md = "```sparql\n# id: q1\nSELECT ?a WHERE {}\n```\n\n```sparql\n# id: empty\n\n```\n```sparql\n# id: q2\nSELECT ?b WHERE {}\n```";
        let ids: Vec<_> = extract_from_markdown(md).sparql_blocks.into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
    }

    #[test]
    fn test_javascript_block() {
        let md = "```js\nfunction processData(rows) { return rows; }\n```";
        assert_eq!(
            extract_from_markdown(md).javascript.as_deref(),
            Some("function processData(rows) { return rows; }")
        );
    }

    #[test]
    fn test_no_blocks() {
        assert_eq!(extract_from_markdown("I cannot answer that."), Extracted::default());
    }

    #[test]
    fn test_sanitize_removes_fences() {
        assert_eq!(sanitize_sparql_query("```sparql\nSELECT ?x WHERE {}\n```"), "SELECT ?x WHERE {}");
    }

    #[test]
    fn test_combine_then_parse_keeps_ids() {
        let blocks = vec![
            SparqlBlock::new("totals", "SELECT ?a WHERE { ?a ?b ?c }"),
            SparqlBlock::new("by_year", "SELECT ?y WHERE { ?p ?q ?y }"),
        ];
        let combined = combine_sparql_blocks(&blocks);
        assert_eq!(
            combined,
            "# id: totals\nSELECT ?a WHERE { ?a ?b ?c }\n\n# id: by_year\nSELECT ?y WHERE { ?p ?q ?y }"
        );
        assert_eq!(parse_sparql_blocks(&combined), blocks);
    }

    #[test]
    fn test_parse_plain_query_is_single_main_block() {
        let blocks = parse_sparql_blocks("SELECT ?x WHERE { ?x ?y ?z }");
        assert_eq!(blocks, vec![SparqlBlock::new("main", "SELECT ?x WHERE { ?x ?y ?z }")]);
        assert!(parse_sparql_blocks("   ").is_empty());
    }
}
