//! Registry of the ORKG templates Compass knows how to analyse.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CompassError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKey {
    Empire,
    Nlp4re,
}

/// Static description of a template: where its statistics live and how to list its papers.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    pub key: TemplateKey,
    pub name: &'static str,
    pub template_id: &'static str,
    pub statistic_id: &'static str,
    pub target_class: &'static str,
    #[serde(skip)]
    pub paper_query: &'static str,
}

const EMPIRE_PAPERS: &str = r#"
PREFIX c: <http://orkg.org/orkg/class/>
PREFIX p: <http://orkg.org/orkg/predicate/>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>

SELECT ?paper ?doi
WHERE {
    ?paper p:P31 ?contri .
    OPTIONAL { ?paper p:P26 ?doi . }
    ?contri a c:C27001 .
    ?contri p:P135046 ?venue .
    ?venue rdfs:label ?venue_name .
    FILTER ((?venue_name = "IEEE International Requirements Engineering Conference"^^xsd:string
          || ?venue_name = "International Working Conference on Requirements Engineering: Foundation for Software Quality"^^xsd:string))
}
"#;

const NLP4RE_PAPERS: &str = r#"
PREFIX c: <http://orkg.org/orkg/class/>
PREFIX p: <http://orkg.org/orkg/predicate/>

SELECT ?paper ?doi
WHERE {
    ?paper p:P31 ?contri .
    OPTIONAL { ?paper p:P26 ?doi . }
    ?contri a c:C121001 .
}
"#;

static EMPIRE: TemplateConfig = TemplateConfig {
    key: TemplateKey::Empire,
    name: "KG-EmpiRE",
    template_id: "R186491",
    statistic_id: "empire-statistics",
    target_class: "C27001",
    paper_query: EMPIRE_PAPERS,
};

static NLP4RE: TemplateConfig = TemplateConfig {
    key: TemplateKey::Nlp4re,
    name: "NLP4RE",
    template_id: "R1544125",
    statistic_id: "nlp4re-statistics",
    target_class: "C121001",
    paper_query: NLP4RE_PAPERS,
};

impl TemplateKey {
    pub const ALL: [TemplateKey; 2] = [TemplateKey::Empire, TemplateKey::Nlp4re];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKey::Empire => "empire",
            TemplateKey::Nlp4re => "nlp4re",
        }
    }

    pub fn config(&self) -> &'static TemplateConfig {
        match self {
            TemplateKey::Empire => &EMPIRE,
            TemplateKey::Nlp4re => &NLP4RE,
        }
    }

    /// Reverse lookup from an ORKG template resource id (e.g. `R186491`).
    pub fn from_template_id(template_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.config().template_id == template_id)
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKey {
    type Err = CompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empire" => Ok(TemplateKey::Empire),
            "nlp4re" => Ok(TemplateKey::Nlp4re),
            other => Err(CompassError::UnknownTemplate(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_templates() {
        assert_eq!("empire".parse::<TemplateKey>().unwrap(), TemplateKey::Empire);
        assert_eq!("nlp4re".parse::<TemplateKey>().unwrap(), TemplateKey::Nlp4re);
        assert!("EMPIRE".parse::<TemplateKey>().is_err());
    }

    #[test]
    fn test_template_ids() {
        assert_eq!(TemplateKey::Empire.config().template_id, "R186491");
        assert_eq!(TemplateKey::Nlp4re.config().statistic_id, "nlp4re-statistics");
        assert_eq!(TemplateKey::from_template_id("R1544125"), Some(TemplateKey::Nlp4re));
        assert_eq!(TemplateKey::from_template_id("R1"), None);
    }
}
