use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Standoff,
    Json,
    OaJsonld,
    WaJsonld,
}

impl OutputFormat {
    /// Suffix of the annotation file written for each document.
    pub fn suffix(self) -> &'static str {
        match self {
            OutputFormat::Standoff => ".ann",
            OutputFormat::Json => ".json",
            OutputFormat::OaJsonld | OutputFormat::WaJsonld => ".jsonld",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Standoff => write!(f, "standoff"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::OaJsonld => write!(f, "oa-jsonld"),
            OutputFormat::WaJsonld => write!(f, "wa-jsonld"),
        }
    }
}

const MUTATION_TYPES: [&str; 3] = ["DNAMutation", "ProteinMutation", "SNP"];

/// Map a PubTator entity type to the type written in converted output.
pub fn output_type(kind: &str) -> &str {
    if MUTATION_TYPES.contains(&kind) {
        "Mutation"
    } else {
        kind
    }
}

/// Namespace prefixes guessed for normalization ids that carry none.
///
/// Lookups check for containment rather than equality so that modified
/// types such as `Species-Nomical` still resolve. Configured overrides are
/// consulted before the built-in table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    overrides: BTreeMap<String, String>,
}

impl Namespaces {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides }
    }

    pub fn namespace_for<'a>(&'a self, kind: &'a str) -> &'a str {
        if let Some(prefix) = self
            .overrides
            .iter()
            .find(|(pattern, _)| kind.contains(pattern.as_str()))
            .map(|(_, prefix)| prefix.as_str())
        {
            return prefix;
        }
        if kind.contains("Species") {
            "NCBITaxon"
        } else if kind.contains("Gene") {
            "NCBIGENE"
        } else if kind.contains("Chemical") {
            "MESH"
        } else if MUTATION_TYPES.iter().any(|t| kind.contains(t)) {
            kind
        } else {
            "unknown"
        }
    }
}
