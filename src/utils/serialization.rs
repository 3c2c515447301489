use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::OutputFormat;
use crate::core::Triplet;
use crate::graph::RelationGraph;

/// JSON shape handed to external consumers; node and edge lists only, no
/// presentation information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<String>,
    pub edges: Vec<GraphEdgeExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdgeExport {
    pub subject: String,
    pub label: String,
    pub object: String,
}

impl From<&RelationGraph> for GraphExport {
    fn from(graph: &RelationGraph) -> Self {
        Self {
            nodes: graph.nodes().map(str::to_string).collect(),
            edges: graph
                .edges()
                .map(|(subject, label, object)| GraphEdgeExport {
                    subject: subject.to_string(),
                    label: label.to_string(),
                    object: object.to_string(),
                })
                .collect(),
        }
    }
}

pub struct GraphSerializer;

impl GraphSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize_graph(&self, graph: &RelationGraph, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => self.serialize_graph_json(graph),
            OutputFormat::Dot => Ok(self.serialize_graph_dot(graph)),
            OutputFormat::Tsv => Ok(self.serialize_graph_tsv(graph)),
        }
    }

    pub fn serialize_triplets(&self, triplets: &[Triplet], format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(triplets)
                .context("Failed to serialize triplets to JSON"),
            OutputFormat::Tsv => Ok(triplets
                .iter()
                .map(|t| format!("{}\t{}\t{}\n", t.subject, t.predicate, t.object))
                .collect()),
            OutputFormat::Dot => {
                anyhow::bail!("Triplets have no DOT rendering; build the graph first")
            }
        }
    }

    fn serialize_graph_json(&self, graph: &RelationGraph) -> Result<String> {
        serde_json::to_string_pretty(&GraphExport::from(graph))
            .context("Failed to serialize graph to JSON")
    }

    fn serialize_graph_dot(&self, graph: &RelationGraph) -> String {
        let mut output = String::from("digraph relations {\n");

        for node in graph.nodes() {
            output.push_str(&format!("  \"{}\";\n", escape_dot(node)));
        }

        for (subject, label, object) in graph.edges() {
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                escape_dot(subject),
                escape_dot(object),
                escape_dot(label)
            ));
        }

        output.push_str("}\n");
        output
    }

    fn serialize_graph_tsv(&self, graph: &RelationGraph) -> String {
        graph
            .edges()
            .map(|(subject, label, object)| format!("{}\t{}\t{}\n", subject, label, object))
            .collect()
    }
}

impl Default for GraphSerializer {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_dot(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Report defects without dropping anything; empty fields are the only
/// thing the core can produce that downstream consumers may choke on.
pub fn validate_triplets(triplets: &[Triplet]) -> Vec<String> {
    let mut issues = Vec::new();

    for (i, triplet) in triplets.iter().enumerate() {
        if triplet.subject.is_empty() {
            issues.push(format!("Triplet {}: Empty subject", i));
        }
        if triplet.predicate.is_empty() {
            issues.push(format!("Triplet {}: Empty predicate", i));
        }
        if triplet.object.is_empty() {
            issues.push(format!("Triplet {}: Empty object", i));
        }
    }

    issues
}
