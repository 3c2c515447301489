use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use tracing::{debug, info};

use crate::config::OutputFormat;
use crate::core::{Triplet, TripletCollection};
use crate::utils::GraphSerializer;

pub type NodeId = usize;

/// Directed relation graph.
///
/// Node identity is the entity text itself: two tokens with the same
/// surface form collapse into one node. An ordered node pair carries at
/// most one label; a later write to the same pair replaces the earlier
/// label. Nodes exist only because some triplet referenced them, so the
/// graph never contains isolated nodes.
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    nodes: Vec<String>,
    index: HashMap<String, NodeId>,
    edges: BTreeMap<(NodeId, NodeId), String>,
}

impl RelationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from triplets in iterator order. The last triplet to
    /// touch an ordered node pair supplies that pair's label.
    pub fn from_triplets<'a, I>(triplets: I) -> Self
    where
        I: IntoIterator<Item = &'a Triplet>,
    {
        let mut graph = Self::new();
        for triplet in triplets {
            graph.set_edge(&triplet.subject, &triplet.predicate, &triplet.object);
        }
        graph
    }

    /// Build from a collection, processed in the collection's sorted
    /// iteration order, which fixes the overwrite winner for a given set.
    /// Callers feeding unordered data through `from_triplets` must not
    /// depend on which duplicate-pair label survives.
    pub fn build(triplets: &TripletCollection) -> Self {
        let graph = Self::from_triplets(triplets.iter());
        debug!(
            "built relation graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    fn add_node(&mut self, text: &str) -> NodeId {
        if let Some(&id) = self.index.get(text) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(text.to_string());
        self.index.insert(text.to_string(), id);
        id
    }

    /// Ensure both endpoints exist, then set or overwrite the edge label.
    /// Self-loops are legal and preserved.
    pub fn set_edge(&mut self, subject: &str, label: &str, object: &str) {
        let s = self.add_node(subject);
        let o = self.add_node(object);
        self.edges.insert((s, o), label.to_string());
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains_node(&self, text: &str) -> bool {
        self.index.contains_key(text)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// Edges as `(subject, label, object)`, ordered by node id pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.edges.iter().map(|(key, label)| {
            (
                self.nodes[key.0].as_str(),
                label.as_str(),
                self.nodes[key.1].as_str(),
            )
        })
    }

    pub fn edge_label(&self, subject: &str, object: &str) -> Option<&str> {
        let s = *self.index.get(subject)?;
        let o = *self.index.get(object)?;
        self.edges.get(&(s, o)).map(String::as_str)
    }

    /// Outgoing edges of a node as `(label, object)` pairs.
    pub fn outgoing(&self, node: &str) -> Vec<(&str, &str)> {
        let Some(&id) = self.index.get(node) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .filter(|(key, _)| key.0 == id)
            .map(|(key, label)| (label.as_str(), self.nodes[key.1].as_str()))
            .collect()
    }

    /// Incoming edges of a node as `(subject, label)` pairs.
    pub fn incoming(&self, node: &str) -> Vec<(&str, &str)> {
        let Some(&id) = self.index.get(node) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .filter(|(key, _)| key.1 == id)
            .map(|(key, label)| (self.nodes[key.0].as_str(), label.as_str()))
            .collect()
    }

    /// Entities within `max_depth` hops of `node`, edge direction ignored,
    /// in breadth-first discovery order. The start node is not included.
    pub fn related(&self, node: &str, max_depth: usize) -> Vec<String> {
        let Some(&start) = self.index.get(node) else {
            return Vec::new();
        };

        let mut related = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for (&(s, o), _) in &self.edges {
                let neighbor = if s == current {
                    o
                } else if o == current {
                    s
                } else {
                    continue;
                };
                if visited.insert(neighbor) {
                    related.push(self.nodes[neighbor].clone());
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        related
    }

    pub fn stats(&self) -> RelationGraphStats {
        let self_loop_count = self.edges.keys().filter(|(s, o)| s == o).count();
        let distinct_labels = self.edges.values().collect::<HashSet<_>>().len();

        RelationGraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            self_loop_count,
            distinct_labels,
        }
    }

    pub fn export_to_file(&self, file_path: &str, format: &OutputFormat) -> Result<()> {
        let rendered = GraphSerializer::new().serialize_graph(self, format)?;
        fs::write(file_path, rendered)
            .with_context(|| format!("Failed to write graph export to: {}", file_path))?;

        info!("relation graph exported to: {} (format: {:?})", file_path, format);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationGraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub self_loop_count: usize,
    pub distinct_labels: usize,
}

impl std::fmt::Display for RelationGraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Relation Graph Statistics:\n\
             Nodes: {}\n\
             Edges: {}\n\
             Self-loops: {}\n\
             Distinct Labels: {}",
            self.node_count, self.edge_count, self.self_loop_count, self.distinct_labels
        )
    }
}
