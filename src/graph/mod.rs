//! Relationship graph: keyword-Jaccard edges between enriched documents,
//! plus the view selectors that pick which documents go in.
//!
//! The payload types here are the contract with the rendering layer. Node
//! fields `{id, title, keywords, size, summary, url}` and edge fields
//! `{source, target, weight, shared_keywords}` keep their names; the `kind`
//! discriminator says what a node is, never the id prefix.

pub mod builder;
pub mod similarity;
pub mod traversal;
pub mod views;

pub use builder::{build_graph, NodeInput, NodeSizing};
pub use similarity::jaccard;
pub use traversal::descendant_ids;
pub use views::{GraphSettings, GraphViews, ViewQuery, ViewRequest, ViewScope};

use serde::{Deserialize, Serialize};

use crate::models::RelationKind;

/// Minimal reference to a document, attached to synthetic nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Kind-specific node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    Document {
        space_key: String,
    },
    Keyword {
        /// Number of documents carrying the keyword.
        frequency: usize,
        documents: Vec<DocumentRef>,
    },
    Person {
        person_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        department: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub size: f64,
    pub summary: String,
    pub url: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl GraphNode {
    pub fn keyword_id(keyword: &str) -> String {
        format!("keyword:{}", keyword)
    }

    pub fn person_id(normalized_name: &str) -> String {
        format!("person:{}", normalized_name)
    }

    pub fn is_document(&self) -> bool {
        matches!(self.kind, NodeKind::Document { .. })
    }
}

/// Undirected edge; `source < target` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub shared_keywords: Vec<String>,
    /// Person-to-document relation kinds, strongest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationKind>,
}

impl GraphEdge {
    pub fn new(a: &str, b: &str, weight: f64, shared_keywords: Vec<String>) -> Self {
        let (source, target) = if a <= b { (a, b) } else { (b, a) };
        Self {
            source: source.to_string(),
            target: target.to_string(),
            weight,
            shared_keywords,
            relations: Vec::new(),
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub center: Option<String>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edge between two nodes, in either direction.
    pub fn edge(&self, a: &str, b: &str) -> Option<&GraphEdge> {
        let (source, target) = if a <= b { (a, b) } else { (b, a) };
        self.edges
            .iter()
            .find(|e| e.source == source && e.target == target)
    }

    pub fn degree(&self, id: &str) -> usize {
        self.edges.iter().filter(|e| e.touches(id)).count()
    }

    /// Sort nodes by id and edges by (source, target).
    pub(crate) fn sorted(mut self) -> Self {
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.edges.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.target.cmp(&b.target))
        });
        self
    }
}
