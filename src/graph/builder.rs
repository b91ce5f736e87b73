//! Document graph construction.

use crate::config::GraphConfig;
use crate::models::KeywordSet;
use crate::store::ScanItem;

use super::similarity::jaccard;
use super::{Graph, GraphEdge, GraphNode, NodeKind};

/// One graph-eligible document.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInput {
    pub id: String,
    pub title: String,
    pub keywords: KeywordSet,
    pub summary: String,
    pub url: String,
    pub space_key: String,
}

impl From<ScanItem> for NodeInput {
    fn from(item: ScanItem) -> Self {
        Self {
            id: item.document.id,
            title: item.document.title,
            keywords: item.record.keywords,
            summary: item.record.summary,
            url: item.document.url,
            space_key: item.document.space_key,
        }
    }
}

impl NodeInput {
    pub(crate) fn to_node(&self, size: f64) -> GraphNode {
        GraphNode {
            id: self.id.clone(),
            title: self.title.clone(),
            keywords: self.keywords.to_vec(),
            size,
            summary: self.summary.clone(),
            url: self.url.clone(),
            kind: NodeKind::Document {
                space_key: self.space_key.clone(),
            },
        }
    }
}

/// Bounded visual size range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSizing {
    pub min: f64,
    pub max: f64,
}

impl Default for NodeSizing {
    fn default() -> Self {
        Self {
            min: 10.0,
            max: 50.0,
        }
    }
}

impl From<&GraphConfig> for NodeSizing {
    fn from(config: &GraphConfig) -> Self {
        Self {
            min: config.min_node_size as f64,
            max: config.max_node_size as f64,
        }
    }
}

impl NodeSizing {
    /// Map `value` in `0..=max_value` linearly onto `[min, max]`.
    pub fn scale(&self, value: usize, max_value: usize) -> f64 {
        if max_value == 0 {
            return self.min;
        }
        let ratio = value.min(max_value) as f64 / max_value as f64;
        self.min + (self.max - self.min) * ratio
    }
}

/// Build the keyword-similarity graph over `inputs`.
///
/// Every unordered pair is scored with Jaccard over keywords; pairs sharing
/// nothing are skipped and the rest are kept when `weight >= threshold`.
/// Node size follows degree within the kept edges. Output is sorted, so
/// the same inputs always serialize identically. Duplicate ids keep the
/// first occurrence.
pub fn build_graph(inputs: &[NodeInput], threshold: f64, sizing: &NodeSizing) -> Graph {
    let mut ordered: Vec<&NodeInput> = inputs.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));
    ordered.dedup_by(|a, b| a.id == b.id);

    let mut degree = vec![0usize; ordered.len()];
    let mut edges = Vec::new();
    for i in 0..ordered.len() {
        for j in (i + 1)..ordered.len() {
            let (a, b) = (ordered[i], ordered[j]);
            let shared = a.keywords.intersection(&b.keywords);
            if shared.is_empty() {
                continue;
            }
            let weight = jaccard(&a.keywords, &b.keywords);
            if weight < threshold {
                continue;
            }
            degree[i] += 1;
            degree[j] += 1;
            edges.push(GraphEdge::new(&a.id, &b.id, weight, shared));
        }
    }

    let max_degree = degree.iter().copied().max().unwrap_or(0);
    let nodes = ordered
        .iter()
        .zip(&degree)
        .map(|(input, &d)| input.to_node(sizing.scale(d, max_degree)))
        .collect();

    Graph {
        nodes,
        edges,
        center: None,
    }
    .sorted()
}
