//! View selectors: pick the node set for each visualization mode and hand
//! it to the builder.
//!
//! Every mode reads valid records only, through the store's filtered scan,
//! so stale documents never reach a graph.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::GraphCache;
use crate::config::GraphConfig;
use crate::error::{DocgraphError, Result};
use crate::models::{KeywordSet, RelationKind};
use crate::store::{PersonRelation, RecordStore, ScanFilter};

use super::builder::{build_graph, NodeInput, NodeSizing};
use super::similarity::jaccard_sets;
use super::traversal::descendant_ids;
use super::{DocumentRef, Graph, GraphEdge, GraphNode, NodeKind};

/// Restricts any view to one space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_key: Option<String>,
}

impl ViewScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn space(space_key: &str) -> Self {
        Self {
            space_key: Some(space_key.to_string()),
        }
    }

    fn filter(&self) -> ScanFilter {
        ScanFilter::valid().in_space(self.space_key.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewRequest {
    /// A root and its descendants.
    Subtree {
        root_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_depth: Option<usize>,
    },
    /// All valid documents, capped to the most recent `limit` (0 = no cap).
    Global {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    /// Documents carrying one keyword plus a synthetic keyword node.
    Keyword { keyword: String },
    /// Keyword-to-keyword graph over the most frequent keywords.
    KeywordNetwork {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top_k: Option<usize>,
    },
    /// One person and the documents they relate to.
    Person {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relation: Option<RelationKind>,
    },
}

/// A full view request; also the graph cache key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    #[serde(flatten)]
    pub view: ViewRequest,
    #[serde(default)]
    pub scope: ViewScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl ViewQuery {
    pub fn new(view: ViewRequest) -> Self {
        Self {
            view,
            scope: ViewScope::default(),
            threshold: None,
        }
    }

    pub fn in_space(mut self, space_key: Option<&str>) -> Self {
        self.scope.space_key = space_key.map(str::to_string);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphSettings {
    pub threshold: f64,
    pub global_limit: usize,
    pub keyword_network_top_k: usize,
    pub sizing: NodeSizing,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            global_limit: 100,
            keyword_network_top_k: 50,
            sizing: NodeSizing::default(),
        }
    }
}

impl From<&GraphConfig> for GraphSettings {
    fn from(config: &GraphConfig) -> Self {
        Self {
            threshold: config.threshold,
            global_limit: config.global_limit,
            keyword_network_top_k: config.keyword_network_top_k,
            sizing: NodeSizing::from(config),
        }
    }
}

/// Read-only graph views over a record store.
#[derive(Clone)]
pub struct GraphViews {
    store: RecordStore,
    settings: GraphSettings,
    cache: Option<Arc<GraphCache>>,
}

impl GraphViews {
    pub fn new(store: RecordStore, settings: GraphSettings) -> Self {
        Self {
            store,
            settings,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<GraphCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Render a view, serving from the cache while the store is unchanged.
    pub async fn render(&self, query: &ViewQuery) -> Result<Graph> {
        let threshold = self.threshold(query.threshold)?;

        let key = match &self.cache {
            Some(cache) => {
                let key = GraphCache::key(query, self.store.generation())?;
                if let Some(graph) = cache.get(&key) {
                    debug!("Graph cache hit for {:?}", query.view);
                    return Ok(graph);
                }
                Some(key)
            }
            None => None,
        };

        let scope = &query.scope;
        let graph = match &query.view {
            ViewRequest::Subtree { root_id, max_depth } => {
                self.subtree(root_id, *max_depth, scope, threshold).await?
            }
            ViewRequest::Global { limit } => self.global(*limit, scope, threshold).await?,
            ViewRequest::Keyword { keyword } => self.keyword(keyword, scope, threshold).await?,
            ViewRequest::KeywordNetwork { top_k } => {
                self.keyword_network(*top_k, scope, threshold).await?
            }
            ViewRequest::Person { name, relation } => self.person(name, *relation, scope).await?,
        };

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.put(key, graph.clone());
        }
        Ok(graph)
    }

    /// Root and descendants with valid records; the root is the center.
    pub async fn subtree(
        &self,
        root_id: &str,
        max_depth: Option<usize>,
        scope: &ViewScope,
        threshold: f64,
    ) -> Result<Graph> {
        if self.store.get_document(root_id).await?.is_none() {
            return Err(DocgraphError::DocumentNotFound(root_id.to_string()));
        }
        let ids = descendant_ids(&self.store, root_id, max_depth).await?;
        let inputs = self.inputs(scope.filter().with_ids(ids)).await?;

        let mut graph = build_graph(&inputs, threshold, &self.settings.sizing);
        graph.center = graph.node(root_id).map(|n| n.id.clone());
        debug!(
            "Subtree view of {}: {} nodes, {} edges",
            root_id,
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    /// Valid documents, optionally capped to the most recently modified.
    pub async fn global(
        &self,
        limit: Option<usize>,
        scope: &ViewScope,
        threshold: f64,
    ) -> Result<Graph> {
        let limit = limit.unwrap_or(self.settings.global_limit);
        let mut filter = scope.filter();
        if limit > 0 {
            let ids = self
                .store
                .recent_valid_ids(scope.space_key.as_deref(), limit)
                .await?;
            filter = filter.with_ids(ids);
        }
        let inputs = self.inputs(filter).await?;

        let center = inputs
            .iter()
            .max_by(|a, b| {
                a.keywords
                    .len()
                    .cmp(&b.keywords.len())
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|n| n.id.clone());
        let mut graph = build_graph(&inputs, threshold, &self.settings.sizing);
        graph.center = center;
        Ok(graph)
    }

    /// Documents carrying `keyword`, linked to one synthetic keyword node.
    pub async fn keyword(&self, keyword: &str, scope: &ViewScope, threshold: f64) -> Result<Graph> {
        let keyword = KeywordSet::normalize(keyword)
            .ok_or_else(|| DocgraphError::InvalidInput("keyword must not be empty".to_string()))?;
        let inputs = self.inputs(scope.filter().with_keyword(&keyword)).await?;
        if inputs.is_empty() {
            return Ok(Graph::default());
        }

        let mut graph = build_graph(&inputs, threshold, &self.settings.sizing);
        let node_id = GraphNode::keyword_id(&keyword);
        for input in &inputs {
            graph
                .edges
                .push(GraphEdge::new(&node_id, &input.id, 1.0, vec![keyword.clone()]));
        }
        let documents: Vec<DocumentRef> = inputs.iter().map(document_ref).collect();
        graph.nodes.push(GraphNode {
            id: node_id.clone(),
            title: keyword.clone(),
            keywords: vec![keyword.clone()],
            size: self.settings.sizing.max,
            summary: format!("{} documents", documents.len()),
            url: String::new(),
            kind: NodeKind::Keyword {
                frequency: documents.len(),
                documents,
            },
        });
        graph.center = Some(node_id);
        Ok(graph.sorted())
    }

    /// Keyword nodes weighted by Jaccard of the documents they occur in.
    pub async fn keyword_network(
        &self,
        top_k: Option<usize>,
        scope: &ViewScope,
        threshold: f64,
    ) -> Result<Graph> {
        let top_k = top_k.unwrap_or(self.settings.keyword_network_top_k);
        if top_k == 0 {
            return Err(DocgraphError::InvalidInput(
                "top_k must be at least 1".to_string(),
            ));
        }

        let mut occurrences: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut refs: BTreeMap<String, DocumentRef> = BTreeMap::new();
        let mut scan = self.store.scan(scope.filter());
        while let Some(batch) = scan.next_batch().await? {
            for item in batch {
                for kw in item.record.keywords.iter() {
                    occurrences
                        .entry(kw.clone())
                        .or_default()
                        .insert(item.document.id.clone());
                }
                refs.insert(
                    item.document.id.clone(),
                    DocumentRef {
                        id: item.document.id,
                        title: item.document.title,
                        url: item.document.url,
                    },
                );
            }
        }

        let mut ranked: Vec<(&String, &BTreeSet<String>)> = occurrences.iter().collect();
        ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(top_k);
        let max_frequency = ranked.first().map(|(_, docs)| docs.len()).unwrap_or(0);

        let mut edges = Vec::new();
        for (i, (kw_a, docs_a)) in ranked.iter().enumerate() {
            for (kw_b, docs_b) in &ranked[i + 1..] {
                let weight = jaccard_sets(docs_a, docs_b);
                if weight > 0.0 && weight >= threshold {
                    edges.push(GraphEdge::new(
                        &GraphNode::keyword_id(kw_a),
                        &GraphNode::keyword_id(kw_b),
                        weight,
                        Vec::new(),
                    ));
                }
            }
        }

        let nodes = ranked
            .iter()
            .map(|(kw, docs)| GraphNode {
                id: GraphNode::keyword_id(kw),
                title: (*kw).clone(),
                keywords: vec![(*kw).clone()],
                size: self.settings.sizing.scale(docs.len(), max_frequency),
                summary: format!("{} documents", docs.len()),
                url: String::new(),
                kind: NodeKind::Keyword {
                    frequency: docs.len(),
                    documents: docs.iter().filter_map(|id| refs.get(id).cloned()).collect(),
                },
            })
            .collect();

        Ok(Graph {
            nodes,
            edges,
            center: ranked.first().map(|(kw, _)| GraphNode::keyword_id(kw)),
        }
        .sorted())
    }

    /// A person linked to each document they created, modified or are mentioned in.
    pub async fn person(
        &self,
        name: &str,
        relation: Option<RelationKind>,
        scope: &ViewScope,
    ) -> Result<Graph> {
        let person = self
            .store
            .person_by_name(name)
            .await?
            .ok_or_else(|| DocgraphError::PersonNotFound(name.to_string()))?;
        let relations = self.store.person_relations(person.person_id, relation).await?;

        let mut by_doc: BTreeMap<String, Vec<PersonRelation>> = BTreeMap::new();
        for rel in relations {
            by_doc.entry(rel.doc_id.clone()).or_default().push(rel);
        }
        let inputs = self
            .inputs(scope.filter().with_ids(by_doc.keys().cloned().collect()))
            .await?;

        let person_node = GraphNode::person_id(&person.normalized_name);
        let sizing = &self.settings.sizing;
        let mut nodes = Vec::with_capacity(inputs.len() + 1);
        let mut edges = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let Some(rels) = by_doc.get(&input.id) else {
                continue;
            };
            let Some(strongest) = rels.iter().min_by_key(|r| r.relation) else {
                continue;
            };
            let kinds: Vec<RelationKind> = rels
                .iter()
                .map(|r| r.relation)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            nodes.push(input.to_node(sizing.scale(kinds.len(), RelationKind::ALL.len())));
            let mut edge = GraphEdge::new(
                &person_node,
                &input.id,
                relation_weight(strongest.relation, strongest.confidence),
                Vec::new(),
            );
            edge.relations = kinds;
            edges.push(edge);
        }

        let summary = [person.department.clone(), person.role.clone()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        nodes.push(GraphNode {
            id: person_node.clone(),
            title: person.display_name.clone(),
            keywords: Vec::new(),
            size: sizing.max,
            summary,
            url: String::new(),
            kind: NodeKind::Person {
                person_id: person.person_id,
                email: person.email.clone(),
                department: person.department.clone(),
                role: person.role.clone(),
            },
        });

        Ok(Graph {
            nodes,
            edges,
            center: Some(person_node),
        }
        .sorted())
    }

    fn threshold(&self, requested: Option<f64>) -> Result<f64> {
        let threshold = requested.unwrap_or(self.settings.threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DocgraphError::InvalidInput(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(threshold)
    }

    async fn inputs(&self, filter: ScanFilter) -> Result<Vec<NodeInput>> {
        Ok(self
            .store
            .scan(filter)
            .collect_all()
            .await?
            .into_iter()
            .map(NodeInput::from)
            .collect())
    }
}

fn document_ref(input: &NodeInput) -> DocumentRef {
    DocumentRef {
        id: input.id.clone(),
        title: input.title.clone(),
        url: input.url.clone(),
    }
}

/// Edge weight for a person-document relation.
fn relation_weight(kind: RelationKind, confidence: f64) -> f64 {
    match kind {
        RelationKind::Creator => 1.0,
        RelationKind::Modifier => 0.8,
        RelationKind::Mentioned => confidence.clamp(0.0, 1.0),
    }
}
