//! Concept cluster detection.
//!
//! Clusters are recomputed from a full snapshot of the graph on every call:
//! links weaker than the configured minimum are dropped, the remaining graph
//! is split into connected components by breadth-first search, and every
//! component with at least two concepts becomes a named, scored cluster.
//!
//! ## Scoring
//!
//! - **Name**: the names of the highest-weight members joined with `" & "`
//! - **Coherence**: `0.7 * avg_link_strength + 0.3 * link_density`
//! - **Spark count**: distinct sparks across all members
//!
//! Stored clusters are keyed by name: a cluster whose derived name matches a
//! stored one overwrites it and keeps its id.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sparkmap_types::{ClusteringConfig, ConceptCluster, ConceptLink, ConceptNode};
use tracing::{debug, info, instrument, warn};

use crate::error::GraphError;
use crate::graph::ConceptGraph;
use crate::store::GraphStore;

/// Separator between concept names in a cluster name.
pub const CLUSTER_NAME_SEPARATOR: &str = " & ";

/// Number of concepts reported as dominant and as weak by `analyze_cluster`.
const ANALYSIS_SIZE: usize = 3;

/// Strongest and weakest members of a cluster.
#[derive(Debug, Clone)]
pub struct ClusterAnalysis {
    pub cluster: ConceptCluster,
    /// Up to three highest-weight members, heaviest first
    pub dominant_concepts: Vec<ConceptNode>,
    /// Up to three lowest-weight members, lightest first. May overlap with
    /// `dominant_concepts` for clusters of five or fewer members.
    pub weak_concepts: Vec<ConceptNode>,
}

/// Member weight spread of one stored cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterVariance {
    pub cluster_id: String,
    pub name: String,
    pub variance: f64,
    /// Variance exceeded the configured threshold
    pub needs_split: bool,
}

/// Group node indices into connected components over links at or above
/// `min_strength`.
///
/// Components are returned in order of their lowest node index, each sorted
/// ascending. Links pointing at unknown nodes are ignored.
pub fn connected_components(
    nodes: &[ConceptNode],
    links: &[ConceptLink],
    min_strength: f64,
) -> Vec<Vec<usize>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.as_str(), i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for link in links.iter().filter(|link| link.strength >= min_strength) {
        if let (Some(&a), Some(&b)) = (
            index.get(link.concept_a.as_str()),
            index.get(link.concept_b.as_str()),
        ) {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }

    let mut visited = vec![false; nodes.len()];
    let mut components = Vec::new();

    for start in 0..nodes.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;

        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            component.push(current);
            for &next in &adjacency[current] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }

        component.sort_unstable();
        components.push(component);
    }

    components
}

/// Join the names of the `count` heaviest members.
///
/// Equal weights keep the order of `members`.
pub fn cluster_name(members: &[&ConceptNode], count: usize) -> String {
    let mut ranked: Vec<&ConceptNode> = members.to_vec();
    ranked.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
        .iter()
        .take(count)
        .map(|node| node.name.as_str())
        .collect::<Vec<_>>()
        .join(CLUSTER_NAME_SEPARATOR)
}

/// Score how tightly a set of concepts is linked.
///
/// Uses every link with both endpoints in `member_ids`. Falls back to
/// `config.fallback_coherence` when there are none.
pub fn coherence(member_ids: &HashSet<&str>, links: &[ConceptLink], config: &ClusteringConfig) -> f64 {
    let internal: Vec<&ConceptLink> = links
        .iter()
        .filter(|link| {
            member_ids.contains(link.concept_a.as_str()) && member_ids.contains(link.concept_b.as_str())
        })
        .collect();

    if internal.is_empty() {
        return config.fallback_coherence;
    }

    let n = member_ids.len() as f64;
    let possible = n * (n - 1.0) / 2.0;
    let avg_strength = internal.iter().map(|link| link.strength).sum::<f64>() / internal.len() as f64;
    let density = if possible > 0.0 {
        (internal.len() as f64 / possible).min(1.0)
    } else {
        0.0
    };

    (config.strength_weight * avg_strength + config.density_weight * density).clamp(0.0, 1.0)
}

/// Population variance of a set of weights. 0.0 for an empty set.
pub fn weight_variance(weights: &[f64]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }
    let n = weights.len() as f64;
    let mean = weights.iter().sum::<f64>() / n;
    weights.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / n
}

/// Build unsaved clusters from a graph snapshot.
///
/// Singleton components are dropped.
pub fn build_clusters(
    nodes: &[ConceptNode],
    links: &[ConceptLink],
    config: &ClusteringConfig,
) -> Vec<ConceptCluster> {
    connected_components(nodes, links, config.min_link_strength)
        .into_iter()
        .filter(|component| component.len() >= 2)
        .map(|component| {
            let members: Vec<&ConceptNode> = component.iter().map(|&i| &nodes[i]).collect();
            let member_ids: HashSet<&str> = members.iter().map(|node| node.id.as_str()).collect();

            let sparks: HashSet<&str> = members
                .iter()
                .flat_map(|node| node.spark_ids.iter().map(String::as_str))
                .collect();

            ConceptCluster::new(
                cluster_name(&members, config.name_concept_count),
                members.iter().map(|node| node.id.clone()).collect(),
                coherence(&member_ids, links, config),
                sparks.len() as u32,
            )
        })
        .collect()
}

/// The cluster engine.
pub struct ClusterEngine<S: GraphStore> {
    graph: Arc<ConceptGraph<S>>,
    config: ClusteringConfig,
}

impl<S: GraphStore> ClusterEngine<S> {
    pub fn new(graph: Arc<ConceptGraph<S>>, config: ClusteringConfig) -> Self {
        Self { graph, config }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Recompute clusters from the current graph and store them by name.
    ///
    /// Returns the clusters produced by this run. Stored clusters whose name
    /// was not produced are kept unless `prune_stale` is configured.
    #[instrument(skip(self))]
    pub async fn detect_clusters(&self) -> Result<Vec<ConceptCluster>, GraphError> {
        let nodes = self.graph.all_nodes().await?;
        let links = self.graph.all_links().await?;

        let candidates = build_clusters(&nodes, &links, &self.config);
        debug!(
            nodes = nodes.len(),
            links = links.len(),
            candidates = candidates.len(),
            "Built cluster candidates"
        );

        let store = self.graph.store();
        let mut clusters = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            clusters.push(store.upsert_cluster_by_name(candidate).await?);
        }

        if self.config.prune_stale {
            let produced: HashSet<&str> = clusters.iter().map(|c| c.id.as_str()).collect();
            let mut pruned = 0usize;
            for stored in store.list_clusters().await? {
                if !produced.contains(stored.id.as_str()) && store.delete_cluster(&stored.id).await? {
                    pruned += 1;
                }
            }
            debug!(pruned, "Pruned stale clusters");
        }

        info!(clusters = clusters.len(), "Detected concept clusters");
        Ok(clusters)
    }

    pub async fn get_cluster_by_id(&self, id: &str) -> Result<Option<ConceptCluster>, GraphError> {
        self.graph.store().get_cluster(id).await
    }

    pub async fn get_cluster_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ConceptCluster>, GraphError> {
        self.graph.store().find_cluster_by_name(name).await
    }

    /// All stored clusters, most coherent first, then by spark count.
    pub async fn get_all_clusters(&self) -> Result<Vec<ConceptCluster>, GraphError> {
        let mut clusters = self.graph.store().list_clusters().await?;
        clusters.sort_by(|a, b| {
            b.coherence
                .partial_cmp(&a.coherence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.spark_count.cmp(&a.spark_count))
        });
        Ok(clusters)
    }

    /// Report the heaviest and lightest members of a cluster.
    #[instrument(skip(self))]
    pub async fn analyze_cluster(&self, cluster_id: &str) -> Result<ClusterAnalysis, GraphError> {
        let cluster = self.require_cluster(cluster_id).await?;
        let mut members = self.resolve_members(&cluster).await?;
        members.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let dominant_concepts = members.iter().take(ANALYSIS_SIZE).cloned().collect();
        let weak_concepts = members.iter().rev().take(ANALYSIS_SIZE).cloned().collect();

        Ok(ClusterAnalysis {
            cluster,
            dominant_concepts,
            weak_concepts,
        })
    }

    /// Report member weight variance for every stored cluster.
    ///
    /// Advisory only: clusters above the threshold are logged and flagged,
    /// nothing is split or modified.
    #[instrument(skip(self))]
    pub async fn rebalance_clusters(&self) -> Result<Vec<ClusterVariance>, GraphError> {
        let mut report = Vec::new();
        for cluster in self.graph.store().list_clusters().await? {
            let weights: Vec<f64> = self
                .resolve_members(&cluster)
                .await?
                .iter()
                .map(|node| node.weight)
                .collect();
            let variance = weight_variance(&weights);
            let needs_split = variance > self.config.variance_threshold;
            if needs_split {
                warn!(
                    cluster_id = %cluster.id,
                    name = %cluster.name,
                    variance,
                    "Cluster weight variance above threshold, consider splitting"
                );
            }
            report.push(ClusterVariance {
                cluster_id: cluster.id,
                name: cluster.name,
                variance,
                needs_split,
            });
        }
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn delete_cluster(&self, id: &str) -> Result<(), GraphError> {
        if self.graph.store().delete_cluster(id).await? {
            info!(cluster_id = %id, "Deleted cluster");
            Ok(())
        } else {
            Err(GraphError::ClusterNotFound(id.to_string()))
        }
    }

    async fn require_cluster(&self, id: &str) -> Result<ConceptCluster, GraphError> {
        self.graph
            .store()
            .get_cluster(id)
            .await?
            .ok_or_else(|| GraphError::ClusterNotFound(id.to_string()))
    }

    /// Member nodes that still exist, in stored order.
    async fn resolve_members(&self, cluster: &ConceptCluster) -> Result<Vec<ConceptNode>, GraphError> {
        let mut members = Vec::with_capacity(cluster.concepts.len());
        for id in &cluster.concepts {
            if let Some(node) = self.graph.get_node(id).await? {
                members.push(node);
            }
        }
        Ok(members)
    }
}
