//! Concept graph engine.
//!
//! Builds the weighted concept map incrementally from the concept lists of
//! generated sparks. Every concept named by a spark becomes (or reinforces) a
//! node, and every unordered pair of those concepts becomes (or reinforces) a
//! link.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sparkmap_graph::{ConceptGraph, ConceptStorage};
//!
//! let store = Arc::new(ConceptStorage::new(storage));
//! let graph = ConceptGraph::new(store, settings.graph.clone());
//! graph
//!     .process_content_concepts("s1", &["Fotosintesis", "Klorofil", "Karbon"])
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sparkmap_types::{ConceptLink, ConceptNode, GraphConfig};
use tracing::{debug, info, instrument};

use crate::error::GraphError;
use crate::extraction::{normalize_concepts, ConceptExtractor};
use crate::store::{GraphStore, LinkUpsert, NodeUpsert};

/// Nodes and links touched while processing one spark.
#[derive(Debug, Clone, Default)]
pub struct ContentUpdate {
    pub nodes: Vec<ConceptNode>,
    pub links: Vec<ConceptLink>,
}

impl ContentUpdate {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

/// Summary counts for the concept graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub link_count: usize,
    pub cluster_count: usize,
    /// Mean link strength, 0.0 for an empty graph
    pub average_link_strength: f64,
}

/// The concept graph engine.
pub struct ConceptGraph<S: GraphStore> {
    store: Arc<S>,
    config: GraphConfig,
}

impl<S: GraphStore> ConceptGraph<S> {
    pub fn new(store: Arc<S>, config: GraphConfig) -> Self {
        Self { store, config }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Create the concept `name` or reinforce it.
    ///
    /// A new concept starts at the configured initial weight with `origin_id`
    /// as its only spark. An existing one (matched case-insensitively) gets
    /// `origin_id` appended and its weight raised, saturating at 1.0.
    #[instrument(skip(self))]
    pub async fn add_or_update_concept(
        &self,
        name: &str,
        origin_id: &str,
        default_cluster: Option<&str>,
    ) -> Result<ConceptNode, GraphError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::InvalidInput(
                "Concept name must not be empty".to_string(),
            ));
        }

        let upsert = NodeUpsert {
            name: name.to_string(),
            origin_id: origin_id.to_string(),
            cluster: default_cluster
                .unwrap_or(&self.config.default_cluster)
                .to_string(),
            initial_weight: self.config.initial_weight,
            weight_delta: self.config.weight_increment,
        };
        self.store.upsert_node(&upsert).await
    }

    /// Create the link between two existing concepts or reinforce it.
    ///
    /// Both names must resolve to existing nodes; this never creates nodes.
    /// `increment` defaults to the configured link increment.
    #[instrument(skip(self))]
    pub async fn create_or_update_link(
        &self,
        name_a: &str,
        name_b: &str,
        origin_id: &str,
        increment: Option<f64>,
    ) -> Result<ConceptLink, GraphError> {
        let node_a = self.require_node_by_name(name_a).await?;
        let node_b = self.require_node_by_name(name_b).await?;

        let upsert = LinkUpsert {
            concept_a: node_a.id,
            concept_b: node_b.id,
            origin_id: origin_id.to_string(),
            initial_strength: self.config.initial_link_strength,
            increment: increment.unwrap_or(self.config.link_increment),
            link_type: self.config.default_link_type.clone(),
        };
        self.store.upsert_link(&upsert).await
    }

    async fn require_node_by_name(&self, name: &str) -> Result<ConceptNode, GraphError> {
        self.store
            .find_node_by_name(name)
            .await?
            .ok_or_else(|| GraphError::ConceptNotFound(name.to_string()))
    }

    /// Fold the concept list of one spark into the graph.
    ///
    /// Every concept is added or reinforced, then every unordered pair is
    /// linked. An empty list is a no-op. A failure part way through leaves
    /// the updates made so far in place.
    #[instrument(skip(self, concept_names), fields(count = concept_names.len()))]
    pub async fn process_content_concepts<N: AsRef<str> + Sync>(
        &self,
        origin_id: &str,
        concept_names: &[N],
    ) -> Result<ContentUpdate, GraphError> {
        let names = normalize_concepts(concept_names);
        if names.is_empty() {
            debug!(origin_id, "No concepts extracted, skipping graph update");
            return Ok(ContentUpdate::default());
        }

        let mut update = ContentUpdate::default();
        for name in &names {
            let node = self.add_or_update_concept(name, origin_id, None).await?;
            update.nodes.push(node);
        }

        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let link = self
                    .create_or_update_link(&names[i], &names[j], origin_id, None)
                    .await?;
                update.links.push(link);
            }
        }

        info!(
            origin_id,
            nodes = update.nodes.len(),
            links = update.links.len(),
            "Processed spark concepts"
        );
        Ok(update)
    }

    /// Extract concepts from spark text and fold them into the graph.
    #[instrument(skip(self, text, extractor))]
    pub async fn process_content(
        &self,
        origin_id: &str,
        text: &str,
        extractor: &dyn ConceptExtractor,
    ) -> Result<ContentUpdate, GraphError> {
        let concepts = extractor.extract_concepts(text).await?;
        self.process_content_concepts(origin_id, concepts.as_slice())
            .await
    }

    // --- Queries ---

    pub async fn get_node(&self, id: &str) -> Result<Option<ConceptNode>, GraphError> {
        self.store.get_node(id).await
    }

    /// Case-insensitive lookup.
    pub async fn get_node_by_name(&self, name: &str) -> Result<Option<ConceptNode>, GraphError> {
        self.store.find_node_by_name(name).await
    }

    pub async fn all_nodes(&self) -> Result<Vec<ConceptNode>, GraphError> {
        self.store.list_nodes().await
    }

    pub async fn all_links(&self) -> Result<Vec<ConceptLink>, GraphError> {
        self.store.list_links().await
    }

    /// Links with `node_id` as an endpoint, strongest first.
    pub async fn links_for_node(&self, node_id: &str) -> Result<Vec<ConceptLink>, GraphError> {
        let mut links: Vec<ConceptLink> = self
            .store
            .list_links()
            .await?
            .into_iter()
            .filter(|link| link.touches(node_id))
            .collect();
        sort_by_strength(&mut links);
        Ok(links)
    }

    /// Links with strength at or above `threshold`, strongest first.
    pub async fn strong_links(&self, threshold: f64) -> Result<Vec<ConceptLink>, GraphError> {
        let mut links: Vec<ConceptLink> = self
            .store
            .list_links()
            .await?
            .into_iter()
            .filter(|link| link.strength >= threshold)
            .collect();
        sort_by_strength(&mut links);
        Ok(links)
    }

    /// The `limit` nodes with the most incident links, with their degree.
    ///
    /// Ties are broken by weight, then by id.
    pub async fn most_connected(
        &self,
        limit: usize,
    ) -> Result<Vec<(ConceptNode, usize)>, GraphError> {
        let nodes = self.store.list_nodes().await?;
        let links = self.store.list_links().await?;

        let mut degree: HashMap<&str, usize> = HashMap::new();
        for link in &links {
            *degree.entry(link.concept_a.as_str()).or_default() += 1;
            *degree.entry(link.concept_b.as_str()).or_default() += 1;
        }

        let mut ranked: Vec<(ConceptNode, usize)> = nodes
            .into_iter()
            .map(|node| {
                let count = degree.get(node.id.as_str()).copied().unwrap_or(0);
                (node, count)
            })
            .collect();
        ranked.sort_by(|(a, da), (b, db)| {
            db.cmp(da)
                .then_with(|| {
                    b.weight
                        .partial_cmp(&a.weight)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Node, link and cluster counts.
    pub async fn graph_stats(&self) -> Result<GraphStats, GraphError> {
        let node_count = self.store.list_nodes().await?.len();
        let links = self.store.list_links().await?;
        let cluster_count = self.store.list_clusters().await?.len();

        let average_link_strength = if links.is_empty() {
            0.0
        } else {
            links.iter().map(|l| l.strength).sum::<f64>() / links.len() as f64
        };

        Ok(GraphStats {
            node_count,
            link_count: links.len(),
            cluster_count,
            average_link_strength,
        })
    }

    // --- Maintenance ---

    /// Delete one concept and every link touching it.
    #[instrument(skip(self))]
    pub async fn delete_concept(&self, id: &str) -> Result<(), GraphError> {
        if self.store.delete_node(id).await? {
            info!(node_id = %id, "Deleted concept");
            Ok(())
        } else {
            Err(GraphError::ConceptNotFound(id.to_string()))
        }
    }

    /// Delete all nodes, links and clusters. Irreversible.
    #[instrument(skip(self))]
    pub async fn reset_graph(&self) -> Result<(), GraphError> {
        self.store.clear().await?;
        info!("Concept graph reset");
        Ok(())
    }
}

fn sort_by_strength(links: &mut [ConceptLink]) {
    links.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
