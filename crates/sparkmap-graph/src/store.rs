//! Persistence interface for the concept graph.
//!
//! Engines are generic over [`GraphStore`] so a fake store can be injected in
//! tests. [`crate::storage::ConceptStorage`] is the RocksDB implementation.

use async_trait::async_trait;

use sparkmap_types::{ConceptCluster, ConceptLink, ConceptNode};

use crate::error::GraphError;

/// Parameters of an add-or-reinforce node update.
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub name: String,
    pub origin_id: String,
    /// Cluster label for a newly created node
    pub cluster: String,
    /// Weight of a newly created node
    pub initial_weight: f64,
    /// Weight added to an existing node
    pub weight_delta: f64,
}

/// Parameters of a create-or-reinforce link update between two node ids.
#[derive(Debug, Clone)]
pub struct LinkUpsert {
    pub concept_a: String,
    pub concept_b: String,
    pub origin_id: String,
    /// Strength of a newly created link
    pub initial_strength: f64,
    /// Strength added to an existing link
    pub increment: f64,
    pub link_type: String,
}

/// Store for concept nodes, links and clusters.
///
/// `upsert_node` and `upsert_link` must be atomic with respect to each other:
/// the read of the current weight or strength and the write of the new value
/// happen as one step.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the node named `upsert.name` (case-insensitive) or reinforce it.
    async fn upsert_node(&self, upsert: &NodeUpsert) -> Result<ConceptNode, GraphError>;

    async fn get_node(&self, id: &str) -> Result<Option<ConceptNode>, GraphError>;

    /// Case-insensitive lookup.
    async fn find_node_by_name(&self, name: &str) -> Result<Option<ConceptNode>, GraphError>;

    /// All nodes, ordered by id.
    async fn list_nodes(&self) -> Result<Vec<ConceptNode>, GraphError>;

    /// Delete a node and every link touching it. Returns false if absent.
    async fn delete_node(&self, id: &str) -> Result<bool, GraphError>;

    /// Create the link between two existing node ids or reinforce it.
    ///
    /// Fails with `ConceptNotFound` if either node is missing when the write
    /// happens, so a link never outlives a concurrently deleted endpoint.
    async fn upsert_link(&self, upsert: &LinkUpsert) -> Result<ConceptLink, GraphError>;

    /// Link between two node ids, in either order.
    async fn get_link(&self, concept_x: &str, concept_y: &str)
        -> Result<Option<ConceptLink>, GraphError>;

    async fn list_links(&self) -> Result<Vec<ConceptLink>, GraphError>;

    /// Store a cluster, overwriting any stored cluster with the same name.
    ///
    /// An overwritten cluster keeps its id. Returns the stored record.
    async fn upsert_cluster_by_name(
        &self,
        cluster: ConceptCluster,
    ) -> Result<ConceptCluster, GraphError>;

    async fn get_cluster(&self, id: &str) -> Result<Option<ConceptCluster>, GraphError>;

    async fn find_cluster_by_name(&self, name: &str)
        -> Result<Option<ConceptCluster>, GraphError>;

    async fn list_clusters(&self) -> Result<Vec<ConceptCluster>, GraphError>;

    /// Returns false if absent.
    async fn delete_cluster(&self, id: &str) -> Result<bool, GraphError>;

    /// Delete all nodes, links and clusters.
    async fn clear(&self) -> Result<(), GraphError>;
}
