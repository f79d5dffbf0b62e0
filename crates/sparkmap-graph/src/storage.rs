//! Concept graph storage operations.
//!
//! Manages concept nodes, links and clusters in RocksDB column families.

use std::sync::Arc;

use async_trait::async_trait;
use sparkmap_storage::column_families::{CF_CONCEPT_CLUSTERS, CF_CONCEPT_LINKS, CF_CONCEPT_NODES};
use sparkmap_storage::keys::{
    cluster_key, cluster_name_key, link_key, node_key, node_name_key,
};
use sparkmap_storage::{Batch, Storage};
use sparkmap_types::{canonical_pair, name_key, ConceptCluster, ConceptLink, ConceptNode};
use tracing::{debug, info, instrument};

use crate::error::GraphError;
use crate::store::{GraphStore, LinkUpsert, NodeUpsert};

/// RocksDB-backed [`GraphStore`].
pub struct ConceptStorage {
    storage: Arc<Storage>,
}

impl ConceptStorage {
    /// Create a new concept storage wrapper.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Get underlying storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    fn node_by_id(&self, id: &str) -> Result<Option<ConceptNode>, GraphError> {
        Ok(self
            .storage
            .get_json(CF_CONCEPT_NODES, node_key(id).as_bytes())?)
    }

    fn node_by_name(&self, name: &str) -> Result<Option<ConceptNode>, GraphError> {
        let index_key = node_name_key(&name_key(name));
        match self
            .storage
            .get_string(CF_CONCEPT_NODES, index_key.as_bytes())?
        {
            Some(id) => self.node_by_id(&id),
            None => Ok(None),
        }
    }

    fn cluster_by_name(&self, name: &str) -> Result<Option<ConceptCluster>, GraphError> {
        match self
            .storage
            .get_string(CF_CONCEPT_CLUSTERS, cluster_name_key(name).as_bytes())?
        {
            Some(id) => Ok(self
                .storage
                .get_json(CF_CONCEPT_CLUSTERS, cluster_key(&id).as_bytes())?),
            None => Ok(None),
        }
    }

    fn all_links(&self) -> Result<Vec<ConceptLink>, GraphError> {
        Ok(self.storage.prefix_json(CF_CONCEPT_LINKS, b"link:")?)
    }
}

#[async_trait]
impl GraphStore for ConceptStorage {
    #[instrument(skip(self, upsert), fields(name = %upsert.name))]
    async fn upsert_node(&self, upsert: &NodeUpsert) -> Result<ConceptNode, GraphError> {
        self.storage.locked(|storage| {
            let (node, created) = match self.node_by_name(&upsert.name)? {
                Some(mut existing) => {
                    existing.reinforce(&upsert.origin_id, upsert.weight_delta);
                    (existing, false)
                }
                None => (
                    ConceptNode::new(
                        upsert.name.clone(),
                        upsert.cluster.clone(),
                        &upsert.origin_id,
                        upsert.initial_weight,
                    ),
                    true,
                ),
            };

            let mut batch = Batch::new();
            batch.put_json(CF_CONCEPT_NODES, node_key(&node.id), &node)?;
            if created {
                batch.put(
                    CF_CONCEPT_NODES,
                    node_name_key(&name_key(&node.name)),
                    node.id.clone().into_bytes(),
                );
            }
            storage.commit(batch)?;

            debug!(node_id = %node.id, weight = node.weight, created, "Saved concept node");
            Ok(node)
        })
    }

    async fn get_node(&self, id: &str) -> Result<Option<ConceptNode>, GraphError> {
        self.node_by_id(id)
    }

    async fn find_node_by_name(&self, name: &str) -> Result<Option<ConceptNode>, GraphError> {
        self.node_by_name(name)
    }

    async fn list_nodes(&self) -> Result<Vec<ConceptNode>, GraphError> {
        Ok(self.storage.prefix_json(CF_CONCEPT_NODES, b"node:")?)
    }

    #[instrument(skip(self))]
    async fn delete_node(&self, id: &str) -> Result<bool, GraphError> {
        self.storage.locked(|storage| {
            let node = match self.node_by_id(id)? {
                Some(node) => node,
                None => return Ok(false),
            };

            let mut batch = Batch::new();
            batch.delete(CF_CONCEPT_NODES, node_key(&node.id));
            batch.delete(CF_CONCEPT_NODES, node_name_key(&name_key(&node.name)));

            let mut removed_links = 0usize;
            for link in self.all_links()? {
                if link.touches(&node.id) {
                    batch.delete(CF_CONCEPT_LINKS, link_key(&link.concept_a, &link.concept_b));
                    removed_links += 1;
                }
            }
            storage.commit(batch)?;

            debug!(node_id = %id, removed_links, "Deleted concept node");
            Ok(true)
        })
    }

    #[instrument(skip(self, upsert), fields(a = %upsert.concept_a, b = %upsert.concept_b))]
    async fn upsert_link(&self, upsert: &LinkUpsert) -> Result<ConceptLink, GraphError> {
        if upsert.concept_a == upsert.concept_b {
            return Err(GraphError::InvalidInput(
                "A concept cannot be linked to itself".to_string(),
            ));
        }

        let (a, b) = canonical_pair(&upsert.concept_a, &upsert.concept_b);
        let key = link_key(a, b);

        self.storage.locked(|storage| {
            // A concurrent delete_node may have removed an endpoint
            for id in [a, b] {
                if self.node_by_id(id)?.is_none() {
                    return Err(GraphError::ConceptNotFound(id.to_string()));
                }
            }

            let link = match storage.get_json::<ConceptLink>(CF_CONCEPT_LINKS, key.as_bytes())? {
                Some(mut existing) => {
                    existing.reinforce(&upsert.origin_id, upsert.increment);
                    existing
                }
                None => ConceptLink::new(
                    a,
                    b,
                    &upsert.origin_id,
                    upsert.initial_strength,
                    upsert.link_type.clone(),
                ),
            };

            storage.put_json(CF_CONCEPT_LINKS, key.as_bytes(), &link)?;
            debug!(link_id = %link.id, strength = link.strength, "Saved concept link");
            Ok(link)
        })
    }

    async fn get_link(
        &self,
        concept_x: &str,
        concept_y: &str,
    ) -> Result<Option<ConceptLink>, GraphError> {
        let (a, b) = canonical_pair(concept_x, concept_y);
        Ok(self
            .storage
            .get_json(CF_CONCEPT_LINKS, link_key(a, b).as_bytes())?)
    }

    async fn list_links(&self) -> Result<Vec<ConceptLink>, GraphError> {
        self.all_links()
    }

    #[instrument(skip(self, cluster), fields(name = %cluster.name))]
    async fn upsert_cluster_by_name(
        &self,
        cluster: ConceptCluster,
    ) -> Result<ConceptCluster, GraphError> {
        self.storage.locked(|storage| {
            let mut record = cluster;
            let existing = self.cluster_by_name(&record.name)?;
            if let Some(existing) = &existing {
                record.id = existing.id.clone();
            }

            let mut batch = Batch::new();
            batch.put_json(CF_CONCEPT_CLUSTERS, cluster_key(&record.id), &record)?;
            if existing.is_none() {
                batch.put(
                    CF_CONCEPT_CLUSTERS,
                    cluster_name_key(&record.name),
                    record.id.clone().into_bytes(),
                );
            }
            storage.commit(batch)?;

            debug!(
                cluster_id = %record.id,
                replaced = existing.is_some(),
                "Saved concept cluster"
            );
            Ok(record)
        })
    }

    async fn get_cluster(&self, id: &str) -> Result<Option<ConceptCluster>, GraphError> {
        Ok(self
            .storage
            .get_json(CF_CONCEPT_CLUSTERS, cluster_key(id).as_bytes())?)
    }

    async fn find_cluster_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ConceptCluster>, GraphError> {
        self.cluster_by_name(name)
    }

    async fn list_clusters(&self) -> Result<Vec<ConceptCluster>, GraphError> {
        Ok(self.storage.prefix_json(CF_CONCEPT_CLUSTERS, b"cluster:")?)
    }

    #[instrument(skip(self))]
    async fn delete_cluster(&self, id: &str) -> Result<bool, GraphError> {
        self.storage.locked(|storage| {
            let cluster: ConceptCluster =
                match storage.get_json(CF_CONCEPT_CLUSTERS, cluster_key(id).as_bytes())? {
                    Some(cluster) => cluster,
                    None => return Ok(false),
                };

            let mut batch = Batch::new();
            batch.delete(CF_CONCEPT_CLUSTERS, cluster_key(&cluster.id));
            batch.delete(CF_CONCEPT_CLUSTERS, cluster_name_key(&cluster.name));
            storage.commit(batch)?;
            debug!(cluster_id = %id, "Deleted concept cluster");
            Ok(true)
        })
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), GraphError> {
        self.storage.locked(|storage| {
            let nodes = storage.clear_cf(CF_CONCEPT_NODES)?;
            let links = storage.clear_cf(CF_CONCEPT_LINKS)?;
            let clusters = storage.clear_cf(CF_CONCEPT_CLUSTERS)?;
            info!(nodes, links, clusters, "Cleared concept graph");
            Ok(())
        })
    }
}
