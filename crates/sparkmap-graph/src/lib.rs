//! # sparkmap-graph
//!
//! Weighted concept graph and cluster detection for Sparkmap.
//!
//! Every piece of generated content yields a short list of concept names.
//! The graph turns each list into nodes (reinforced on re-occurrence) and
//! pairwise co-occurrence links (strengthened on re-occurrence). The cluster
//! engine partitions the current graph into named, scored topic clusters.
//!
//! ## Features
//! - Case-insensitive concept identity with bounded weights
//! - Canonical undirected links, one record per concept pair
//! - Atomic read-modify-write reinforcement at the storage layer
//! - Connected-component clustering with coherence scoring
//! - Advisory weight-variance report per cluster

pub mod clustering;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod storage;
pub mod store;

pub use clustering::{ClusterAnalysis, ClusterEngine, ClusterVariance};
pub use error::GraphError;
pub use extraction::{normalize_concepts, ConceptExtractor, StaticExtractor};
pub use graph::{ConceptGraph, ContentUpdate, GraphStats};
pub use storage::ConceptStorage;
pub use store::{GraphStore, LinkUpsert, NodeUpsert};
