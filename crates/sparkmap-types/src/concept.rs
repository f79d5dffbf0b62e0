//! Concept map records: nodes, links and clusters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Link type used when the caller does not specify one.
pub const DEFAULT_LINK_TYPE: &str = "semantic";

/// Clamp a weight or strength into `[0.0, 1.0]`.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Order two concept ids so the smaller one comes first.
///
/// Links are always stored under this ordering so a pair can never be
/// inserted twice in swapped order.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

/// A concept extracted from one or more sparks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    /// Unique identifier (ULID)
    pub id: String,
    /// Display name; lookups are case-insensitive
    pub name: String,
    /// Best-effort cluster label, may lag the cluster engine
    #[serde(default)]
    pub cluster: String,
    /// Importance in `[0.0, 1.0]`
    pub weight: f64,
    /// Sparks this concept appeared in (append-only, no duplicates)
    #[serde(default)]
    pub spark_ids: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl ConceptNode {
    /// Create a node first seen in `origin_id`.
    pub fn new(
        name: impl Into<String>,
        cluster: impl Into<String>,
        origin_id: &str,
        initial_weight: f64,
    ) -> Self {
        let now = crate::now_ms();
        Self {
            id: crate::new_id(),
            name: name.into().trim().to_string(),
            cluster: cluster.into(),
            weight: clamp_unit(initial_weight),
            spark_ids: vec![origin_id.to_string()],
            created_at: now,
            last_updated: now,
        }
    }

    /// Record a re-occurrence: remember the origin and raise the weight.
    pub fn reinforce(&mut self, origin_id: &str, delta: f64) {
        push_unique(&mut self.spark_ids, origin_id);
        self.weight = clamp_unit(self.weight + delta);
        self.last_updated = crate::now_ms();
    }
}

/// An undirected, strength-weighted relation between two concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptLink {
    /// Unique identifier (ULID)
    pub id: String,
    /// Smaller concept id of the pair
    pub concept_a: String,
    /// Larger concept id of the pair
    pub concept_b: String,
    /// Strength in `[0.0, 1.0]`
    pub strength: f64,
    #[serde(default = "default_link_type")]
    pub link_type: String,
    #[serde(default)]
    pub spark_ids: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
}

fn default_link_type() -> String {
    DEFAULT_LINK_TYPE.to_string()
}

impl ConceptLink {
    /// Create a link between two concept ids, canonicalizing their order.
    pub fn new(
        concept_x: &str,
        concept_y: &str,
        origin_id: &str,
        initial_strength: f64,
        link_type: impl Into<String>,
    ) -> Self {
        let (a, b) = canonical_pair(concept_x, concept_y);
        Self {
            id: crate::new_id(),
            concept_a: a.to_string(),
            concept_b: b.to_string(),
            strength: clamp_unit(initial_strength),
            link_type: link_type.into(),
            spark_ids: vec![origin_id.to_string()],
            last_update: crate::now_ms(),
        }
    }

    /// Record another co-occurrence of the pair.
    pub fn reinforce(&mut self, origin_id: &str, delta: f64) {
        push_unique(&mut self.spark_ids, origin_id);
        self.strength = clamp_unit(self.strength + delta);
        self.last_update = crate::now_ms();
    }

    /// Whether `concept_id` is one of the endpoints.
    pub fn touches(&self, concept_id: &str) -> bool {
        self.concept_a == concept_id || self.concept_b == concept_id
    }

}

/// A named group of tightly linked concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCluster {
    /// Unique identifier (ULID), retained across upserts by name
    pub id: String,
    /// Derived from the highest-weight members
    pub name: String,
    /// Member node ids (at least two)
    #[serde(default)]
    pub concepts: Vec<String>,
    /// Tightness score in `[0.0, 1.0]`
    pub coherence: f64,
    /// Number of distinct sparks across member nodes
    pub spark_count: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl ConceptCluster {
    /// Create a new cluster record.
    pub fn new(name: impl Into<String>, concepts: Vec<String>, coherence: f64, spark_count: u32) -> Self {
        Self {
            id: crate::new_id(),
            name: name.into(),
            concepts,
            coherence: clamp_unit(coherence),
            spark_count,
            last_updated: crate::now_ms(),
        }
    }
}
