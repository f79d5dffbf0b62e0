//! # sparkmap-types
//!
//! Shared domain types for the Sparkmap learning engine.
//!
//! This crate defines the records persisted by the engine:
//! - Concept nodes, links and clusters: the concept map built from sparks
//! - Tags, tag usage history and daily tag selections
//! - Spark records: summaries of generated content items
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use sparkmap_types::{ConceptNode, Settings};
//!
//! let node = ConceptNode::new("Fotosintesis", "general", "s1", 0.5);
//! assert_eq!(node.spark_ids, vec!["s1".to_string()]);
//! let settings = Settings::default();
//! assert!(settings.validate().is_ok());
//! ```

use std::sync::{Mutex, OnceLock};

pub mod concept;
pub mod config;
pub mod error;
pub mod tag;

pub use concept::{
    canonical_pair, clamp_unit, ConceptCluster, ConceptLink, ConceptNode, DEFAULT_LINK_TYPE,
};
pub use config::{ClusteringConfig, GraphConfig, SelectionConfig, Settings};
pub use error::SparkmapError;
pub use tag::{DailyTagSelection, SelectionStrategy, SparkMode, SparkRecord, Tag, TagHistoryEntry};

static ID_GENERATOR: OnceLock<Mutex<ulid::Generator>> = OnceLock::new();

/// Generate a new opaque record identifier (ULID).
///
/// Ids are monotonic within the process, so sorting by id preserves
/// creation order even inside a single millisecond.
pub fn new_id() -> String {
    let generator = ID_GENERATOR.get_or_init(|| Mutex::new(ulid::Generator::new()));
    let mut generator = generator
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    generator
        .generate()
        .unwrap_or_else(|_| ulid::Ulid::new())
        .to_string()
}

/// Current time truncated to millisecond precision.
///
/// Records persist timestamps as epoch milliseconds, so values created in
/// memory carry the same precision as values read back from storage.
pub fn now_ms() -> chrono::DateTime<chrono::Utc> {
    let now = chrono::Utc::now();
    chrono::DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Normalize a name into its case-insensitive lookup key.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
