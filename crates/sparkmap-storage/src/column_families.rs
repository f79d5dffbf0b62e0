//! Column family definitions for RocksDB.
//!
//! Each column family isolates one record kind:
//! - concept_nodes: concept nodes plus the case-insensitive name index
//! - concept_links: canonical concept pairs
//! - concept_clusters: clusters plus the cluster name index
//! - tags: tag catalog plus the tag name index
//! - tag_history: append-only usage log (Universal compaction)
//! - daily_tag_selections: one record per calendar date
//! - sparks: content item summaries

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for concept nodes
pub const CF_CONCEPT_NODES: &str = "concept_nodes";

/// Column family name for concept links
pub const CF_CONCEPT_LINKS: &str = "concept_links";

/// Column family name for concept clusters
pub const CF_CONCEPT_CLUSTERS: &str = "concept_clusters";

/// Column family name for the tag catalog
pub const CF_TAGS: &str = "tags";

/// Column family name for tag usage history
pub const CF_TAG_HISTORY: &str = "tag_history";

/// Column family name for daily tag selections
pub const CF_DAILY_SELECTIONS: &str = "daily_tag_selections";

/// Column family name for spark summaries
pub const CF_SPARKS: &str = "sparks";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_CONCEPT_NODES,
    CF_CONCEPT_LINKS,
    CF_CONCEPT_CLUSTERS,
    CF_TAGS,
    CF_TAG_HISTORY,
    CF_DAILY_SELECTIONS,
    CF_SPARKS,
];

/// Options for append-only logs (compressed, universal compaction)
fn append_only_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts.set_compaction_style(rocksdb::DBCompactionStyle::Universal);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_CONCEPT_NODES, Options::default()),
        ColumnFamilyDescriptor::new(CF_CONCEPT_LINKS, Options::default()),
        ColumnFamilyDescriptor::new(CF_CONCEPT_CLUSTERS, Options::default()),
        ColumnFamilyDescriptor::new(CF_TAGS, Options::default()),
        ColumnFamilyDescriptor::new(CF_TAG_HISTORY, append_only_options()),
        ColumnFamilyDescriptor::new(CF_DAILY_SELECTIONS, Options::default()),
        ColumnFamilyDescriptor::new(CF_SPARKS, append_only_options()),
    ]
}
