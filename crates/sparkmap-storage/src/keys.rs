//! Key encoding and decoding for storage layer.
//!
//! Record keys are `{prefix}:{id}`. Secondary indexes map a normalized name
//! to a record id. Time-ordered logs use `{prefix}:{timestamp_ms:013}:{id}`
//! so a window scan is a single forward iteration.

/// Node record: node:{id}
pub fn node_key(id: &str) -> String {
    format!("node:{}", id)
}

/// Node name index: name:{lowercase name} -> node id
pub fn node_name_key(name_key: &str) -> String {
    format!("name:{}", name_key)
}

/// Link record: link:{concept_a}:{concept_b}, ids in canonical order
pub fn link_key(concept_a: &str, concept_b: &str) -> String {
    format!("link:{}:{}", concept_a, concept_b)
}

/// Cluster record: cluster:{id}
pub fn cluster_key(id: &str) -> String {
    format!("cluster:{}", id)
}

/// Cluster name index: cname:{name} -> cluster id
pub fn cluster_name_key(name: &str) -> String {
    format!("cname:{}", name)
}

/// Tag record: tag:{id}
pub fn tag_key(id: &str) -> String {
    format!("tag:{}", id)
}

/// Tag name index: tname:{lowercase name} -> tag id
pub fn tag_name_key(name_key: &str) -> String {
    format!("tname:{}", name_key)
}

/// Daily selection record: daily:{YYYY-MM-DD}
pub fn daily_key(date: &str) -> String {
    format!("daily:{}", date)
}

/// Time-ordered key for append-only logs.
/// Format: {prefix}:{timestamp_ms:013}:{id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeKey {
    pub prefix: &'static str,
    /// Milliseconds since Unix epoch
    pub timestamp_ms: i64,
    pub id: String,
}

impl TimeKey {
    /// Prefix for tag history entries
    pub const HISTORY: &'static str = "hist";
    /// Prefix for spark records
    pub const SPARK: &'static str = "spark";

    pub fn new(prefix: &'static str, timestamp_ms: i64, id: impl Into<String>) -> Self {
        Self {
            prefix,
            timestamp_ms,
            id: id.into(),
        }
    }

    /// Encode key to bytes for storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Zero-pad timestamp to 13 digits for lexicographic sorting
        format!("{}:{:013}:{}", self.prefix, self.timestamp_ms, self.id).into_bytes()
    }

    /// Lower bound (inclusive) for a time range scan.
    pub fn range_start(prefix: &'static str, start_ms: i64) -> Vec<u8> {
        format!("{}:{:013}:", prefix, start_ms.max(0)).into_bytes()
    }

    /// Upper bound (exclusive) for a time range scan.
    pub fn range_end(prefix: &'static str, end_ms: i64) -> Vec<u8> {
        format!("{}:{:013}:", prefix, end_ms.max(0)).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keys() {
        assert_eq!(node_key("01A"), "node:01A");
        assert_eq!(node_name_key("klorofil"), "name:klorofil");
        assert_eq!(link_key("01A", "01B"), "link:01A:01B");
        assert_eq!(cluster_name_key("A & B"), "cname:A & B");
        assert_eq!(tag_name_key("biologi"), "tname:biologi");
        assert_eq!(daily_key("2024-03-09"), "daily:2024-03-09");
    }

    #[test]
    fn test_time_key_lexicographic_order() {
        let early = TimeKey::new(TimeKey::SPARK, 999, "b");
        let late = TimeKey::new(TimeKey::SPARK, 1000, "a");
        assert!(early.to_bytes() < late.to_bytes());
        assert!(TimeKey::range_start(TimeKey::SPARK, 1000) <= late.to_bytes());
        assert!(TimeKey::range_end(TimeKey::SPARK, 1000) > early.to_bytes());
    }
}
