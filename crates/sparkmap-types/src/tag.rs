//! Tag catalog, usage history and daily selection records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A user-selectable topic tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier (ULID)
    pub id: String,
    /// Globally unique name
    pub name: String,
    /// Human-curated category, unrelated to concept clusters
    #[serde(default)]
    pub cluster: Option<String>,
    /// Number of times the tag has been used
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Create an unused tag.
    pub fn new(name: impl Into<String>, cluster: Option<String>, is_default: bool) -> Self {
        Self {
            id: crate::new_id(),
            name: name.into().trim().to_string(),
            cluster,
            usage_count: 0,
            last_used: None,
            is_default,
            created_at: crate::now_ms(),
        }
    }

    /// Category key used for grouping; uncategorized tags share one group.
    pub fn category(&self) -> &str {
        self.cluster.as_deref().unwrap_or("")
    }

    /// Record a use at `at`.
    pub fn mark_used(&mut self, at: DateTime<Utc>) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used = Some(at);
    }
}

/// Sampling policy that picked a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// Tags used 3 to 7 days ago, most used first
    History,
    /// Tags from categories not touched in the last week
    Wildcard,
    /// Tags referenced by recent deep-mode sparks
    DeepDive,
    /// Uniform sample of the remaining catalog
    Random,
}

impl SelectionStrategy {
    /// Strategies in the order the sampler runs them.
    pub fn all() -> &'static [SelectionStrategy] {
        &[
            SelectionStrategy::History,
            SelectionStrategy::Wildcard,
            SelectionStrategy::DeepDive,
            SelectionStrategy::Random,
        ]
    }

    /// Stored label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::History => "history",
            SelectionStrategy::Wildcard => "wildcard",
            SelectionStrategy::DeepDive => "deep-dive",
            SelectionStrategy::Random => "random",
        }
    }

    /// Parse a stored label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "history" => Some(SelectionStrategy::History),
            "wildcard" => Some(SelectionStrategy::Wildcard),
            "deep-dive" => Some(SelectionStrategy::DeepDive),
            "random" => Some(SelectionStrategy::Random),
            _ => None,
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one tag use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagHistoryEntry {
    pub id: String,
    pub tag_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub used_at: DateTime<Utc>,
    pub strategy: SelectionStrategy,
}

impl TagHistoryEntry {
    pub fn new(tag_id: impl Into<String>, used_at: DateTime<Utc>, strategy: SelectionStrategy) -> Self {
        Self {
            id: crate::new_id(),
            tag_id: tag_id.into(),
            used_at,
            strategy,
        }
    }
}

/// The tag slate for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTagSelection {
    pub id: String,
    /// Calendar date, serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
    /// Ordered tag ids
    #[serde(default)]
    pub tags: Vec<String>,
    /// Strategy that picked each entry of `tags`, when known
    #[serde(default)]
    pub strategies: Vec<SelectionStrategy>,
    #[serde(default)]
    pub is_manually_edited: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl DailyTagSelection {
    /// Create a generated selection.
    pub fn new(date: NaiveDate, tags: Vec<String>, strategies: Vec<SelectionStrategy>) -> Self {
        Self {
            id: crate::new_id(),
            date,
            tags,
            strategies,
            is_manually_edited: false,
            created_at: crate::now_ms(),
        }
    }

    /// Storage key form of the date.
    pub fn date_key(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// Replace the tag list by hand. Repeated ids keep their first position.
    pub fn apply_manual_edit(&mut self, tag_ids: Vec<String>) {
        let mut seen = std::collections::HashSet::new();
        self.tags = tag_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        self.strategies.clear();
        self.is_manually_edited = true;
    }
}

/// Generation mode of a spark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparkMode {
    Quick,
    Deep,
}

/// Summary of one generated content item, as far as tag selection cares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparkRecord {
    pub id: String,
    pub mode: SparkMode,
    /// Tags the spark was generated for
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl SparkRecord {
    pub fn new(id: impl Into<String>, mode: SparkMode, tag_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            mode,
            tag_ids,
            created_at: crate::now_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_labels() {
        for strategy in SelectionStrategy::all() {
            assert_eq!(SelectionStrategy::from_label(strategy.as_str()), Some(*strategy));
        }
        assert_eq!(SelectionStrategy::from_label("deep_dive"), None);
        assert_eq!(
            serde_json::to_string(&SelectionStrategy::DeepDive).unwrap(),
            "\"deep-dive\""
        );
    }

    #[test]
    fn test_tag_mark_used() {
        let mut tag = Tag::new("Biologi", Some("sains".to_string()), true);
        assert_eq!(tag.usage_count, 0);
        let now = Utc::now();
        tag.mark_used(now);
        assert_eq!(tag.usage_count, 1);
        assert_eq!(tag.last_used, Some(now));
        assert_eq!(tag.category(), "sains");
    }

    #[test]
    fn test_daily_selection_date_serializes_iso() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let selection = DailyTagSelection::new(date, vec!["t1".into()], vec![SelectionStrategy::Random]);
        let value = serde_json::to_value(&selection).unwrap();
        assert_eq!(value["date"], "2024-03-09");
        assert_eq!(DailyTagSelection::date_key(date), "2024-03-09");
    }

    #[test]
    fn test_manual_edit_dedupes_and_drops_strategies() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let mut selection =
            DailyTagSelection::new(date, vec!["t1".into()], vec![SelectionStrategy::History]);
        selection.apply_manual_edit(vec!["t2".into(), "t3".into(), "t2".into()]);

        assert_eq!(selection.tags, vec!["t2".to_string(), "t3".to_string()]);
        assert!(selection.strategies.is_empty());
        assert!(selection.is_manually_edited);
    }

    #[test]
    fn test_tag_null_cluster_and_missing_usage() {
        let json = r#"{"id":"t1","name":"Fisika","cluster":null,"created_at":0}"#;
        let tag: Tag = serde_json::from_str(json).unwrap();
        assert_eq!(tag.category(), "");
        assert_eq!(tag.usage_count, 0);
        assert!(tag.last_used.is_none());
    }
}
