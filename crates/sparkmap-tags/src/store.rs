//! Persistence interface for tags, usage history, sparks and daily selections.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use sparkmap_types::{DailyTagSelection, SelectionStrategy, SparkMode, SparkRecord, Tag, TagHistoryEntry};

use crate::error::TagsError;

/// Store for the tag catalog and everything selection reads.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Insert a new tag. Fails with `InvalidInput` if the name is taken
    /// (case-insensitive).
    async fn insert_tag(&self, tag: Tag) -> Result<Tag, TagsError>;

    async fn get_tag(&self, id: &str) -> Result<Option<Tag>, TagsError>;

    /// Case-insensitive lookup.
    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, TagsError>;

    async fn list_tags(&self) -> Result<Vec<Tag>, TagsError>;

    /// Append one history entry per use and bump each tag's usage counter.
    ///
    /// All tag ids are checked first; an unknown id fails with `TagNotFound`
    /// and nothing is written.
    async fn record_usage(
        &self,
        uses: &[(String, SelectionStrategy)],
        used_at: DateTime<Utc>,
    ) -> Result<Vec<TagHistoryEntry>, TagsError>;

    /// History entries with `start <= used_at < end`, oldest first.
    async fn history_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TagHistoryEntry>, TagsError>;

    /// Zero every usage counter and delete all history. Returns the number
    /// of history entries removed.
    async fn reset_usage(&self) -> Result<usize, TagsError>;

    async fn put_spark(&self, spark: &SparkRecord) -> Result<(), TagsError>;

    /// Up to `limit` sparks of `mode`, newest first.
    async fn recent_sparks(&self, mode: SparkMode, limit: usize)
        -> Result<Vec<SparkRecord>, TagsError>;

    async fn get_daily(&self, date: NaiveDate) -> Result<Option<DailyTagSelection>, TagsError>;

    /// Store `selection` unless one already exists for its date.
    ///
    /// Returns the stored record: `selection` itself or the existing one.
    async fn insert_daily(
        &self,
        selection: DailyTagSelection,
    ) -> Result<DailyTagSelection, TagsError>;

    /// Store `selection`, replacing any record for its date, in one step.
    ///
    /// Returns the record it replaced.
    async fn replace_daily(
        &self,
        selection: DailyTagSelection,
    ) -> Result<Option<DailyTagSelection>, TagsError>;

    /// Overwrite the tag list of the stored slate for `date` and mark it as
    /// manually edited.
    ///
    /// Fails with `SelectionNotFound` if no slate exists and with
    /// `TagNotFound` for an unknown tag id; nothing is written on failure.
    async fn edit_daily(
        &self,
        date: NaiveDate,
        tag_ids: Vec<String>,
    ) -> Result<DailyTagSelection, TagsError>;
}
