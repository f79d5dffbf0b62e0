//! Tag storage operations.
//!
//! Tags live in `CF_TAGS` with a case-insensitive name index. Usage history
//! and spark records are time-keyed so window scans are a single forward
//! iteration. Daily selections are keyed by date.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sparkmap_storage::column_families::{CF_DAILY_SELECTIONS, CF_SPARKS, CF_TAGS, CF_TAG_HISTORY};
use sparkmap_storage::keys::{daily_key, tag_key, tag_name_key};
use sparkmap_storage::{Batch, Storage, TimeKey};
use sparkmap_types::{
    name_key, DailyTagSelection, SelectionStrategy, SparkMode, SparkRecord, Tag, TagHistoryEntry,
};
use tracing::{debug, info, instrument};

use crate::error::TagsError;
use crate::store::TagStore;

/// RocksDB-backed [`TagStore`].
pub struct TagStorage {
    storage: Arc<Storage>,
}

impl TagStorage {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Get underlying storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    fn tag_by_id(&self, id: &str) -> Result<Option<Tag>, TagsError> {
        Ok(self.storage.get_json(CF_TAGS, tag_key(id).as_bytes())?)
    }

    fn tag_by_name(&self, name: &str) -> Result<Option<Tag>, TagsError> {
        let index_key = tag_name_key(&name_key(name));
        match self.storage.get_string(CF_TAGS, index_key.as_bytes())? {
            Some(id) => self.tag_by_id(&id),
            None => Ok(None),
        }
    }

    fn all_tags(&self) -> Result<Vec<Tag>, TagsError> {
        Ok(self.storage.prefix_json(CF_TAGS, b"tag:")?)
    }

    fn daily_by_date(&self, date: NaiveDate) -> Result<Option<DailyTagSelection>, TagsError> {
        let key = daily_key(&DailyTagSelection::date_key(date));
        Ok(self.storage.get_json(CF_DAILY_SELECTIONS, key.as_bytes())?)
    }
}

#[async_trait]
impl TagStore for TagStorage {
    #[instrument(skip(self, tag), fields(name = %tag.name))]
    async fn insert_tag(&self, tag: Tag) -> Result<Tag, TagsError> {
        self.storage.locked(|storage| {
            if self.tag_by_name(&tag.name)?.is_some() {
                return Err(TagsError::InvalidInput(format!(
                    "Tag already exists: {}",
                    tag.name
                )));
            }

            let mut batch = Batch::new();
            batch.put_json(CF_TAGS, tag_key(&tag.id), &tag)?;
            batch.put(CF_TAGS, tag_name_key(&name_key(&tag.name)), tag.id.clone().into_bytes());
            storage.commit(batch)?;

            debug!(tag_id = %tag.id, "Saved tag");
            Ok(tag)
        })
    }

    async fn get_tag(&self, id: &str) -> Result<Option<Tag>, TagsError> {
        self.tag_by_id(id)
    }

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, TagsError> {
        self.tag_by_name(name)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, TagsError> {
        self.all_tags()
    }

    #[instrument(skip(self, uses), fields(count = uses.len()))]
    async fn record_usage(
        &self,
        uses: &[(String, SelectionStrategy)],
        used_at: DateTime<Utc>,
    ) -> Result<Vec<TagHistoryEntry>, TagsError> {
        self.storage.locked(|storage| {
            let mut touched: HashMap<&str, Tag> = HashMap::new();
            for (tag_id, _) in uses {
                if !touched.contains_key(tag_id.as_str()) {
                    let tag = self
                        .tag_by_id(tag_id)?
                        .ok_or_else(|| TagsError::TagNotFound(tag_id.clone()))?;
                    touched.insert(tag_id.as_str(), tag);
                }
            }

            let mut batch = Batch::new();
            let mut entries = Vec::with_capacity(uses.len());
            for (tag_id, strategy) in uses {
                if let Some(tag) = touched.get_mut(tag_id.as_str()) {
                    tag.mark_used(used_at);
                }
                let entry = TagHistoryEntry::new(tag_id.clone(), used_at, *strategy);
                let key = TimeKey::new(TimeKey::HISTORY, used_at.timestamp_millis(), entry.id.clone());
                batch.put_json(CF_TAG_HISTORY, key.to_bytes(), &entry)?;
                entries.push(entry);
            }
            for tag in touched.values() {
                batch.put_json(CF_TAGS, tag_key(&tag.id), tag)?;
            }
            storage.commit(batch)?;

            debug!(entries = entries.len(), tags = touched.len(), "Recorded tag usage");
            Ok(entries)
        })
    }

    async fn history_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TagHistoryEntry>, TagsError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let lower = TimeKey::range_start(TimeKey::HISTORY, start.timestamp_millis());
        let upper = TimeKey::range_end(TimeKey::HISTORY, end.timestamp_millis());

        self.storage
            .range(CF_TAG_HISTORY, &lower, &upper)?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(TagsError::from))
            .collect()
    }

    #[instrument(skip(self))]
    async fn reset_usage(&self) -> Result<usize, TagsError> {
        self.storage.locked(|storage| {
            let mut batch = Batch::new();
            for mut tag in self.all_tags()? {
                if tag.usage_count != 0 || tag.last_used.is_some() {
                    tag.usage_count = 0;
                    tag.last_used = None;
                    batch.put_json(CF_TAGS, tag_key(&tag.id), &tag)?;
                }
            }
            let reset_tags = batch.len();
            storage.commit(batch)?;

            let removed = storage.clear_cf(CF_TAG_HISTORY)?;
            info!(reset_tags, removed, "Reset tag usage");
            Ok(removed)
        })
    }

    async fn put_spark(&self, spark: &SparkRecord) -> Result<(), TagsError> {
        let key = TimeKey::new(TimeKey::SPARK, spark.created_at.timestamp_millis(), spark.id.clone());
        self.storage.put_json(CF_SPARKS, &key.to_bytes(), spark)?;
        debug!(spark_id = %spark.id, "Saved spark record");
        Ok(())
    }

    async fn recent_sparks(
        &self,
        mode: SparkMode,
        limit: usize,
    ) -> Result<Vec<SparkRecord>, TagsError> {
        let prefix = format!("{}:", TimeKey::SPARK);
        let sparks: Vec<SparkRecord> = self.storage.prefix_json(CF_SPARKS, prefix.as_bytes())?;
        Ok(sparks
            .into_iter()
            .rev()
            .filter(|spark| spark.mode == mode)
            .take(limit)
            .collect())
    }

    async fn get_daily(&self, date: NaiveDate) -> Result<Option<DailyTagSelection>, TagsError> {
        self.daily_by_date(date)
    }

    #[instrument(skip(self, selection), fields(date = %selection.date))]
    async fn insert_daily(
        &self,
        selection: DailyTagSelection,
    ) -> Result<DailyTagSelection, TagsError> {
        self.storage.locked(|storage| {
            if let Some(existing) = self.daily_by_date(selection.date)? {
                debug!(selection_id = %existing.id, "Daily selection already stored");
                return Ok(existing);
            }
            let key = daily_key(&DailyTagSelection::date_key(selection.date));
            storage.put_json(CF_DAILY_SELECTIONS, key.as_bytes(), &selection)?;
            debug!(selection_id = %selection.id, "Saved daily selection");
            Ok(selection)
        })
    }

    #[instrument(skip(self, selection), fields(date = %selection.date))]
    async fn replace_daily(
        &self,
        selection: DailyTagSelection,
    ) -> Result<Option<DailyTagSelection>, TagsError> {
        self.storage.locked(|storage| {
            let previous = self.daily_by_date(selection.date)?;
            let key = daily_key(&DailyTagSelection::date_key(selection.date));
            storage.put_json(CF_DAILY_SELECTIONS, key.as_bytes(), &selection)?;
            debug!(
                selection_id = %selection.id,
                replaced = previous.is_some(),
                "Saved daily selection"
            );
            Ok(previous)
        })
    }

    #[instrument(skip(self, tag_ids), fields(count = tag_ids.len()))]
    async fn edit_daily(
        &self,
        date: NaiveDate,
        tag_ids: Vec<String>,
    ) -> Result<DailyTagSelection, TagsError> {
        self.storage.locked(|storage| {
            let mut selection = self.daily_by_date(date)?.ok_or_else(|| {
                TagsError::SelectionNotFound(DailyTagSelection::date_key(date))
            })?;
            for id in &tag_ids {
                if self.tag_by_id(id)?.is_none() {
                    return Err(TagsError::TagNotFound(id.clone()));
                }
            }

            selection.apply_manual_edit(tag_ids);
            let key = daily_key(&DailyTagSelection::date_key(date));
            storage.put_json(CF_DAILY_SELECTIONS, key.as_bytes(), &selection)?;
            Ok(selection)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_store() -> (TempDir, TagStorage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        (dir, TagStorage::new(Arc::new(storage)))
    }

    #[tokio::test]
    async fn test_insert_tag_enforces_unique_name() {
        let (_dir, store) = create_store();
        let tag = store
            .insert_tag(Tag::new("Biologi", Some("Sains".into()), true))
            .await
            .unwrap();

        let found = store.find_tag_by_name("biologi").await.unwrap().unwrap();
        assert_eq!(found, tag);

        let result = store.insert_tag(Tag::new("BIOLOGI", None, false)).await;
        assert!(matches!(result, Err(TagsError::InvalidInput(_))));
        assert_eq!(store.list_tags().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_usage_bumps_counters_and_appends_history() {
        let (_dir, store) = create_store();
        let tag = store.insert_tag(Tag::new("Fisika", None, false)).await.unwrap();
        let now = sparkmap_types::now_ms();

        let uses = vec![
            (tag.id.clone(), SelectionStrategy::History),
            (tag.id.clone(), SelectionStrategy::Random),
        ];
        let entries = store.record_usage(&uses, now).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].strategy, SelectionStrategy::Random);

        let stored = store.get_tag(&tag.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
        assert_eq!(stored.last_used, Some(now));

        let history = store
            .history_between(now - Duration::seconds(1), now + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_record_usage_unknown_tag_writes_nothing() {
        let (_dir, store) = create_store();
        let tag = store.insert_tag(Tag::new("Kimia", None, false)).await.unwrap();
        let now = sparkmap_types::now_ms();

        let uses = vec![
            (tag.id.clone(), SelectionStrategy::Random),
            ("missing".to_string(), SelectionStrategy::Random),
        ];
        let result = store.record_usage(&uses, now).await;
        assert!(matches!(result, Err(TagsError::TagNotFound(id)) if id == "missing"));

        assert_eq!(store.get_tag(&tag.id).await.unwrap().unwrap().usage_count, 0);
        assert!(store
            .history_between(now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_history_window_is_half_open() {
        let (_dir, store) = create_store();
        let tag = store.insert_tag(Tag::new("Sejarah", None, false)).await.unwrap();
        let now = sparkmap_types::now_ms();

        for days in [1, 3, 5, 7] {
            store
                .record_usage(
                    &[(tag.id.clone(), SelectionStrategy::History)],
                    now - Duration::days(days),
                )
                .await
                .unwrap();
        }

        let window = store
            .history_between(now - Duration::days(7), now - Duration::days(3))
            .await
            .unwrap();
        let ages: Vec<i64> = window.iter().map(|e| (now - e.used_at).num_days()).collect();
        assert_eq!(ages, vec![7, 5]);
    }

    #[tokio::test]
    async fn test_reset_usage() {
        let (_dir, store) = create_store();
        let tag = store.insert_tag(Tag::new("Geografi", None, false)).await.unwrap();
        let now = sparkmap_types::now_ms();
        store
            .record_usage(&[(tag.id.clone(), SelectionStrategy::Wildcard)], now)
            .await
            .unwrap();

        assert_eq!(store.reset_usage().await.unwrap(), 1);
        let stored = store.get_tag(&tag.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 0);
        assert!(stored.last_used.is_none());
    }

    #[tokio::test]
    async fn test_recent_sparks_newest_first_by_mode() {
        let (_dir, store) = create_store();
        let base = sparkmap_types::now_ms();

        for (i, mode) in [SparkMode::Deep, SparkMode::Quick, SparkMode::Deep, SparkMode::Deep]
            .into_iter()
            .enumerate()
        {
            let mut spark = SparkRecord::new(format!("s{}", i), mode, vec![]);
            spark.created_at = base + Duration::minutes(i as i64);
            store.put_spark(&spark).await.unwrap();
        }

        let deep = store.recent_sparks(SparkMode::Deep, 2).await.unwrap();
        let ids: Vec<&str> = deep.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s3", "s2"]);
    }

    #[tokio::test]
    async fn test_daily_insert_keeps_existing() {
        let (_dir, store) = create_store();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let first = store
            .insert_daily(DailyTagSelection::new(date, vec!["a".into()], vec![]))
            .await
            .unwrap();
        let second = store
            .insert_daily(DailyTagSelection::new(date, vec!["b".into()], vec![]))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.tags, vec!["a".to_string()]);

        let replacement = DailyTagSelection::new(date, vec!["c".into()], vec![]);
        let previous = store.replace_daily(replacement.clone()).await.unwrap();
        assert_eq!(previous.map(|p| p.id), Some(first.id));
        assert_eq!(store.get_daily(date).await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn test_edit_daily_validates_before_writing() {
        let (_dir, store) = create_store();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let tag = store.insert_tag(Tag::new("Kimia", None, false)).await.unwrap();

        let missing = store.edit_daily(date, vec![tag.id.clone()]).await;
        assert!(matches!(missing, Err(TagsError::SelectionNotFound(_))));

        let original = store
            .insert_daily(DailyTagSelection::new(date, vec!["a".into()], vec![]))
            .await
            .unwrap();
        let unknown = store
            .edit_daily(date, vec![tag.id.clone(), "nope".into()])
            .await;
        assert!(matches!(unknown, Err(TagsError::TagNotFound(id)) if id == "nope"));
        assert_eq!(store.get_daily(date).await.unwrap(), Some(original));

        let edited = store
            .edit_daily(date, vec![tag.id.clone(), tag.id.clone()])
            .await
            .unwrap();
        assert_eq!(edited.tags, vec![tag.id]);
        assert!(edited.is_manually_edited);
    }
}
