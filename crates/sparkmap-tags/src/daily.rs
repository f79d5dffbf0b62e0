//! Daily tag selection lifecycle.
//!
//! One slate per calendar date. A stored slate is returned as-is unless
//! regeneration is forced; a forced run samples first and swaps the stored
//! record only once the new slate exists. Manual edits replace the tag list
//! without going through the sampler.

use chrono::{DateTime, NaiveDate, Utc};
use sparkmap_types::DailyTagSelection;
use tracing::{info, instrument};

use crate::error::TagsError;
use crate::selection::TagSelector;
use crate::store::TagStore;

impl<S: TagStore> TagSelector<S> {
    /// The slate for `date`, generating it on first request.
    pub async fn daily_selection(
        &self,
        date: NaiveDate,
        force: bool,
    ) -> Result<DailyTagSelection, TagsError> {
        self.daily_selection_at(date, force, Utc::now()).await
    }

    /// Like [`Self::daily_selection`] with an explicit clock.
    ///
    /// A newly generated slate is recorded as usage, each tag under the
    /// strategy that picked it. If sampling fails the stored slate, if any,
    /// is left untouched.
    #[instrument(skip(self))]
    pub async fn daily_selection_at(
        &self,
        date: NaiveDate,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<DailyTagSelection, TagsError> {
        if !force {
            if let Some(existing) = self.store.get_daily(date).await? {
                return Ok(existing);
            }
        }

        let picks = self
            .select_daily_tags_at(self.config.daily_count, now)
            .await?;
        let candidate = DailyTagSelection::new(
            date,
            picks.iter().map(|pick| pick.tag.id.clone()).collect(),
            picks.iter().map(|pick| pick.strategy).collect(),
        );

        let stored = if force {
            if let Some(previous) = self.store.replace_daily(candidate.clone()).await? {
                info!(%date, previous = %previous.id, "Replaced daily selection");
            }
            candidate
        } else {
            let candidate_id = candidate.id.clone();
            // A concurrent call may have stored a slate for the date meanwhile
            let stored = self.store.insert_daily(candidate).await?;
            if stored.id != candidate_id {
                return Ok(stored);
            }
            stored
        };

        self.record_selection(&picks, now).await?;
        info!(%date, tags = stored.tags.len(), "Generated daily selection");
        Ok(stored)
    }

    pub async fn get_daily_selection(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailyTagSelection>, TagsError> {
        self.store.get_daily(date).await
    }

    /// Replace the tag list of the stored slate for `date`.
    ///
    /// Every id must name an existing tag; repeated ids are kept once. The
    /// slate is marked as manually edited and its strategy labels are
    /// dropped.
    #[instrument(skip(self, tag_ids), fields(count = tag_ids.len()))]
    pub async fn update_daily_tags(
        &self,
        date: NaiveDate,
        tag_ids: Vec<String>,
    ) -> Result<DailyTagSelection, TagsError> {
        let selection = self.store.edit_daily(date, tag_ids).await?;
        info!(%date, tags = selection.tags.len(), "Updated daily selection manually");
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use sparkmap_storage::Storage;
    use sparkmap_types::SelectionConfig;
    use tempfile::TempDir;

    use super::*;
    use crate::catalog::TagCatalog;
    use crate::storage::TagStorage;

    async fn setup() -> (TempDir, TagCatalog<TagStorage>, TagSelector<TagStorage>) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let store = Arc::new(TagStorage::new(storage));
        let catalog = TagCatalog::new(store.clone());
        catalog.seed_default_tags().await.unwrap();
        let selector = TagSelector::with_seed(store, SelectionConfig::default(), 42);
        (dir, catalog, selector)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[tokio::test]
    async fn test_daily_selection_generated_once() {
        let (_dir, catalog, selector) = setup().await;
        let now = sparkmap_types::now_ms();

        let first = selector.daily_selection_at(date(), false, now).await.unwrap();
        assert_eq!(first.tags.len(), 5);
        assert_eq!(first.strategies.len(), 5);
        assert!(!first.is_manually_edited);

        let second = selector
            .daily_selection_at(date(), false, now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(second, first);

        // Only the first call recorded usage
        let used: u32 = catalog
            .list_tags()
            .await
            .unwrap()
            .iter()
            .map(|tag| tag.usage_count)
            .sum();
        assert_eq!(used, 5);
    }

    #[tokio::test]
    async fn test_forced_regeneration_replaces_record() {
        let (_dir, _catalog, selector) = setup().await;
        let now = sparkmap_types::now_ms();

        let first = selector.daily_selection_at(date(), false, now).await.unwrap();
        let forced = selector.daily_selection_at(date(), true, now).await.unwrap();
        assert_ne!(forced.id, first.id);

        let stored = selector.get_daily_selection(date()).await.unwrap().unwrap();
        assert_eq!(stored.id, forced.id);
    }

    #[tokio::test]
    async fn test_update_daily_tags_marks_manual_edit() {
        let (_dir, catalog, selector) = setup().await;
        selector.daily_selection(date(), false).await.unwrap();

        let fisika = catalog.find_tag_by_name("Fisika").await.unwrap().unwrap();
        let updated = selector
            .update_daily_tags(date(), vec![fisika.id.clone()])
            .await
            .unwrap();
        assert!(updated.is_manually_edited);
        assert_eq!(updated.tags, vec![fisika.id.clone()]);
        assert!(updated.strategies.is_empty());

        let repeated = selector
            .update_daily_tags(date(), vec![fisika.id.clone(), fisika.id.clone()])
            .await
            .unwrap();
        assert_eq!(repeated.tags, vec![fisika.id]);

        let stored = selector.get_daily_selection(date()).await.unwrap().unwrap();
        assert_eq!(stored, repeated);
    }

    #[tokio::test]
    async fn test_update_daily_tags_errors() {
        let (_dir, _catalog, selector) = setup().await;
        let missing_date = selector.update_daily_tags(date(), vec![]).await;
        assert!(matches!(missing_date, Err(TagsError::SelectionNotFound(_))));

        selector.daily_selection(date(), false).await.unwrap();
        let missing_tag = selector
            .update_daily_tags(date(), vec!["nope".to_string()])
            .await;
        assert!(matches!(missing_tag, Err(TagsError::TagNotFound(_))));
    }
}
