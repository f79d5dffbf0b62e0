//! Tag catalog maintenance.

use std::sync::Arc;

use sparkmap_types::Tag;
use tracing::{info, instrument};

use crate::error::TagsError;
use crate::store::TagStore;

/// Built-in starter tags as `(name, category)`.
pub const DEFAULT_TAGS: &[(&str, &str)] = &[
    ("Biologi", "Sains"),
    ("Fisika", "Sains"),
    ("Kimia", "Sains"),
    ("Astronomi", "Sains"),
    ("Sejarah", "Humaniora"),
    ("Filsafat", "Humaniora"),
    ("Psikologi", "Humaniora"),
    ("Ekonomi", "Sosial"),
    ("Geografi", "Sosial"),
    ("Matematika", "Logika"),
    ("Pemrograman", "Teknologi"),
    ("Kecerdasan Buatan", "Teknologi"),
];

/// Create, look up and maintain tags.
pub struct TagCatalog<S: TagStore> {
    store: Arc<S>,
}

impl<S: TagStore> TagCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Add a tag. Names are unique, compared case-insensitively.
    #[instrument(skip(self))]
    pub async fn add_tag(&self, name: &str, category: Option<&str>) -> Result<Tag, TagsError> {
        self.insert(name, category, false).await
    }

    async fn insert(
        &self,
        name: &str,
        category: Option<&str>,
        is_default: bool,
    ) -> Result<Tag, TagsError> {
        if name.trim().is_empty() {
            return Err(TagsError::InvalidInput(
                "Tag name must not be empty".to_string(),
            ));
        }
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self.store
            .insert_tag(Tag::new(name, category, is_default))
            .await
    }

    pub async fn get_tag(&self, id: &str) -> Result<Tag, TagsError> {
        self.store
            .get_tag(id)
            .await?
            .ok_or_else(|| TagsError::TagNotFound(id.to_string()))
    }

    pub async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, TagsError> {
        self.store.find_tag_by_name(name).await
    }

    /// All tags, ordered by name.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, TagsError> {
        let mut tags = self.store.list_tags().await?;
        tags.sort_by_key(|tag| tag.name.to_lowercase());
        Ok(tags)
    }

    /// Insert [`DEFAULT_TAGS`] that are not in the catalog yet.
    ///
    /// Returns the number of tags added.
    pub async fn seed_default_tags(&self) -> Result<usize, TagsError> {
        self.seed(DEFAULT_TAGS).await
    }

    /// Insert the given `(name, category)` pairs as default tags, skipping
    /// names already present.
    #[instrument(skip(self, tags), fields(count = tags.len()))]
    pub async fn seed(&self, tags: &[(&str, &str)]) -> Result<usize, TagsError> {
        let mut added = 0;
        for &(name, category) in tags {
            if self.store.find_tag_by_name(name).await?.is_some() {
                continue;
            }
            self.insert(name, Some(category), true).await?;
            added += 1;
        }
        info!(added, "Seeded default tags");
        Ok(added)
    }

    /// Zero all usage counters and drop the usage history.
    #[instrument(skip(self))]
    pub async fn reset_usage(&self) -> Result<usize, TagsError> {
        self.store.reset_usage().await
    }
}
