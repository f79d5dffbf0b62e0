//! # sparkmap-tags
//!
//! Adaptive daily tag selection for Sparkmap.
//!
//! Picks the topic tags offered to the user each day by mixing four
//! sampling strategies (history, wildcard, deep-dive affinity, random) with
//! anti-repetition constraints, and keeps the catalog, usage history and
//! per-date slates those strategies read.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sparkmap_tags::{TagCatalog, TagSelector, TagStorage};
//!
//! let store = Arc::new(TagStorage::new(storage));
//! TagCatalog::new(store.clone()).seed_default_tags().await?;
//! let selector = TagSelector::new(store, settings.selection.clone());
//! let today = selector.daily_selection(chrono::Utc::now().date_naive(), false).await?;
//! ```

pub mod catalog;
pub mod daily;
pub mod error;
pub mod selection;
pub mod storage;
pub mod store;

pub use catalog::{TagCatalog, DEFAULT_TAGS};
pub use error::TagsError;
pub use selection::{compose_slate, split_counts, SelectionInputs, StrategyCounts, TagPick, TagSelector};
pub use storage::TagStorage;
pub use store::TagStore;
