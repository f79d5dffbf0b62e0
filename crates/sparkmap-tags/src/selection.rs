//! Adaptive tag selection.
//!
//! A slate of `count` tags is split across four strategies by configured
//! weights. The first three buckets take the floor of their share and the
//! random bucket takes the remainder:
//!
//! | Strategy  | Weight | Picks                                             |
//! |-----------|--------|---------------------------------------------------|
//! | History   | 0.4    | most-used tags from 7 to 3 days ago               |
//! | Wildcard  | 0.3    | one tag from each of N untouched categories       |
//! | Deep-dive | 0.2    | tags of the 10 most recent deep sparks            |
//! | Random    | rest   | uniform sample of the remaining catalog           |
//!
//! Strategies run in that order against a shared exclusion set so no tag is
//! picked twice. A strategy that comes up short is topped up from the random
//! pool. The final slate is shuffled so its order carries no strategy signal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sparkmap_types::{
    SelectionConfig, SelectionStrategy, SparkMode, SparkRecord, Tag, TagHistoryEntry,
};
use tracing::{debug, info, instrument};

use crate::error::TagsError;
use crate::store::TagStore;

/// Number of tags each strategy is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrategyCounts {
    pub history: usize,
    pub wildcard: usize,
    pub deep_dive: usize,
    pub random: usize,
}

impl StrategyCounts {
    pub fn total(&self) -> usize {
        self.history + self.wildcard + self.deep_dive + self.random
    }

    pub fn get(&self, strategy: SelectionStrategy) -> usize {
        match strategy {
            SelectionStrategy::History => self.history,
            SelectionStrategy::Wildcard => self.wildcard,
            SelectionStrategy::DeepDive => self.deep_dive,
            SelectionStrategy::Random => self.random,
        }
    }
}

/// Split `count` across the strategies.
///
/// History, wildcard and deep-dive get `floor(count * weight)`; random gets
/// whatever is left, so the parts always sum to `count`.
pub fn split_counts(count: usize, config: &SelectionConfig) -> StrategyCounts {
    // Absorbs float error such as 0.29 * 100 = 28.999999999999996
    let share = |weight: f64| ((count as f64) * weight + 1e-9).floor().max(0.0) as usize;

    let history = share(config.history_weight).min(count);
    let wildcard = share(config.wildcard_weight).min(count - history);
    let deep_dive = share(config.deep_dive_weight).min(count - history - wildcard);

    StrategyCounts {
        history,
        wildcard,
        deep_dive,
        random: count - history - wildcard - deep_dive,
    }
}

/// A selected tag and the strategy that picked it.
#[derive(Debug, Clone, PartialEq)]
pub struct TagPick {
    pub tag: Tag,
    pub strategy: SelectionStrategy,
}

/// Everything the sampler reads from storage.
#[derive(Debug, Clone, Default)]
pub struct SelectionInputs {
    /// Whole catalog
    pub tags: Vec<Tag>,
    /// Usage inside the history window
    pub window_history: Vec<TagHistoryEntry>,
    /// Usage inside the wildcard window
    pub recent_history: Vec<TagHistoryEntry>,
    /// Recent deep sparks, newest first
    pub deep_sparks: Vec<SparkRecord>,
}

struct SlateBuilder<'a> {
    tags: &'a [Tag],
    by_id: HashMap<&'a str, &'a Tag>,
    excluded: HashSet<&'a str>,
    picks: Vec<TagPick>,
}

impl<'a> SlateBuilder<'a> {
    fn new(tags: &'a [Tag]) -> Self {
        Self {
            tags,
            by_id: tags.iter().map(|tag| (tag.id.as_str(), tag)).collect(),
            excluded: HashSet::new(),
            picks: Vec::new(),
        }
    }

    fn is_free(&self, id: &str) -> bool {
        !self.excluded.contains(id)
    }

    fn push(&mut self, tag: &'a Tag, strategy: SelectionStrategy) {
        if self.excluded.insert(tag.id.as_str()) {
            self.picks.push(TagPick {
                tag: tag.clone(),
                strategy,
            });
        }
    }

    fn history(&mut self, n: usize, window: &[TagHistoryEntry]) -> usize {
        let mut usage: HashMap<&str, usize> = HashMap::new();
        for entry in window {
            if self.by_id.contains_key(entry.tag_id.as_str()) {
                *usage.entry(entry.tag_id.as_str()).or_default() += 1;
            }
        }

        let mut ranked: Vec<(&'a Tag, usize)> = usage
            .into_iter()
            .filter_map(|(id, uses)| self.by_id.get(id).map(|tag| (*tag, uses)))
            .collect();
        ranked.sort_by(|(a, a_uses), (b, b_uses)| b_uses.cmp(a_uses).then_with(|| a.name.cmp(&b.name)));

        let mut taken = 0;
        for (tag, _) in ranked {
            if taken == n {
                break;
            }
            if self.is_free(&tag.id) {
                self.push(tag, SelectionStrategy::History);
                taken += 1;
            }
        }
        taken
    }

    fn wildcard<R: Rng + ?Sized>(&mut self, n: usize, recent: &[TagHistoryEntry], rng: &mut R) -> usize {
        let recent_categories: HashSet<&str> = recent
            .iter()
            .filter_map(|entry| self.by_id.get(entry.tag_id.as_str()))
            .map(|tag| tag.category())
            .collect();

        let mut groups: BTreeMap<&'a str, Vec<&'a Tag>> = BTreeMap::new();
        for tag in self.tags {
            if self.is_free(&tag.id) && !recent_categories.contains(tag.category()) {
                groups.entry(tag.category()).or_default().push(tag);
            }
        }

        let categories: Vec<&'a str> = groups.keys().copied().collect();
        let chosen: Vec<&'a str> = categories.choose_multiple(rng, n).copied().collect();

        let mut taken = 0;
        for category in chosen {
            let pick = groups.get(category).and_then(|group| group.choose(rng).copied());
            if let Some(tag) = pick {
                self.push(tag, SelectionStrategy::Wildcard);
                taken += 1;
            }
        }
        taken
    }

    fn deep_dive(&mut self, n: usize, sparks: &[SparkRecord]) -> usize {
        let mut taken = 0;
        for tag_id in sparks.iter().flat_map(|spark| spark.tag_ids.iter()) {
            if taken == n {
                break;
            }
            if let Some(tag) = self.by_id.get(tag_id.as_str()).copied() {
                if self.is_free(&tag.id) {
                    self.push(tag, SelectionStrategy::DeepDive);
                    taken += 1;
                }
            }
        }
        taken
    }

    fn random<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) -> usize {
        let pool: Vec<&'a Tag> = self.tags.iter().filter(|tag| self.is_free(&tag.id)).collect();
        let chosen: Vec<&'a Tag> = pool.choose_multiple(rng, n).copied().collect();
        let taken = chosen.len();
        for tag in chosen {
            self.push(tag, SelectionStrategy::Random);
        }
        taken
    }
}

/// Run every strategy over `inputs` and return the shuffled slate.
///
/// Returns fewer than `counts.total()` tags only when the catalog is smaller
/// than that.
pub fn compose_slate<R: Rng + ?Sized>(
    inputs: &SelectionInputs,
    counts: &StrategyCounts,
    rng: &mut R,
) -> Vec<TagPick> {
    let mut builder = SlateBuilder::new(&inputs.tags);

    for strategy in SelectionStrategy::all() {
        let wanted = counts.get(*strategy);
        if wanted == 0 {
            continue;
        }
        let taken = match strategy {
            SelectionStrategy::History => builder.history(wanted, &inputs.window_history),
            SelectionStrategy::Wildcard => builder.wildcard(wanted, &inputs.recent_history, rng),
            SelectionStrategy::DeepDive => builder.deep_dive(wanted, &inputs.deep_sparks),
            SelectionStrategy::Random => builder.random(wanted, rng),
        };
        if taken < wanted {
            let backfilled = builder.random(wanted - taken, rng);
            debug!(
                strategy = %strategy,
                wanted,
                taken,
                backfilled,
                "Strategy short, backfilled from random pool"
            );
        }
    }

    let mut picks = builder.picks;
    picks.shuffle(rng);
    picks
}

/// The adaptive tag selection engine.
pub struct TagSelector<S: TagStore> {
    pub(crate) store: Arc<S>,
    pub(crate) config: SelectionConfig,
    rng: Mutex<StdRng>,
}

impl<S: TagStore> TagSelector<S> {
    pub fn new(store: Arc<S>, config: SelectionConfig) -> Self {
        Self::with_rng(store, config, StdRng::from_os_rng())
    }

    /// Selector with a reproducible random sequence.
    pub fn with_seed(store: Arc<S>, config: SelectionConfig, seed: u64) -> Self {
        Self::with_rng(store, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(store: Arc<S>, config: SelectionConfig, rng: StdRng) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Per-strategy split of `count` under the configured weights.
    pub fn strategy_counts(&self, count: usize) -> StrategyCounts {
        split_counts(count, &self.config)
    }

    /// Select `count` distinct tags for today.
    pub async fn select_daily_tags(&self, count: usize) -> Result<Vec<TagPick>, TagsError> {
        self.select_daily_tags_at(count, Utc::now()).await
    }

    /// Select `count` distinct tags as of `now`.
    ///
    /// Fails with `NoTagsAvailable` when the catalog is empty.
    #[instrument(skip(self))]
    pub async fn select_daily_tags_at(
        &self,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<TagPick>, TagsError> {
        let inputs = self.load_inputs(now).await?;
        if inputs.tags.is_empty() {
            return Err(TagsError::NoTagsAvailable);
        }

        let counts = self.strategy_counts(count);
        let picks = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            compose_slate(&inputs, &counts, &mut *rng)
        };

        info!(
            requested = count,
            selected = picks.len(),
            catalog = inputs.tags.len(),
            history = counts.history,
            wildcard = counts.wildcard,
            deep_dive = counts.deep_dive,
            random = counts.random,
            "Selected daily tags"
        );
        Ok(picks)
    }

    async fn load_inputs(&self, now: DateTime<Utc>) -> Result<SelectionInputs, TagsError> {
        let tags = self.store.list_tags().await?;
        if tags.is_empty() {
            return Ok(SelectionInputs::default());
        }

        let history_start = now - Duration::days(i64::from(self.config.history_window_days));
        let history_end = now - Duration::days(i64::from(self.config.history_exclude_days));
        let wildcard_start = now - Duration::days(i64::from(self.config.wildcard_window_days));

        Ok(SelectionInputs {
            tags,
            window_history: self.store.history_between(history_start, history_end).await?,
            recent_history: self.store.history_between(wildcard_start, now).await?,
            deep_sparks: self
                .store
                .recent_sparks(SparkMode::Deep, self.config.deep_dive_lookback)
                .await?,
        })
    }

    /// Record one use of each tag, all labelled with `strategy`.
    pub async fn record_tag_usage(
        &self,
        tag_ids: &[String],
        strategy: SelectionStrategy,
    ) -> Result<Vec<TagHistoryEntry>, TagsError> {
        self.record_tag_usage_at(tag_ids, strategy, Utc::now()).await
    }

    #[instrument(skip(self, tag_ids), fields(count = tag_ids.len()))]
    pub async fn record_tag_usage_at(
        &self,
        tag_ids: &[String],
        strategy: SelectionStrategy,
        used_at: DateTime<Utc>,
    ) -> Result<Vec<TagHistoryEntry>, TagsError> {
        let uses: Vec<(String, SelectionStrategy)> =
            tag_ids.iter().map(|id| (id.clone(), strategy)).collect();
        self.store.record_usage(&uses, used_at).await
    }

    /// Record one use of each picked tag under the strategy that picked it.
    pub async fn record_selection(
        &self,
        picks: &[TagPick],
        used_at: DateTime<Utc>,
    ) -> Result<Vec<TagHistoryEntry>, TagsError> {
        let uses: Vec<(String, SelectionStrategy)> = picks
            .iter()
            .map(|pick| (pick.tag.id.clone(), pick.strategy))
            .collect();
        self.store.record_usage(&uses, used_at).await
    }

    /// Store a generated content item so deep-dive selection can see it.
    #[instrument(skip(self, spark), fields(spark_id = %spark.id))]
    pub async fn record_spark(&self, spark: &SparkRecord) -> Result<(), TagsError> {
        self.store.put_spark(spark).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: &str, name: &str, category: Option<&str>) -> Tag {
        let mut tag = Tag::new(name, category.map(str::to_string), false);
        tag.id = id.to_string();
        tag
    }

    fn used(tag_id: &str, days_ago: i64, now: DateTime<Utc>) -> TagHistoryEntry {
        TagHistoryEntry::new(tag_id, now - Duration::days(days_ago), SelectionStrategy::History)
    }

    fn catalog(n: usize) -> Vec<Tag> {
        (0..n)
            .map(|i| tag(&format!("t{:02}", i), &format!("Tag {:02}", i), Some(format!("c{}", i % 4).as_str())))
            .collect()
    }

    fn counts(history: usize, wildcard: usize, deep_dive: usize, random: usize) -> StrategyCounts {
        StrategyCounts {
            history,
            wildcard,
            deep_dive,
            random,
        }
    }

    #[test]
    fn test_split_counts_five() {
        let split = split_counts(5, &SelectionConfig::default());
        assert_eq!(split, counts(2, 1, 1, 1));
        assert_eq!(split.total(), 5);
    }

    #[test]
    fn test_split_counts_always_sums() {
        let config = SelectionConfig::default();
        for count in 0..50 {
            assert_eq!(split_counts(count, &config).total(), count);
        }
        assert_eq!(split_counts(1, &config), counts(0, 0, 0, 1));
        assert_eq!(split_counts(10, &config), counts(4, 3, 2, 1));
    }

    #[test]
    fn test_history_ranks_by_usage() {
        let now = Utc::now();
        let tags = vec![tag("a", "A", None), tag("b", "B", None), tag("c", "C", None)];
        let inputs = SelectionInputs {
            window_history: vec![used("b", 4, now), used("c", 5, now), used("c", 6, now), used("gone", 4, now)],
            tags,
            ..Default::default()
        };

        let mut rng = StdRng::seed_from_u64(1);
        let picks = compose_slate(&inputs, &counts(2, 0, 0, 0), &mut rng);
        let mut ids: Vec<&str> = picks.iter().map(|p| p.tag.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(picks.iter().all(|p| p.strategy == SelectionStrategy::History));
    }

    #[test]
    fn test_wildcard_skips_recent_categories() {
        let now = Utc::now();
        let tags = vec![
            tag("a", "A", Some("sains")),
            tag("b", "B", Some("sains")),
            tag("c", "C", Some("seni")),
            tag("d", "D", Some("sejarah")),
        ];
        let inputs = SelectionInputs {
            recent_history: vec![used("a", 1, now)],
            tags,
            ..Default::default()
        };

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picks = compose_slate(&inputs, &counts(0, 2, 0, 0), &mut rng);
            assert_eq!(picks.len(), 2);
            for pick in &picks {
                assert_eq!(pick.strategy, SelectionStrategy::Wildcard);
                assert_ne!(pick.tag.category(), "sains");
            }
            assert_ne!(picks[0].tag.category(), picks[1].tag.category());
        }
    }

    #[test]
    fn test_wildcard_falls_back_to_random() {
        let now = Utc::now();
        let tags = vec![tag("a", "A", Some("sains")), tag("b", "B", Some("sains"))];
        let inputs = SelectionInputs {
            recent_history: vec![used("a", 1, now)],
            tags,
            ..Default::default()
        };

        let mut rng = StdRng::seed_from_u64(7);
        let picks = compose_slate(&inputs, &counts(0, 1, 0, 0), &mut rng);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].strategy, SelectionStrategy::Random);
    }

    #[test]
    fn test_deep_dive_takes_first_found() {
        let tags = catalog(6);
        let sparks = vec![
            SparkRecord::new("s2", SparkMode::Deep, vec!["t03".into(), "missing".into()]),
            SparkRecord::new("s1", SparkMode::Deep, vec!["t01".into(), "t03".into(), "t05".into()]),
        ];
        let inputs = SelectionInputs {
            tags,
            deep_sparks: sparks,
            ..Default::default()
        };

        let mut rng = StdRng::seed_from_u64(3);
        let picks = compose_slate(&inputs, &counts(0, 0, 2, 0), &mut rng);
        let mut ids: Vec<&str> = picks.iter().map(|p| p.tag.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["t01", "t03"]);
        assert!(picks.iter().all(|p| p.strategy == SelectionStrategy::DeepDive));
    }

    #[test]
    fn test_slate_has_no_duplicates_and_full_count() {
        let now = Utc::now();
        let tags = catalog(12);
        let inputs = SelectionInputs {
            window_history: vec![used("t00", 4, now), used("t01", 5, now)],
            recent_history: vec![used("t02", 1, now)],
            deep_sparks: vec![SparkRecord::new("s", SparkMode::Deep, vec!["t00".into(), "t04".into()])],
            tags,
        };

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picks = compose_slate(&inputs, &counts(2, 1, 1, 1), &mut rng);
            assert_eq!(picks.len(), 5);
            let unique: HashSet<&str> = picks.iter().map(|p| p.tag.id.as_str()).collect();
            assert_eq!(unique.len(), 5);
        }
    }

    #[test]
    fn test_small_catalog_returns_everything() {
        let inputs = SelectionInputs {
            tags: catalog(3),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let picks = compose_slate(&inputs, &counts(2, 1, 1, 1), &mut rng);
        assert_eq!(picks.len(), 3);
    }
}
