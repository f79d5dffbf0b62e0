//! Configuration loading for Sparkmap.
//!
//! Layered config: defaults -> config file -> explicit file -> env vars.
//! The default config file lives at ~/.config/sparkmap/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::SparkmapError;

/// Concept graph update parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Weight given to a concept the first time it is seen
    #[serde(default = "default_initial_weight")]
    pub initial_weight: f64,

    /// Weight added on every re-occurrence
    #[serde(default = "default_weight_increment")]
    pub weight_increment: f64,

    /// Strength given to a link on its first co-occurrence
    #[serde(default = "default_initial_link_strength")]
    pub initial_link_strength: f64,

    /// Strength added on every repeated co-occurrence
    #[serde(default = "default_link_increment")]
    pub link_increment: f64,

    #[serde(default = "default_link_type")]
    pub default_link_type: String,

    /// Cluster label assigned to new concepts
    #[serde(default = "default_cluster")]
    pub default_cluster: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            initial_weight: default_initial_weight(),
            weight_increment: default_weight_increment(),
            initial_link_strength: default_initial_link_strength(),
            link_increment: default_link_increment(),
            default_link_type: default_link_type(),
            default_cluster: default_cluster(),
        }
    }
}

fn default_initial_weight() -> f64 {
    0.5
}
fn default_weight_increment() -> f64 {
    0.1
}
fn default_initial_link_strength() -> f64 {
    0.3
}
fn default_link_increment() -> f64 {
    0.1
}
fn default_link_type() -> String {
    crate::concept::DEFAULT_LINK_TYPE.to_string()
}
fn default_cluster() -> String {
    "general".to_string()
}

/// Cluster detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Links weaker than this are ignored when building components
    #[serde(default = "default_min_link_strength")]
    pub min_link_strength: f64,

    /// Number of top-weight concepts joined into a cluster name
    #[serde(default = "default_name_concept_count")]
    pub name_concept_count: usize,

    /// Coherence weight of the average intra-cluster link strength
    #[serde(default = "default_strength_weight")]
    pub strength_weight: f64,

    /// Coherence weight of the intra-cluster link density
    #[serde(default = "default_density_weight")]
    pub density_weight: f64,

    /// Coherence used when a component has no internal links
    #[serde(default = "default_fallback_coherence")]
    pub fallback_coherence: f64,

    /// Member weight variance above which a cluster is reported
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,

    /// Delete stored clusters that the latest detection did not produce.
    /// Off by default: stale clusters accumulate.
    #[serde(default)]
    pub prune_stale: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_link_strength: default_min_link_strength(),
            name_concept_count: default_name_concept_count(),
            strength_weight: default_strength_weight(),
            density_weight: default_density_weight(),
            fallback_coherence: default_fallback_coherence(),
            variance_threshold: default_variance_threshold(),
            prune_stale: false,
        }
    }
}

fn default_min_link_strength() -> f64 {
    0.3
}
fn default_name_concept_count() -> usize {
    3
}
fn default_strength_weight() -> f64 {
    0.7
}
fn default_density_weight() -> f64 {
    0.3
}
fn default_fallback_coherence() -> f64 {
    0.5
}
fn default_variance_threshold() -> f64 {
    0.3
}

/// Daily tag selection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_history_weight")]
    pub history_weight: f64,

    #[serde(default = "default_wildcard_weight")]
    pub wildcard_weight: f64,

    #[serde(default = "default_deep_dive_weight")]
    pub deep_dive_weight: f64,

    /// Share of the random bucket. The four weights must sum to 1.0; the
    /// random bucket also absorbs the rounding loss of the other three.
    #[serde(default = "default_random_weight")]
    pub random_weight: f64,

    /// Oldest usage considered by the history strategy, in days
    #[serde(default = "default_history_window_days")]
    pub history_window_days: u32,

    /// Most recent days excluded from the history strategy
    #[serde(default = "default_history_exclude_days")]
    pub history_exclude_days: u32,

    /// Categories used within this many days are not wildcards
    #[serde(default = "default_wildcard_window_days")]
    pub wildcard_window_days: u32,

    /// Number of recent deep sparks inspected by the deep-dive strategy
    #[serde(default = "default_deep_dive_lookback")]
    pub deep_dive_lookback: usize,

    /// Default slate size
    #[serde(default = "default_daily_count")]
    pub daily_count: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            history_weight: default_history_weight(),
            wildcard_weight: default_wildcard_weight(),
            deep_dive_weight: default_deep_dive_weight(),
            random_weight: default_random_weight(),
            history_window_days: default_history_window_days(),
            history_exclude_days: default_history_exclude_days(),
            wildcard_window_days: default_wildcard_window_days(),
            deep_dive_lookback: default_deep_dive_lookback(),
            daily_count: default_daily_count(),
        }
    }
}

fn default_history_weight() -> f64 {
    0.4
}
fn default_wildcard_weight() -> f64 {
    0.3
}
fn default_deep_dive_weight() -> f64 {
    0.2
}
fn default_random_weight() -> f64 {
    0.1
}
fn default_history_window_days() -> u32 {
    7
}
fn default_history_exclude_days() -> u32 {
    3
}
fn default_wildcard_window_days() -> u32 {
    7
}
fn default_deep_dive_lookback() -> usize {
    10
}
fn default_daily_count() -> usize {
    5
}

impl SelectionConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in [
            ("history_weight", self.history_weight),
            ("wildcard_weight", self.wildcard_weight),
            ("deep_dive_weight", self.deep_dive_weight),
            ("random_weight", self.random_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(format!("{} must be 0.0-1.0, got {}", name, weight));
            }
        }
        let total =
            self.history_weight + self.wildcard_weight + self.deep_dive_weight + self.random_weight;
        if (total - 1.0).abs() > 1e-9 {
            return Err(format!("strategy weights must sum to 1.0, got {}", total));
        }
        if self.history_exclude_days >= self.history_window_days {
            return Err(format!(
                "history_exclude_days ({}) must be less than history_window_days ({})",
                self.history_exclude_days, self.history_window_days
            ));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub selection: SelectionConfig,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "sparkmap")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            graph: GraphConfig::default(),
            clustering: ClusteringConfig::default(),
            selection: SelectionConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/sparkmap/config.toml)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (SPARKMAP_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, SparkmapError> {
        let config_dir = ProjectDirs::from("", "", "sparkmap")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| SparkmapError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| SparkmapError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SPARKMAP_DB_PATH, SPARKMAP_SELECTION__DAILY_COUNT, ...
        builder = builder.add_source(
            Environment::with_prefix("SPARKMAP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| SparkmapError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| SparkmapError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), SparkmapError> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(SparkmapError::Config(format!("{} must be 0.0-1.0, got {}", name, value)))
            }
        };
        unit("graph.initial_weight", self.graph.initial_weight)?;
        unit("graph.weight_increment", self.graph.weight_increment)?;
        unit("graph.initial_link_strength", self.graph.initial_link_strength)?;
        unit("graph.link_increment", self.graph.link_increment)?;
        unit("clustering.min_link_strength", self.clustering.min_link_strength)?;
        unit("clustering.fallback_coherence", self.clustering.fallback_coherence)?;
        if (self.clustering.strength_weight + self.clustering.density_weight - 1.0).abs() > 1e-9 {
            return Err(SparkmapError::Config(
                "clustering.strength_weight and density_weight must sum to 1.0".to_string(),
            ));
        }
        if self.clustering.name_concept_count == 0 {
            return Err(SparkmapError::Config(
                "clustering.name_concept_count must be > 0".to_string(),
            ));
        }
        self.selection.validate().map_err(SparkmapError::Config)
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(dirs) = directories::BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert!(settings.validate().is_ok());
        assert!(!settings.clustering.prune_stale);
    }

    #[test]
    fn test_graph_defaults() {
        let config = GraphConfig::default();
        assert!((config.initial_weight - 0.5).abs() < f64::EPSILON);
        assert!((config.weight_increment - 0.1).abs() < f64::EPSILON);
        assert!((config.initial_link_strength - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.default_link_type, "semantic");
    }

    #[test]
    fn test_selection_defaults() {
        let config = SelectionConfig::default();
        assert!((config.history_weight - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.history_window_days, 7);
        assert_eq!(config.history_exclude_days, 3);
        assert_eq!(config.deep_dive_lookback, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_selection_validation() {
        let mut config = SelectionConfig::default();
        config.history_weight = 0.9;
        assert!(config.validate().is_err());

        let mut config = SelectionConfig::default();
        config.random_weight = 0.0;
        assert!(config.validate().is_err());
        config.deep_dive_weight = 0.3;
        assert!(config.validate().is_ok());

        let mut config = SelectionConfig::default();
        config.history_exclude_days = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clustering_validation() {
        let mut settings = Settings::default();
        settings.clustering.strength_weight = 0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.selection.daily_count, 5);
    }

    #[test]
    fn test_expanded_db_path_plain() {
        let mut settings = Settings::default();
        settings.db_path = "/tmp/sparkmap".to_string();
        assert_eq!(settings.expanded_db_path(), PathBuf::from("/tmp/sparkmap"));
    }

    #[test]
    fn test_settings_partial_json() {
        let settings: Settings =
            serde_json::from_str(r#"{"clustering":{"prune_stale":true}}"#).unwrap();
        assert!(settings.clustering.prune_stale);
        assert!((settings.clustering.min_link_strength - 0.3).abs() < f64::EPSILON);
    }
}
