use std::{fs, path::Path, sync::Arc};

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Decision engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSettings {
    /// Analysis confidence below which clarification is requested.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Active tests at which new work is queued.
    #[serde(default = "default_max_parallel_actions")]
    pub max_parallel_actions: usize,
    /// CPU percentage above which new work is queued.
    #[serde(default = "default_cpu_queue_threshold")]
    pub cpu_queue_threshold: f64,
    /// Memory percentage above which new work is queued.
    #[serde(default = "default_memory_queue_threshold")]
    pub memory_queue_threshold: f64,
    /// CPU percentage above which execution falls back to sequential.
    #[serde(default = "default_cpu_sequential_threshold")]
    pub cpu_sequential_threshold: f64,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_parallel_actions: default_max_parallel_actions(),
            cpu_queue_threshold: default_cpu_queue_threshold(),
            memory_queue_threshold: default_memory_queue_threshold(),
            cpu_sequential_threshold: default_cpu_sequential_threshold(),
        }
    }
}

/// Learning engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSettings {
    /// Minimum results before trends and optimizations are computed.
    #[serde(default = "default_min_data_points")]
    pub min_data_points: usize,
    /// Pattern confidence at which a pattern is promoted to the cache.
    #[serde(default = "default_learning_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Weight of the newest observation in the moving average.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
    /// Scheduled recompute period.
    #[serde(default = "default_learning_interval_ms")]
    pub interval_ms: u64,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            min_data_points: default_min_data_points(),
            confidence_threshold: default_learning_confidence_threshold(),
            ema_alpha: default_ema_alpha(),
            interval_ms: default_learning_interval_ms(),
        }
    }
}

/// Memory store knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySettings {
    /// Cap per memory-type bucket.
    #[serde(default = "default_max_entries_per_type")]
    pub max_entries_per_type: usize,
    /// Age after which entries are swept.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
    /// Scheduled sweep period.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    /// Cap on retained failures.
    #[serde(default = "default_max_failures")]
    pub max_failures: usize,
    /// Cap on retained results.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Cap on retained learning records.
    #[serde(default = "default_max_learning_records")]
    pub max_learning_records: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_entries_per_type: default_max_entries_per_type(),
            retention_hours: default_retention_hours(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            max_failures: default_max_failures(),
            max_results: default_max_results(),
            max_learning_records: default_max_learning_records(),
        }
    }
}

/// Dependency analysis knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Maximum edges followed from the target set when computing blast radius.
    #[serde(default = "default_hop_limit")]
    pub hop_limit: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            hop_limit: default_hop_limit(),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JarvisConfig {
    /// Decision engine section.
    #[serde(default)]
    pub decision: DecisionSettings,
    /// Learning engine section.
    #[serde(default)]
    pub learning: LearningSettings,
    /// Memory store section.
    #[serde(default)]
    pub memory: MemorySettings,
    /// Dependency analysis section.
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl JarvisConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading jarvis config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Applies `JARVIS_CONFIDENCE_THRESHOLD` and `JARVIS_MAX_PARALLEL_ACTIONS`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var("JARVIS_CONFIDENCE_THRESHOLD") {
            self.decision.confidence_threshold = raw
                .trim()
                .parse()
                .with_context(|| format!("JARVIS_CONFIDENCE_THRESHOLD={raw}"))?;
        }
        if let Ok(raw) = std::env::var("JARVIS_MAX_PARALLEL_ACTIONS") {
            self.decision.max_parallel_actions = raw
                .trim()
                .parse()
                .with_context(|| format!("JARVIS_MAX_PARALLEL_ACTIONS={raw}"))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects values the engines cannot operate with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("decision.confidence_threshold", self.decision.confidence_threshold),
            ("learning.confidence_threshold", self.learning.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must lie in [0, 1], got {value}");
            }
        }
        if !(self.learning.ema_alpha > 0.0 && self.learning.ema_alpha <= 1.0) {
            bail!(
                "learning.ema_alpha must lie in (0, 1], got {}",
                self.learning.ema_alpha
            );
        }
        if self.decision.max_parallel_actions == 0 {
            bail!("decision.max_parallel_actions must be positive");
        }
        if self.memory.max_entries_per_type == 0
            || self.memory.max_failures == 0
            || self.memory.max_results == 0
            || self.memory.max_learning_records == 0
        {
            bail!("memory capacities must be positive");
        }
        if self.memory.retention_hours <= 0 || self.memory.retention_hours > MAX_RETENTION_HOURS {
            bail!(
                "memory.retention_hours must lie in 1..={MAX_RETENTION_HOURS}, got {}",
                self.memory.retention_hours
            );
        }
        if self.memory.cleanup_interval_ms == 0 || self.learning.interval_ms == 0 {
            bail!("scheduler intervals must be positive");
        }
        Ok(())
    }
}

/// Hot-swappable configuration shared by every engine.
///
/// Readers take the current `Arc` per operation; a swap is visible to the
/// next operation and never tears a read in progress.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<JarvisConfig>>>,
}

impl ConfigHandle {
    /// Wraps an initial configuration.
    #[must_use]
    pub fn new(config: JarvisConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Latest configuration.
    #[must_use]
    pub fn current(&self) -> Arc<JarvisConfig> {
        Arc::clone(&*self.inner.read())
    }

    /// Validates and installs a new configuration.
    pub fn replace(&self, config: JarvisConfig) -> Result<()> {
        config.validate()?;
        *self.inner.write() = Arc::new(config);
        tracing::info!("jarvis configuration replaced");
        Ok(())
    }

    /// Applies an in-place edit to a copy and installs it if still valid.
    pub fn update(&self, edit: impl FnOnce(&mut JarvisConfig)) -> Result<()> {
        let mut next = (*self.current()).clone();
        edit(&mut next);
        self.replace(next)
    }

    /// Reloads from a TOML file; the previous configuration stays on error.
    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<()> {
        let config = JarvisConfig::load(path)?;
        self.replace(config)
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(JarvisConfig::default())
    }
}

/// Longest accepted retention window, one hundred years.
pub const MAX_RETENTION_HOURS: i64 = 100 * 365 * 24;

const fn default_confidence_threshold() -> f64 {
    0.6
}

const fn default_max_parallel_actions() -> usize {
    5
}

const fn default_cpu_queue_threshold() -> f64 {
    90.0
}

const fn default_memory_queue_threshold() -> f64 {
    85.0
}

const fn default_cpu_sequential_threshold() -> f64 {
    80.0
}

const fn default_min_data_points() -> usize {
    10
}

const fn default_learning_confidence_threshold() -> f64 {
    0.7
}

const fn default_ema_alpha() -> f64 {
    0.3
}

const fn default_learning_interval_ms() -> u64 {
    300_000
}

const fn default_max_entries_per_type() -> usize {
    10_000
}

const fn default_retention_hours() -> i64 {
    168
}

const fn default_cleanup_interval_ms() -> u64 {
    3_600_000
}

const fn default_max_failures() -> usize {
    100
}

const fn default_max_results() -> usize {
    1_000
}

const fn default_max_learning_records() -> usize {
    500
}

const fn default_hop_limit() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_surface() {
        let config = JarvisConfig::default();
        assert!((config.decision.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.decision.max_parallel_actions, 5);
        assert_eq!(config.learning.min_data_points, 10);
        assert!((config.learning.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.memory.max_entries_per_type, 10_000);
        assert_eq!(config.memory.retention_hours, 168);
        assert_eq!(config.memory.cleanup_interval_ms, 3_600_000);
        assert_eq!(config.learning.interval_ms, 300_000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = JarvisConfig::from_toml(
            r#"
            [decision]
            max_parallel_actions = 8

            [memory]
            retention_hours = 24
            "#,
        )
        .unwrap();
        assert_eq!(config.decision.max_parallel_actions, 8);
        assert!((config.decision.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.memory.retention_hours, 24);
        assert_eq!(config.memory.max_results, 1_000);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = JarvisConfig::from_toml("[decision]\nconfidence_threshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn toml_round_trips_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jarvis.toml");
        let mut config = JarvisConfig::default();
        config.analysis.hop_limit = 3;
        fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(JarvisConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn handle_swaps_atomically_and_keeps_old_on_error() {
        let dir = tempdir().unwrap();
        let handle = ConfigHandle::default();
        let before = handle.current();
        handle
            .update(|cfg| cfg.decision.confidence_threshold = 0.9)
            .unwrap();
        assert!((before.decision.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert!((handle.current().decision.confidence_threshold - 0.9).abs() < f64::EPSILON);

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[memory]\nretention_hours = 0\n").unwrap();
        assert!(handle.reload_from(&bad).is_err());
        assert!((handle.current().decision.confidence_threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn retention_window_is_bounded() {
        let handle = ConfigHandle::default();
        assert!(handle
            .update(|cfg| cfg.memory.retention_hours = 10_000_000_000)
            .is_err());
        assert_eq!(handle.current().memory.retention_hours, 168);
        handle
            .update(|cfg| cfg.memory.retention_hours = MAX_RETENTION_HOURS)
            .unwrap();
        assert_eq!(handle.current().memory.retention_hours, MAX_RETENTION_HOURS);
    }
}
