//! Capture loop configuration surface.
//!
//! Loaded from TOML; every field has a default, so a partial file is valid.
//! Conversion into [`ScheduleConfig`] / [`MatchCriterion`] is infallible;
//! validation happens once, when the scheduler is started.

use crate::scheduler::config::{CadencePolicy, DEFAULT_HISTORY_LIMIT, ScheduleConfig};
use crate::tree::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES, MatchCriterion, MatchField, TreeMatcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Milliseconds between the end of one tick and the start of the next.
    pub interval_ms: u64,
    /// Milliseconds before the first tick.
    pub initial_delay_ms: u64,
    /// Stop after this many ticks (unbounded when absent).
    pub max_ticks: Option<u64>,
    /// Upper bound of random extra wait per interval.
    pub jitter_ms: Option<u64>,
    /// Text the target node must carry, compared exactly.
    pub match_text: String,
    /// Which node field `match_text` is compared against.
    pub match_field: MatchField,
    /// Tick records kept for status snapshots.
    pub history_limit: usize,
    /// Wait policy between ticks.
    pub cadence: CadenceConfig,
    /// Tree search bounds.
    pub matcher: MatcherConfig,
    /// Paths used by the headless host binary.
    pub host: HostConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            initial_delay_ms: 0,
            max_ticks: None,
            jitter_ms: None,
            match_text: "Capture".to_owned(),
            match_field: MatchField::Either,
            history_limit: DEFAULT_HISTORY_LIMIT,
            cadence: CadenceConfig::default(),
            matcher: MatcherConfig::default(),
            host: HostConfig::default(),
        }
    }
}

/// Cadence policy selector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceKind {
    #[default]
    Fixed,
    BackoffOnFailure,
}

/// Cadence settings. `factor` and `max_interval_ms` only apply to backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub policy: CadenceKind,
    /// Delay multiplier per consecutive failure.
    pub factor: u32,
    /// Cap on the backed-off delay.
    pub max_interval_ms: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            policy: CadenceKind::Fixed,
            factor: 2,
            max_interval_ms: 60_000,
        }
    }
}

/// Tree search bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Deepest level searched (root = 0).
    pub max_depth: usize,
    /// Nodes inspected per search before giving up.
    pub max_nodes: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

/// Files used by `capture-pilot-host`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// JSON tree snapshot re-read on every tick.
    pub snapshot_path: PathBuf,
    /// JSONL journal of synthetic clicks.
    pub journal_path: PathBuf,
    /// Keep-alive lease file.
    pub lease_path: PathBuf,
    /// Seconds an unrenewed lease stays valid.
    pub lease_ttl_secs: u64,
    /// Seconds between lease renewals.
    pub lease_heartbeat_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        let data = crate::app_dirs::data_dir();
        Self {
            snapshot_path: data.join("tree.json"),
            journal_path: data.join("clicks.jsonl"),
            lease_path: data.join("keepalive.lease"),
            lease_ttl_secs: 15,
            lease_heartbeat_secs: 5,
        }
    }
}

impl CaptureConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::CaptureError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CaptureError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }

    /// Timing configuration for the scheduler.
    pub fn schedule(&self) -> ScheduleConfig {
        let mut schedule = ScheduleConfig::new(Duration::from_millis(self.interval_ms))
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_history_limit(self.history_limit);
        schedule.max_ticks = self.max_ticks;
        schedule.jitter = self.jitter_ms.map(Duration::from_millis);
        schedule.cadence = match self.cadence.policy {
            CadenceKind::Fixed => CadencePolicy::Fixed,
            CadenceKind::BackoffOnFailure => CadencePolicy::BackoffOnFailure {
                factor: self.cadence.factor,
                max_interval: Duration::from_millis(self.cadence.max_interval_ms),
            },
        };
        schedule
    }

    /// Target predicate.
    pub fn criterion(&self) -> MatchCriterion {
        MatchCriterion::new(self.match_text.clone(), self.match_field)
    }

    /// Tree search bounds.
    pub fn matcher(&self) -> TreeMatcher {
        TreeMatcher::new()
            .with_max_depth(self.matcher.max_depth)
            .with_max_nodes(self.matcher.max_nodes)
    }
}
