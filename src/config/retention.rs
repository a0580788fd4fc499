//! Disk retention configuration.
//!
//! Configures which directories are swept, how old and how large their
//! contents may grow, and how often each one is checked.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! tick_secs = 60
//! full_pass_interval_secs = 3600
//!
//! [retention.safety]
//! dry_run = false
//! max_deletes_per_run = 0
//!
//! [[retention.categories]]
//! name = "tts_temp"
//! path = "/var/tmp/tts"
//! max_age_hours = 24
//! max_size_mb = 100
//! file_patterns = ["*.wav", "*.mp3", "*.ogg"]
//! interval_secs = 1800
//! ```

use std::{collections::HashSet, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::retention::FilePattern;

/// Disk retention configuration.
///
/// When enabled, a background loop checks every `tick_secs` whether any
/// category (or the aggregate pass) is due and sweeps the matching
/// directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether the scheduled sweeper runs.
    /// On-demand runs are available either way.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often the scheduling loop wakes up to look for due work (in seconds).
    /// Default: 60
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// How often every category is swept regardless of its own cadence (in seconds).
    /// Default: 3600 (once per hour)
    #[serde(default = "default_full_pass_interval_secs")]
    pub full_pass_interval_secs: u64,

    /// Run a full pass as soon as the sweeper starts.
    /// Default: true
    #[serde(default = "default_true")]
    pub run_on_start: bool,

    /// Safety settings to prevent accidental data loss.
    #[serde(default)]
    pub safety: RetentionSafety,

    /// Managed directories.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: default_tick_secs(),
            full_pass_interval_secs: default_full_pass_interval_secs(),
            run_on_start: true,
            safety: RetentionSafety::default(),
            categories: default_categories(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_tick_secs() -> u64 {
    60
}

fn default_full_pass_interval_secs() -> u64 {
    3600
}

fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig {
            name: "tts_temp".to_string(),
            path: std::env::temp_dir().join("sweeper").join("tts"),
            max_age_hours: 24,
            max_size_mb: 100,
            file_patterns: vec!["*.wav".into(), "*.mp3".into(), "*.ogg".into()],
            interval_secs: 30 * 60,
        },
        CategoryConfig {
            name: "logs".to_string(),
            path: std::env::temp_dir().join("sweeper").join("logs"),
            max_age_hours: 7 * 24,
            max_size_mb: 500,
            file_patterns: vec!["*.log".into(), "*.txt".into()],
            interval_secs: 2 * 3600,
        },
        CategoryConfig {
            name: "cache".to_string(),
            path: std::env::temp_dir().join("sweeper").join("cache"),
            max_age_hours: 24,
            max_size_mb: 50,
            file_patterns: vec!["*.cache".into(), "*.tmp".into()],
            interval_secs: 6 * 3600,
        },
    ]
}

/// A single managed directory and its retention limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct CategoryConfig {
    /// Unique category name (used in logs, metrics and the stats report).
    pub name: String,

    /// Absolute path of the directory to sweep.
    /// A directory that does not exist is simply skipped.
    pub path: PathBuf,

    /// Files last modified more than this many hours ago are deleted.
    /// 0 makes every matched file eligible.
    pub max_age_hours: u64,

    /// Upper bound on the combined size of matched files, in MiB.
    /// When exceeded, the oldest files are deleted until it fits.
    pub max_size_mb: u64,

    /// Glob patterns matched against file names (`*`, `?`, `[...]`).
    pub file_patterns: Vec<String>,

    /// How often this category is swept on its own (in seconds).
    /// Default: 3600
    #[serde(default = "default_category_interval_secs")]
    pub interval_secs: u64,
}

fn default_category_interval_secs() -> u64 {
    3600
}

impl CategoryConfig {
    /// Maximum file age in seconds.
    pub fn max_age_secs(&self) -> u64 {
        self.max_age_hours.saturating_mul(3600)
    }

    /// Maximum aggregate size in bytes.
    pub fn max_total_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Get the cadence as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Safety settings for retention operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetentionSafety {
    /// If true, log what would be deleted without actually deleting.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Maximum number of files to delete per category per pass.
    /// The oldest candidates are kept when the plan is truncated.
    /// Set to 0 for unlimited.
    /// Default: 0
    #[serde(default)]
    pub max_deletes_per_run: u64,
}

impl RetentionConfig {
    /// Get the scheduling tick as a Duration.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Get the aggregate pass interval as a Duration.
    pub fn full_pass_interval(&self) -> Duration {
        Duration::from_secs(self.full_pass_interval_secs)
    }

    /// Look up a category by name.
    #[cfg(test)]
    fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Validate intervals, category names, paths and patterns.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_secs == 0 {
            return Err("retention.tick_secs must be greater than 0".into());
        }
        if self.full_pass_interval_secs == 0 {
            return Err("retention.full_pass_interval_secs must be greater than 0".into());
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err("retention category name must not be empty".into());
            }
            if !seen.insert(category.name.as_str()) {
                return Err(format!(
                    "retention category '{}' is defined more than once",
                    category.name
                ));
            }
            if !category.path.is_absolute() {
                return Err(format!(
                    "retention category '{}' path must be absolute, got '{}'",
                    category.name,
                    category.path.display()
                ));
            }
            if category.interval_secs == 0 {
                return Err(format!(
                    "retention category '{}' interval_secs must be greater than 0",
                    category.name
                ));
            }
            if category.file_patterns.is_empty() {
                return Err(format!(
                    "retention category '{}' needs at least one file pattern",
                    category.name
                ));
            }
            for pattern in &category.file_patterns {
                FilePattern::new(pattern).map_err(|e| {
                    format!("retention category '{}': {}", category.name, e)
                })?;
            }
        }

        Ok(())
    }
}
