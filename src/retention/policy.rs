//! Retention policies and the read-only registry that holds them.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use super::{
    error::{RetentionError, RetentionResult},
    pattern::FilePattern,
};
use crate::config::{CategoryConfig, RetentionConfig};

/// Retention limits for one managed directory.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Category name, unique within a registry.
    pub category: String,
    /// Directory to sweep. May not exist.
    pub directory: PathBuf,
    /// Files last modified before `now - max_age_secs` are evicted.
    pub max_age_secs: u64,
    /// Ceiling on the combined size of distinct matched files.
    pub max_total_bytes: u64,
    /// File name patterns, in configuration order.
    pub file_patterns: Vec<FilePattern>,
    /// Scheduling cadence for this category.
    pub interval: Duration,
}

impl RetentionPolicy {
    /// Build a policy, compiling each pattern.
    pub fn new(
        category: impl Into<String>,
        directory: impl Into<PathBuf>,
        max_age_secs: u64,
        max_total_bytes: u64,
        patterns: &[&str],
    ) -> RetentionResult<Self> {
        let category = category.into();
        if patterns.is_empty() {
            return Err(RetentionError::NoPatterns(category));
        }
        let file_patterns = patterns
            .iter()
            .map(|p| FilePattern::new(p))
            .collect::<RetentionResult<Vec<_>>>()?;

        Ok(Self {
            category,
            directory: directory.into(),
            max_age_secs,
            max_total_bytes,
            file_patterns,
            interval: Duration::from_secs(3600),
        })
    }

    /// Set the scheduling cadence.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Build a policy from its configuration entry.
    pub fn from_config(config: &CategoryConfig) -> RetentionResult<Self> {
        let patterns: Vec<&str> = config.file_patterns.iter().map(String::as_str).collect();
        Ok(Self::new(
            config.name.clone(),
            config.path.clone(),
            config.max_age_secs(),
            config.max_total_bytes(),
            &patterns,
        )?
        .with_interval(config.interval()))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Immutable mapping from category name to policy.
///
/// Built once at startup; cloning shares the same policies.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    /// Policies in configuration order.
    policies: Vec<Arc<RetentionPolicy>>,
    /// Category name -> index into `policies`.
    index: HashMap<String, usize>,
}

impl PolicyRegistry {
    /// Create a registry, rejecting duplicate category names.
    pub fn new(policies: Vec<RetentionPolicy>) -> RetentionResult<Self> {
        let mut index = HashMap::with_capacity(policies.len());
        for (i, policy) in policies.iter().enumerate() {
            if index.insert(policy.category.clone(), i).is_some() {
                return Err(RetentionError::DuplicateCategory(policy.category.clone()));
            }
        }

        Ok(Self {
            policies: policies.into_iter().map(Arc::new).collect(),
            index,
        })
    }

    /// Build a registry from the `[retention]` configuration section.
    pub fn from_config(config: &RetentionConfig) -> RetentionResult<Self> {
        let policies = config
            .categories
            .iter()
            .map(RetentionPolicy::from_config)
            .collect::<RetentionResult<Vec<_>>>()?;
        Self::new(policies)
    }

    /// Look up the policy for a category.
    pub fn policy(&self, category: &str) -> Option<&Arc<RetentionPolicy>> {
        self.index.get(category).map(|&i| &self.policies[i])
    }

    /// Category names in configuration order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.policies.iter().map(|p| p.category.as_str())
    }

    /// All policies in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RetentionPolicy>> {
        self.policies.iter()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches_any(policy: &RetentionPolicy, name: &str) -> bool {
        policy.file_patterns.iter().any(|p| p.matches(name))
    }

    #[test]
    fn test_registry_lookup() {
        let registry = PolicyRegistry::new(vec![
            RetentionPolicy::new("tts_temp", "/tmp/tts", 60, 100, &["*.wav"]).unwrap(),
            RetentionPolicy::new("logs", "/tmp/logs", 60, 100, &["*.log", "*.txt"]).unwrap(),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.categories().collect::<Vec<_>>(), vec!["tts_temp", "logs"]);

        let logs = registry.policy("logs").unwrap();
        assert_eq!(logs.directory(), Path::new("/tmp/logs"));
        assert!(matches_any(logs, "app.txt"));
        assert!(!matches_any(logs, "app.wav"));

        assert!(registry.policy("cache").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let err = PolicyRegistry::new(vec![
            RetentionPolicy::new("logs", "/a", 0, 0, &["*"]).unwrap(),
            RetentionPolicy::new("logs", "/b", 0, 0, &["*"]).unwrap(),
        ])
        .unwrap_err();
        assert!(matches!(err, RetentionError::DuplicateCategory(name) if name == "logs"));
    }

    #[test]
    fn test_policy_requires_patterns() {
        let err = RetentionPolicy::new("logs", "/a", 0, 0, &[]).unwrap_err();
        assert!(matches!(err, RetentionError::NoPatterns(_)));
    }

    #[test]
    fn test_registry_from_default_config() {
        let config = RetentionConfig::default();
        let registry = PolicyRegistry::from_config(&config).unwrap();

        assert_eq!(
            registry.categories().collect::<Vec<_>>(),
            vec!["tts_temp", "logs", "cache"]
        );

        let tts = registry.policy("tts_temp").unwrap();
        assert_eq!(tts.max_age_secs, 24 * 3600);
        assert_eq!(tts.max_total_bytes, 100 * 1024 * 1024);
        assert_eq!(tts.interval, Duration::from_secs(1800));
        assert_eq!(tts.file_patterns.len(), 3);
        assert!(matches_any(tts, "clip.ogg"));
    }
}
