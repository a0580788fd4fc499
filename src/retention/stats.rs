//! Occupancy snapshot of managed directories.
//!
//! Stats walk each directory recursively and count every regular file,
//! regardless of the policy's patterns. Symlinks to regular files are
//! counted at their target's size, matching what the scanner sees; linked
//! directories are not descended into. They are for observability only and
//! never feed eviction decisions.

use std::{collections::BTreeMap, fs, path::PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::policy::{PolicyRegistry, RetentionPolicy};

/// Snapshot returned by [`RetentionEngine::stats`](super::RetentionEngine::stats).
#[derive(Debug, Clone, Serialize)]
pub struct RetentionStats {
    /// Whether the scheduling loop is running.
    pub running: bool,
    /// Per-category occupancy, keyed by category name.
    pub categories: BTreeMap<String, DirectoryStats>,
}

/// Occupancy of one managed directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryStats {
    pub path: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size_bytes: Option<u64>,
    /// Total size in MiB, rounded to two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,
    /// Why the directory could not be measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DirectoryStats {
    fn missing(path: PathBuf) -> Self {
        Self {
            path,
            exists: false,
            total_size_bytes: None,
            total_size_mb: None,
            file_count: None,
            max_size_bytes: None,
            max_age_secs: None,
            error: None,
        }
    }

    pub(crate) fn failed(path: PathBuf, error: String) -> Self {
        Self {
            exists: true,
            error: Some(error),
            ..Self::missing(path)
        }
    }
}

/// Measure every directory in the registry.
pub fn collect(registry: &PolicyRegistry, running: bool) -> RetentionStats {
    let categories = registry
        .iter()
        .map(|policy| (policy.category.clone(), directory_stats(policy)))
        .collect();

    RetentionStats {
        running,
        categories,
    }
}

/// Measure one policy's directory.
pub fn directory_stats(policy: &RetentionPolicy) -> DirectoryStats {
    let path = policy.directory.clone();
    if !path.exists() {
        return DirectoryStats::missing(path);
    }

    let mut total_size_bytes = 0u64;
    let mut file_count = 0u64;

    for entry in WalkDir::new(&path).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    category = %policy.category,
                    path = %path.display(),
                    error = %e,
                    "Failed to read directory for stats"
                );
                return DirectoryStats::failed(path, e.to_string());
            }
        };

        let file_type = entry.file_type();
        let metadata = if file_type.is_file() {
            entry.metadata().map_err(|e| e.to_string())
        } else if file_type.is_symlink() {
            // Links to regular files count like the scanner sees them;
            // directory and dangling links are skipped
            match fs::metadata(entry.path()) {
                Ok(metadata) if metadata.is_file() => Ok(metadata),
                _ => continue,
            }
        } else {
            continue;
        };

        match metadata {
            Ok(metadata) => {
                total_size_bytes += metadata.len();
                file_count += 1;
            }
            Err(e) => {
                return DirectoryStats::failed(path, e);
            }
        }
    }

    crate::observability::metrics::record_directory_usage(
        &policy.category,
        total_size_bytes,
        file_count,
    );

    DirectoryStats {
        path,
        exists: true,
        total_size_bytes: Some(total_size_bytes),
        total_size_mb: Some(bytes_to_mb(total_size_bytes)),
        file_count: Some(file_count),
        max_size_bytes: Some(policy.max_total_bytes),
        max_age_secs: Some(policy.max_age_secs),
        error: None,
    }
}

fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn policy_for(name: &str, dir: impl Into<PathBuf>) -> RetentionPolicy {
        RetentionPolicy::new(name, dir, 3600, 1024, &["*.wav"]).unwrap()
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();
        let stats = directory_stats(&policy_for("audio", temp.path()));

        assert!(stats.exists);
        assert_eq!(stats.file_count, Some(0));
        assert_eq!(stats.total_size_bytes, Some(0));
        assert_eq!(stats.total_size_mb, Some(0.0));
        assert_eq!(stats.max_size_bytes, Some(1024));
        assert_eq!(stats.max_age_secs, Some(3600));
        assert!(stats.error.is_none());
    }

    #[test]
    fn test_counts_all_files_recursively() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.wav"), vec![0u8; 100]).unwrap();
        // Not matched by the policy pattern, still counted
        fs::write(temp.path().join("notes.txt"), vec![0u8; 50]).unwrap();
        fs::create_dir_all(temp.path().join("nested/deeper")).unwrap();
        fs::write(temp.path().join("nested/deeper/b.bin"), vec![0u8; 25]).unwrap();

        let stats = directory_stats(&policy_for("audio", temp.path()));

        assert_eq!(stats.file_count, Some(3));
        assert_eq!(stats.total_size_bytes, Some(175));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_counted_like_scanner() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("target.wav");
        fs::write(&target, vec![0u8; 40]).unwrap();
        fs::write(temp.path().join("local.wav"), vec![0u8; 10]).unwrap();
        std::os::unix::fs::symlink(&target, temp.path().join("link.wav")).unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("dirlink")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone"), temp.path().join("dangling.wav"))
            .unwrap();

        let policy = policy_for("audio", temp.path());
        let stats = directory_stats(&policy);
        let scanned = crate::retention::scan(temp.path(), &policy.file_patterns).unwrap();

        assert_eq!(stats.file_count, Some(2));
        assert_eq!(stats.total_size_bytes, Some(50));
        assert_eq!(
            stats.total_size_bytes,
            Some(scanned.iter().map(|r| r.size_bytes).sum())
        );
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let stats = directory_stats(&policy_for("audio", &missing));

        assert_eq!(stats, DirectoryStats::missing(missing));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["exists"], false);
        assert!(json.get("file_count").is_none());
    }

    #[test]
    fn test_size_in_mb_rounded() {
        assert_eq!(bytes_to_mb(0), 0.0);
        assert_eq!(bytes_to_mb(1024 * 1024), 1.0);
        assert_eq!(bytes_to_mb(1024 * 1024 + 1024 * 1024 / 3), 1.33);
    }

    #[test]
    fn test_collect_covers_every_category() {
        let temp = TempDir::new().unwrap();
        let registry = PolicyRegistry::new(vec![
            policy_for("present", temp.path()),
            policy_for("absent", temp.path().join("absent")),
        ])
        .unwrap();

        let stats = collect(&registry, true);

        assert!(stats.running);
        assert_eq!(stats.categories.len(), 2);
        assert!(stats.categories["present"].exists);
        assert!(!stats.categories["absent"].exists);
    }
}
