//! Executes eviction plans.

use std::{fs, io::ErrorKind};

use super::planner::EvictionPlan;

/// Outcome of reclaiming one plan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimOutcome {
    /// Files actually deleted by this call.
    pub removed: usize,
    /// Files whose deletion failed (permissions, busy, ...).
    pub failed: usize,
    /// Files that were already gone when we got to them.
    pub missing: usize,
    /// Bytes freed by the files actually deleted.
    pub bytes_freed: u64,
}

/// Delete every file in the plan, once each.
///
/// A failure on one file never stops the batch. A file removed by someone
/// else in the meantime is not an error and is not counted as removed.
/// With `dry_run` nothing is touched.
pub fn reclaim(plan: &EvictionPlan, category: &str, dry_run: bool) -> ReclaimOutcome {
    let mut outcome = ReclaimOutcome::default();

    for entry in plan.entries() {
        let path = &entry.record.path;

        if dry_run {
            tracing::info!(
                category,
                path = %path.display(),
                size_bytes = entry.record.size_bytes,
                reason = ?entry.reason,
                "DRY RUN: Would remove file"
            );
            continue;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                outcome.removed += 1;
                outcome.bytes_freed += entry.record.size_bytes;
                tracing::debug!(
                    category,
                    path = %path.display(),
                    size_bytes = entry.record.size_bytes,
                    reason = ?entry.reason,
                    "Removed file"
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                outcome.missing += 1;
                tracing::debug!(category, path = %path.display(), "File already removed");
            }
            Err(e) => {
                outcome.failed += 1;
                tracing::warn!(
                    category,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove file"
                );
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::retention::{FileRecord, RetentionPolicy, planner::plan};

    const NOW: i64 = 1_700_000_000;

    /// Plan every record for deletion (max age 0).
    fn plan_all(paths: &[&Path]) -> EvictionPlan {
        let records: Vec<_> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| FileRecord::new(*p, 10, NOW - 100 + i as i64))
            .collect();
        let policy = RetentionPolicy::new("test", "/", 0, u64::MAX, &["*"]).unwrap();
        plan(&records, &policy, NOW)
    }

    #[test]
    fn test_reclaim_removes_files() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.tmp");
        let b = temp.path().join("b.tmp");
        fs::write(&a, b"0123456789").unwrap();
        fs::write(&b, b"0123456789").unwrap();

        let outcome = reclaim(&plan_all(&[&a, &b]), "test", false);

        assert_eq!(outcome.removed, 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.bytes_freed, 20);
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[test]
    fn test_reclaim_tolerates_missing_files() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("present.tmp");
        let vanished = temp.path().join("vanished.tmp");
        fs::write(&present, b"x").unwrap();

        let plan = plan_all(&[&vanished, &present]);
        let outcome = reclaim(&plan, "test", false);

        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.missing, 1);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.removed <= plan.len());

        // A second pass over the same plan finds nothing left to delete
        let again = reclaim(&plan, "test", false);
        assert_eq!(again.removed, 0);
        assert_eq!(again.missing, 2);
    }

    #[test]
    fn test_reclaim_failure_does_not_abort_batch() {
        let temp = TempDir::new().unwrap();
        // remove_file on a directory fails with something other than NotFound
        let dir = temp.path().join("a_dir.tmp");
        fs::create_dir(&dir).unwrap();
        let file = temp.path().join("b_file.tmp");
        fs::write(&file, b"x").unwrap();

        let outcome = reclaim(&plan_all(&[&dir, &file]), "test", false);

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.removed, 1);
        assert!(dir.exists());
        assert!(!file.exists());
    }

    #[test]
    fn test_dry_run_deletes_nothing() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.tmp");
        fs::write(&a, b"x").unwrap();

        let outcome = reclaim(&plan_all(&[&a]), "test", true);

        assert_eq!(outcome, ReclaimOutcome::default());
        assert!(a.exists());
    }

    #[test]
    fn test_empty_plan() {
        let outcome = reclaim(&EvictionPlan::default(), "test", false);
        assert_eq!(outcome.removed, 0);
    }
}
