//! Eviction planning.
//!
//! Two rules decide which files go:
//!
//! 1. **Age**: every file last modified before `now - max_age_secs`.
//! 2. **Size**: when the distinct matched files add up to more than
//!    `max_total_bytes`, files are taken oldest-first (ties by path) until
//!    the remainder fits. Files already taken by the age rule still count
//!    towards the space freed.
//!
//! Planning is pure: the same records, policy and clock always give the same plan.

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

use serde::Serialize;

use super::{policy::RetentionPolicy, scanner::FileRecord};

/// Why a file was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Older than the policy's maximum age.
    Age,
    /// Removed to bring the directory under its size ceiling.
    Size,
}

/// A file selected for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEviction {
    pub record: FileRecord,
    pub reason: EvictionReason,
}

/// Deduplicated set of files to delete in one pass, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    entries: Vec<PlannedEviction>,
    /// Combined size of distinct matched files before eviction.
    total_bytes: u64,
    /// Number of distinct matched files.
    distinct_files: usize,
}

impl EvictionPlan {
    pub fn entries(&self) -> &[PlannedEviction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combined size of the distinct matched files this plan was built from.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of distinct matched files this plan was built from.
    pub fn distinct_files(&self) -> usize {
        self.distinct_files
    }

    /// Bytes the plan would free if every deletion succeeded.
    pub fn planned_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.record.size_bytes).sum()
    }

    /// Number of entries selected for the given reason.
    pub fn count(&self, reason: EvictionReason) -> usize {
        self.entries.iter().filter(|e| e.reason == reason).count()
    }

    /// Keep only the `max` oldest entries. 0 means unlimited.
    pub fn truncate(&mut self, max: usize) {
        if max > 0 {
            self.entries.truncate(max);
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.iter().map(|e| &e.record.path)
    }
}

/// Compute which files to delete.
///
/// `now` is the current time in unix seconds.
pub fn plan(records: &[FileRecord], policy: &RetentionPolicy, now: i64) -> EvictionPlan {
    // Distinct by path; the first occurrence wins
    let mut distinct: BTreeMap<&PathBuf, &FileRecord> = BTreeMap::new();
    for record in records {
        distinct.entry(&record.path).or_insert(record);
    }

    let mut ordered: Vec<&FileRecord> = distinct.into_values().collect();
    ordered.sort_by(|a, b| {
        a.modified_at
            .cmp(&b.modified_at)
            .then_with(|| a.path.cmp(&b.path))
    });

    let total_bytes: u64 = ordered.iter().map(|r| r.size_bytes).sum();
    let mut selected: HashMap<&PathBuf, EvictionReason> = HashMap::new();

    let max_age = i64::try_from(policy.max_age_secs).unwrap_or(i64::MAX);
    let cutoff = now.saturating_sub(max_age);
    for record in &ordered {
        if record.modified_at < cutoff {
            selected.insert(&record.path, EvictionReason::Age);
        }
    }

    if total_bytes > policy.max_total_bytes {
        let mut remaining = total_bytes;
        for record in &ordered {
            if remaining <= policy.max_total_bytes {
                break;
            }
            selected.entry(&record.path).or_insert(EvictionReason::Size);
            remaining = remaining.saturating_sub(record.size_bytes);
        }
    }

    let entries = ordered
        .iter()
        .filter_map(|record| {
            selected.get(&record.path).map(|&reason| PlannedEviction {
                record: (*record).clone(),
                reason,
            })
        })
        .collect();

    EvictionPlan {
        entries,
        total_bytes,
        distinct_files: ordered.len(),
    }
}
