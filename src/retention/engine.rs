//! Retention engine: scheduled and on-demand sweeps of managed directories.
//!
//! The engine is an explicitly constructed handle owned by the host process
//! and cloned into whatever needs to trigger or query it. It drives one
//! background loop which wakes every tick, asks the [`Schedule`] which
//! cadences are due and runs the corresponding passes. Every pass does its
//! filesystem work on the blocking pool so the loop (and any async caller)
//! only awaits the result.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{sync::Mutex as AsyncMutex, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use super::{
    error::{RetentionError, RetentionResult},
    planner::{self, EvictionReason},
    policy::{PolicyRegistry, RetentionPolicy},
    reclaimer, scanner,
    schedule::{CadenceTarget, Schedule},
    stats::{self, DirectoryStats, RetentionStats},
};
use crate::{config::RetentionConfig, observability::metrics};

/// Scheduling and safety knobs for a [`RetentionEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How often the loop looks for due cadences.
    pub tick: Duration,
    /// Cadence of the aggregate pass over every category.
    pub full_pass_interval: Duration,
    /// Run a full pass as soon as the loop starts.
    pub run_on_start: bool,
    /// Log deletions instead of performing them.
    pub dry_run: bool,
    /// Per-category cap on deletions in one pass. 0 means unlimited.
    pub max_deletes_per_run: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            full_pass_interval: Duration::from_secs(3600),
            run_on_start: true,
            dry_run: false,
            max_deletes_per_run: 0,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            tick: config.tick(),
            full_pass_interval: config.full_pass_interval(),
            run_on_start: config.run_on_start,
            dry_run: config.safety.dry_run,
            max_deletes_per_run: config.safety.max_deletes_per_run,
        }
    }
}

/// Results from a single pass over one category.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub category: String,
    /// Distinct files matched by the category's patterns.
    pub files_scanned: usize,
    /// Files selected for deletion.
    pub files_planned: usize,
    /// Files selected because of their age.
    pub planned_by_age: usize,
    /// Files selected to relieve size pressure.
    pub planned_by_size: usize,
    /// Bytes the plan would free if every deletion succeeded.
    pub bytes_planned: u64,
    /// Files actually deleted.
    pub removed: usize,
    /// Deletions that failed.
    pub failed: usize,
    /// Planned files already gone when their turn came.
    pub missing: usize,
    /// Bytes freed by the files actually deleted.
    pub bytes_freed: u64,
    /// Wall-clock duration of the pass.
    pub duration_ms: u64,
    pub dry_run: bool,
    /// Set when the pass could not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PassReport {
    fn failed(category: &str, error: String) -> Self {
        Self {
            category: category.to_string(),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Check if any files were deleted.
    pub fn has_deletions(&self) -> bool {
        self.removed > 0
    }
}

/// Results from a pass over every category.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunAllReport {
    pub categories: BTreeMap<String, PassReport>,
}

impl RunAllReport {
    /// Removed-file count per category.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.categories
            .iter()
            .map(|(name, report)| (name.clone(), report.removed))
            .collect()
    }

    /// Total number of files deleted across all categories.
    pub fn total_removed(&self) -> usize {
        self.categories.values().map(|r| r.removed).sum()
    }

    /// Total bytes freed across all categories.
    pub fn total_bytes_freed(&self) -> u64 {
        self.categories.values().map(|r| r.bytes_freed).sum()
    }

    /// Check if any files were deleted.
    pub fn has_deletions(&self) -> bool {
        self.total_removed() > 0
    }
}

/// Handle on the scheduling loop.
struct LoopHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct EngineInner {
    registry: PolicyRegistry,
    options: EngineOptions,
    /// Whether the scheduling loop should keep going.
    running: AtomicBool,
    /// Loops started and not yet reaped, newest last. A stopped loop stays
    /// here until it exits so shutdown can wait for its in-flight pass.
    /// The lock also serializes start/stop.
    loops: Mutex<Vec<LoopHandle>>,
    /// One lock per category so passes over the same directory never overlap.
    category_locks: HashMap<String, Arc<AsyncMutex<()>>>,
    /// Number of passes finished since construction.
    passes_completed: AtomicU64,
}

/// Disk retention engine.
///
/// Cloning is cheap and every clone controls the same engine.
#[derive(Clone)]
pub struct RetentionEngine {
    inner: Arc<EngineInner>,
}

impl RetentionEngine {
    /// Create an engine over a fixed set of policies.
    pub fn new(registry: PolicyRegistry, options: EngineOptions) -> Self {
        let category_locks = registry
            .categories()
            .map(|name| (name.to_string(), Arc::new(AsyncMutex::new(()))))
            .collect();

        Self {
            inner: Arc::new(EngineInner {
                registry,
                options,
                running: AtomicBool::new(false),
                loops: Mutex::new(Vec::new()),
                category_locks,
                passes_completed: AtomicU64::new(0),
            }),
        }
    }

    /// Build an engine from the `[retention]` configuration section.
    pub fn from_config(config: &RetentionConfig) -> RetentionResult<Self> {
        let registry = PolicyRegistry::from_config(config)?;
        Ok(Self::new(registry, EngineOptions::from_config(config)))
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.inner.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Whether the scheduling loop is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Number of passes finished since the engine was created.
    pub fn passes_completed(&self) -> u64 {
        self.inner.passes_completed.load(Ordering::Relaxed)
    }

    /// Start the scheduling loop.
    ///
    /// Must be called from within a Tokio runtime. Returns `false` (and
    /// does nothing) when the loop is already running.
    pub fn start(&self) -> bool {
        let mut loops = self.inner.loops.lock();

        if self.inner.running.swap(true, Ordering::AcqRel) {
            tracing::warn!("Retention engine already running");
            return false;
        }

        let token = CancellationToken::new();
        let engine = self.clone();
        let loop_token = token.clone();
        let task = tokio::spawn(async move { engine.run_loop(loop_token).await });

        loops.retain(|l| !l.task.is_finished());
        loops.push(LoopHandle { token, task });

        tracing::info!(
            categories = self.inner.registry.len(),
            tick_secs = self.inner.options.tick.as_secs(),
            full_pass_interval_secs = self.inner.options.full_pass_interval.as_secs(),
            dry_run = self.inner.options.dry_run,
            "Starting retention engine"
        );
        true
    }

    /// Stop the scheduling loop.
    ///
    /// A pass that is already executing runs to completion; no further
    /// passes are scheduled. Returns `false` when the loop was not running.
    pub fn stop(&self) -> bool {
        let loops = self.inner.loops.lock();

        if !self.inner.running.swap(false, Ordering::AcqRel) {
            tracing::debug!("Retention engine not running, nothing to stop");
            return false;
        }

        for handle in loops.iter() {
            handle.token.cancel();
        }

        tracing::info!("Retention engine stopped");
        true
    }

    /// Stop the loop and wait for every loop this engine started to exit,
    /// including passes still in flight from a loop stopped earlier.
    pub async fn shutdown(&self) {
        self.stop();

        let loops = std::mem::take(&mut *self.inner.loops.lock());
        for handle in loops {
            handle.token.cancel();
            if let Err(e) = handle.task.await {
                tracing::error!(error = %e, "Retention loop terminated abnormally");
            }
        }
    }

    /// Run one pass over a single category, independent of the loop.
    ///
    /// Only an unknown category is reported as an error; failures inside
    /// the pass are logged and reflected in the report.
    pub async fn run_category(&self, category: &str) -> RetentionResult<PassReport> {
        let policy = self
            .inner
            .registry
            .policy(category)
            .cloned()
            .ok_or_else(|| RetentionError::UnknownCategory(category.to_string()))?;

        Ok(self.run_pass(policy).await)
    }

    /// Run one pass over every category, in configuration order.
    pub async fn run_all(&self) -> RunAllReport {
        let mut report = RunAllReport::default();

        for policy in self.inner.registry.iter() {
            let pass = self.run_pass(Arc::clone(policy)).await;
            report.categories.insert(policy.category.clone(), pass);
        }

        if report.has_deletions() {
            tracing::info!(
                total_removed = report.total_removed(),
                bytes_freed = report.total_bytes_freed(),
                "Retention run complete"
            );
        } else {
            tracing::debug!("Retention run complete, no files to delete");
        }

        report
    }

    /// Occupancy snapshot of every managed directory.
    pub async fn stats(&self) -> RetentionStats {
        let registry = self.inner.registry.clone();
        let running = self.is_running();

        match tokio::task::spawn_blocking(move || stats::collect(&registry, running)).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Stats collection failed");
                let message = RetentionError::Worker(e.to_string()).to_string();
                let categories = self
                    .inner
                    .registry
                    .iter()
                    .map(|policy| {
                        let dir_stats = DirectoryStats::failed(policy.directory.clone(), message.clone());
                        (policy.category.clone(), dir_stats)
                    })
                    .collect();
                RetentionStats {
                    running,
                    categories,
                }
            }
        }
    }

    async fn run_loop(self, token: CancellationToken) {
        let options = self.inner.options.clone();
        let mut schedule = Schedule::new(
            self.inner
                .registry
                .iter()
                .map(|p| (p.category.clone(), p.interval)),
            options.full_pass_interval,
            Instant::now(),
        );

        if options.run_on_start {
            self.run_all().await;
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(options.tick) => {}
            }

            for target in schedule.due(Instant::now()) {
                if token.is_cancelled() {
                    break;
                }
                match target {
                    CadenceTarget::Category(name) => {
                        if let Err(e) = self.run_category(&name).await {
                            tracing::error!(category = %name, error = %e, "Scheduled pass failed");
                        }
                    }
                    CadenceTarget::All => {
                        self.run_all().await;
                    }
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        tracing::debug!("Retention loop exited");
    }

    /// Scan, plan and reclaim one category on the blocking pool.
    async fn run_pass(&self, policy: Arc<RetentionPolicy>) -> PassReport {
        let started = std::time::Instant::now();
        let category = policy.category.clone();
        let dry_run = self.inner.options.dry_run;
        let max_deletes = self.inner.options.max_deletes_per_run;

        // Held inside the blocking task, so the category stays locked even
        // if the caller stops waiting.
        let guard = match self.inner.category_locks.get(&category) {
            Some(lock) => Some(Arc::clone(lock).lock_owned().await),
            None => None,
        };

        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            execute_pass(&policy, dry_run, max_deletes)
        })
        .await;

        let mut report = match result {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!(category = %category, error = %e, "Retention pass failed");
                PassReport::failed(&category, e.to_string())
            }
            Err(e) => {
                let e = RetentionError::Worker(e.to_string());
                tracing::error!(category = %category, error = %e, "Retention pass failed");
                PassReport::failed(&category, e.to_string())
            }
        };
        report.dry_run = dry_run;
        report.duration_ms = started.elapsed().as_millis() as u64;

        if report.error.is_some() {
            metrics::record_retention_error(&category);
        } else {
            metrics::record_retention_pass(
                &category,
                report.removed as u64,
                report.bytes_freed,
                started.elapsed().as_secs_f64(),
            );
        }

        if report.has_deletions() {
            tracing::info!(
                category = %category,
                removed = report.removed,
                failed = report.failed,
                bytes_freed = report.bytes_freed,
                duration_ms = report.duration_ms,
                "Cleaned category"
            );
        } else {
            tracing::debug!(
                category = %category,
                scanned = report.files_scanned,
                planned = report.files_planned,
                dry_run,
                "Category pass complete, nothing removed"
            );
        }

        self.inner.passes_completed.fetch_add(1, Ordering::Relaxed);
        report
    }
}

impl std::fmt::Debug for RetentionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionEngine")
            .field("categories", &self.inner.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}

/// The synchronous body of a pass.
fn execute_pass(
    policy: &RetentionPolicy,
    dry_run: bool,
    max_deletes: u64,
) -> RetentionResult<PassReport> {
    let now = Utc::now().timestamp();
    let records = scanner::scan(&policy.directory, &policy.file_patterns)?;
    let mut plan = planner::plan(&records, policy, now);

    if records.len() != plan.distinct_files() {
        tracing::debug!(
            category = %policy.category,
            raw = records.len(),
            distinct = plan.distinct_files(),
            "Files matched by more than one pattern are counted once"
        );
    }

    let max_deletes = usize::try_from(max_deletes).unwrap_or(usize::MAX);
    if max_deletes > 0 && plan.len() > max_deletes {
        tracing::warn!(
            category = %policy.category,
            planned = plan.len(),
            max_deletes,
            "Eviction plan exceeds max_deletes_per_run, deferring the newest files"
        );
        plan.truncate(max_deletes);
    }

    let outcome = reclaimer::reclaim(&plan, &policy.category, dry_run);

    Ok(PassReport {
        category: policy.category.clone(),
        files_scanned: plan.distinct_files(),
        files_planned: plan.len(),
        planned_by_age: plan.count(EvictionReason::Age),
        planned_by_size: plan.count(EvictionReason::Size),
        bytes_planned: plan.planned_bytes(),
        removed: outcome.removed,
        failed: outcome.failed,
        missing: outcome.missing,
        bytes_freed: outcome.bytes_freed,
        duration_ms: 0,
        dry_run,
        error: None,
    })
}
