//! Disk retention: keeps managed directories within age and size limits.
//!
//! Each category names a directory, the file patterns it owns, a maximum
//! file age and a size ceiling. A pass over a category:
//! 1. Scans the directory (non-recursively) for files matching its patterns
//! 2. Plans evictions: files past the age limit, then the oldest files until
//!    the remainder fits under the size ceiling
//! 3. Deletes the planned files, tolerating files that vanish meanwhile
//!
//! [`RetentionEngine`] runs passes on per-category cadences plus a periodic
//! pass over everything, and on demand. All filesystem work happens on the
//! blocking thread pool.

mod engine;
mod error;
mod pattern;
pub(crate) mod planner;
mod policy;
mod reclaimer;
mod scanner;
mod schedule;
mod stats;

pub use engine::{EngineOptions, PassReport, RetentionEngine, RunAllReport};
pub use error::{RetentionError, RetentionResult};
pub use pattern::FilePattern;
pub use planner::{EvictionPlan, EvictionReason, PlannedEviction, plan};
pub use policy::{PolicyRegistry, RetentionPolicy};
pub use reclaimer::{ReclaimOutcome, reclaim};
pub use scanner::{FileRecord, scan};
pub use schedule::{CadenceTarget, Schedule};
pub use stats::{DirectoryStats, RetentionStats};
