//! Scheduler module for prioritization, rate limiting and scan cycles.
//!
//! This module provides:
//! - **Priority calculation**: weighted issue scores, repository health and
//!   the refactor-eligibility thresholds.
//! - **Rate limiting**: moving-window quotas per collaborator service, shared
//!   by every component that calls out.
//! - **Scan cycle**: the periodic sweep that enqueues repositories and drains
//!   the job queue one job at a time.
//!
//! # Example
//!
//! ```ignore
//! use silent_refactor::scheduler::run_scan_cycle;
//!
//! let report = run_scan_cycle(&queue).await?;
//! println!("{} completed, {} requeued", report.completed, report.requeued);
//! ```

pub mod cycle;
pub mod priority;
pub mod rate_limit;

pub use cycle::{CycleReport, run_scan_cycle, run_worker};
pub use priority::{
    MAX_REPOSITORY_SCORE, REPOSITORY_PENALTY_PER_POINT, RefactorThresholds, file_score, needs_refactor, prioritize,
    repository_score, score, summarize,
};
pub use rate_limit::{ANALYSIS_SERVICE, CODEHOST_SERVICE, Quota, RateLimitConfig, RateLimiter};
