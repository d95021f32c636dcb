//! Job queue - claims refactoring jobs, runs scans and opens pull requests
//!
//! - `JobQueue`: create, de-duplicate and process jobs
//! - `ErrorHandler`: recoverable vs fatal classification of failures
//! - `PullRequestCreator`: per-file branch, commit and pull request
//! - `recover_stale_claims`: release claims abandoned by a crashed worker

pub mod error_handler;
pub mod job_queue;
pub mod recovery;
pub mod refactor;

pub use error_handler::{ErrorHandler, FailureClass, classify};
pub use job_queue::{DEFAULT_BRANCH_PREFIX, JobQueue, JobQueueConfig, create_job, enqueue_if_idle};
pub use recovery::{DEFAULT_CLAIM_LEASE, RecoveryStats, recover_stale_claims};
pub use refactor::{PullRequestCreator, RefactorOutcome};
