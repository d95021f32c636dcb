//! Refactoring job record and its state machine
//!
//! A job is one unit of scan-and-refactor work for a repository:
//!
//! ```text
//! PENDING --(start, attempts < max_attempts)--> IN_PROGRESS
//! IN_PROGRESS --(complete)--> COMPLETED                          [terminal]
//! IN_PROGRESS --(recoverable failure)--> PENDING (attempts += 1)
//! IN_PROGRESS --(attempts + 1 >= max_attempts, or fatal)--> FAILED [terminal]
//! ```
//!
//! Every transition goes through a method on `RefactoringJob`; terminal jobs
//! reject all of them.

use crate::error::{RefactorError, Result};
use crate::id::{generate_job_id, now_ms};
use serde::{Deserialize, Serialize};

/// Default number of attempts before a job is failed for good.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Status of a refactoring job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting to be claimed
    Pending,
    /// Claimed by a worker
    InProgress,
    /// Scan and PR creation succeeded
    Completed,
    /// Attempts exhausted or fatal error
    Failed,
}

impl JobStatus {
    /// Returns true if the job can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Returns true if the job is queued or being worked on
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = RefactorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "IN_PROGRESS" => Ok(JobStatus::InProgress),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(RefactorError::InvalidState(format!("unknown job status: {}", other))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of scan-and-refactor work scoped to one repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactoringJob {
    //=== Identity ===
    pub id: String,

    /// Owning repository
    pub repository_id: String,

    //=== State ===
    pub status: JobStatus,

    /// Number of failed attempts so far
    pub attempts: u32,

    pub max_attempts: u32,

    /// Message of the last failure
    pub error: Option<String>,

    /// Structured result, e.g. created PR URLs
    pub metadata: Option<serde_json::Value>,

    /// Bumped on every persisted transition; used for compare-and-swap claims
    pub revision: u64,

    /// When the current or last claim was taken, in ms
    #[serde(default)]
    pub claimed_at: Option<u64>,

    //=== Timestamps ===
    pub created_at: u64,
    pub updated_at: u64,
}

impl RefactoringJob {
    /// Create a new PENDING job for a repository
    pub fn new(repository_id: &str) -> Self {
        Self::with_max_attempts(repository_id, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(repository_id: &str, max_attempts: u32) -> Self {
        let now = now_ms();
        Self {
            id: generate_job_id(),
            repository_id: repository_id.to_string(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            error: None,
            metadata: None,
            revision: 0,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True if a worker may claim this job
    pub fn can_start(&self) -> bool {
        self.status == JobStatus::Pending && self.attempts < self.max_attempts
    }

    /// PENDING -> IN_PROGRESS
    pub fn start(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        if !self.can_start() {
            return Err(RefactorError::InvalidState(format!(
                "job {} cannot start from {} with {}/{} attempts",
                self.id, self.status, self.attempts, self.max_attempts
            )));
        }
        self.transition(JobStatus::InProgress);
        self.claimed_at = Some(self.updated_at);
        Ok(())
    }

    /// True if this job has been IN_PROGRESS for at least `lease_ms` as of `now`.
    pub fn claim_expired(&self, now: u64, lease_ms: u64) -> bool {
        self.status == JobStatus::InProgress
            && now.saturating_sub(self.claimed_at.unwrap_or(self.updated_at)) >= lease_ms
    }

    /// IN_PROGRESS -> COMPLETED
    pub fn complete(&mut self, metadata: serde_json::Value) -> Result<()> {
        self.ensure_in_progress("complete")?;
        self.metadata = Some(metadata);
        self.error = None;
        self.transition(JobStatus::Completed);
        Ok(())
    }

    /// IN_PROGRESS -> PENDING, or FAILED once attempts are exhausted.
    ///
    /// Returns the resulting status.
    pub fn fail_recoverable(&mut self, message: &str) -> Result<JobStatus> {
        self.ensure_in_progress("requeue")?;
        self.attempts += 1;
        self.error = Some(message.to_string());
        let next = if self.attempts >= self.max_attempts {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        self.transition(next);
        Ok(next)
    }

    /// IN_PROGRESS -> FAILED
    pub fn fail_fatal(&mut self, message: &str) -> Result<()> {
        self.ensure_in_progress("fail")?;
        self.attempts += 1;
        self.error = Some(message.to_string());
        self.transition(JobStatus::Failed);
        Ok(())
    }

    /// PR URLs recorded in the metadata of a completed job
    pub fn pr_urls(&self) -> Vec<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("pr_urls"))
            .and_then(|v| v.as_array())
            .map(|urls| urls.iter().filter_map(|u| u.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(RefactorError::InvalidState(format!(
                "job {} is {} and cannot change",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn ensure_in_progress(&self, action: &str) -> Result<()> {
        self.ensure_mutable()?;
        if self.status != JobStatus::InProgress {
            return Err(RefactorError::InvalidState(format!(
                "cannot {} job {} in status {}",
                action, self.id, self.status
            )));
        }
        Ok(())
    }

    fn transition(&mut self, status: JobStatus) {
        self.status = status;
        self.revision += 1;
        self.updated_at = now_ms();
    }
}
