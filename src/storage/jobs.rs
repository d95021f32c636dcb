//! Job-specific storage helpers.

use std::collections::HashSet;

use super::traits::{Filter, HasId, Storage};
use crate::domain::job::{JobStatus, RefactoringJob};
use crate::error::{RefactorError, Result};

/// Collection name for jobs.
pub const JOBS_COLLECTION: &str = "jobs";

impl HasId for RefactoringJob {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Helper for job-specific queries and guarded transitions.
pub struct JobStore<'a, S: Storage> {
    storage: &'a S,
}

impl<'a, S: Storage> JobStore<'a, S> {
    /// Create a new JobStore wrapping the given storage.
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// Insert a new job.
    pub fn create(&self, job: &RefactoringJob) -> Result<()> {
        self.storage.create(JOBS_COLLECTION, job)
    }

    /// Get a job by ID.
    pub fn get(&self, id: &str) -> Result<Option<RefactoringJob>> {
        self.storage.get(JOBS_COLLECTION, id)
    }

    /// List all jobs, oldest first.
    pub fn list_all(&self) -> Result<Vec<RefactoringJob>> {
        let mut jobs: Vec<RefactoringJob> = self.storage.list(JOBS_COLLECTION)?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    /// Find all jobs with a specific status, oldest first.
    pub fn find_by_status(&self, status: JobStatus) -> Result<Vec<RefactoringJob>> {
        let mut jobs: Vec<RefactoringJob> = self
            .storage
            .query(JOBS_COLLECTION, &[Filter::eq("status", status)])?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    /// Jobs of a repository that are PENDING or IN_PROGRESS.
    pub fn find_active_for_repository(&self, repository_id: &str) -> Result<Vec<RefactoringJob>> {
        let jobs: Vec<RefactoringJob> = self
            .storage
            .query(JOBS_COLLECTION, &[Filter::eq("repository_id", repository_id)])?;
        Ok(jobs.into_iter().filter(|j| j.status.is_active()).collect())
    }

    /// Persist a transition made on `job`.
    ///
    /// Succeeds only if the stored record is still at `expected_revision`, so a
    /// transition can never silently overwrite another worker's.
    pub fn save_transition(&self, job: &RefactoringJob, expected_revision: u64) -> Result<()> {
        if !self.try_save_transition(job, expected_revision)? {
            return Err(RefactorError::InvalidState(format!(
                "job {} was modified concurrently (expected revision {})",
                job.id, expected_revision
            )));
        }
        Ok(())
    }

    /// As `save_transition`, returning false instead of an error on a lost race.
    pub fn try_save_transition(&self, job: &RefactoringJob, expected_revision: u64) -> Result<bool> {
        self.storage.update_if(
            JOBS_COLLECTION,
            &job.id,
            &[Filter::eq("revision", expected_revision)],
            job,
        )
    }

    /// IN_PROGRESS jobs whose claim is at least `lease_ms` old at `now`.
    pub fn find_expired_claims(&self, now: u64, lease_ms: u64) -> Result<Vec<RefactoringJob>> {
        Ok(self
            .find_by_status(JobStatus::InProgress)?
            .into_iter()
            .filter(|j| j.claim_expired(now, lease_ms))
            .collect())
    }

    /// Atomically select and claim the oldest startable PENDING job.
    ///
    /// Jobs in `exclude` are skipped. A claim is refused while another job of
    /// the same repository is IN_PROGRESS; that check and the write share one
    /// storage lock. A candidate lost to another worker is passed over.
    pub fn claim_next(&self, exclude: &HashSet<String>) -> Result<Option<RefactoringJob>> {
        let candidates = self.find_by_status(JobStatus::Pending)?;

        for candidate in candidates {
            if !candidate.can_start() || exclude.contains(&candidate.id) {
                continue;
            }

            let mut claimed = candidate.clone();
            claimed.start()?;

            let swapped = self.storage.claim_if(
                JOBS_COLLECTION,
                &candidate.id,
                &[
                    Filter::eq("status", JobStatus::Pending),
                    Filter::eq("revision", candidate.revision),
                ],
                &[
                    Filter::eq("repository_id", &candidate.repository_id),
                    Filter::eq("status", JobStatus::InProgress),
                ],
                &claimed,
            )?;

            if swapped {
                return Ok(Some(claimed));
            }
            tracing::debug!(
                job_id = %candidate.id,
                repository_id = %candidate.repository_id,
                "Job taken or repository busy, trying next job"
            );
        }

        Ok(None)
    }
}
