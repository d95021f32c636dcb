//! Recovery of claims abandoned by a crashed worker
//!
//! A job left IN_PROGRESS past its lease is treated as a failed attempt: it
//! goes back to PENDING, or to FAILED once its attempts are spent. A
//! repository left `scanning` with no job in progress is marked `error` so the
//! sweep picks it up again.

use std::time::Duration;

use crate::domain::{EventRecord, JobStatus, RepositoryStatus};
use crate::error::Result;
use crate::id::now_ms;
use crate::storage::{EventStore, JobStore, RepositoryStore, Storage};

/// Default time a claim may stay IN_PROGRESS before it is presumed abandoned.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(3600);

/// Statistics about one recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Expired claims sent back to PENDING
    pub requeued: usize,
    /// Expired claims that had no attempts left
    pub failed: usize,
    /// Repositories moved out of a stuck `scanning` status
    pub repositories_reset: usize,
}

impl RecoveryStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Release every claim older than `lease` and unstick orphaned repositories.
///
/// Each job is saved with a compare-and-swap on the revision it was read at,
/// so a worker that finishes in the meantime wins.
pub fn recover_stale_claims<S: Storage>(storage: &S, lease: Duration) -> Result<RecoveryStats> {
    let jobs = JobStore::new(storage);
    let events = EventStore::new(storage);
    let mut stats = RecoveryStats::default();

    let now = now_ms();
    for mut job in jobs.find_expired_claims(now, lease.as_millis() as u64)? {
        let expected = job.revision;
        let message = format!("claim expired after {}s without finishing", lease.as_secs());
        let status = job.fail_recoverable(&message)?;

        if !jobs.try_save_transition(&job, expected)? {
            tracing::debug!(job_id = %job.id, "Expired claim changed concurrently, leaving it");
            continue;
        }

        tracing::warn!(
            job_id = %job.id,
            repository_id = %job.repository_id,
            attempts = job.attempts,
            status = %status,
            "Recovered expired claim"
        );
        if let Err(e) = events.append(&EventRecord::error(&job.repository_id, &job.id, &message)) {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to record error event");
        }

        match status {
            JobStatus::Failed => stats.failed += 1,
            _ => stats.requeued += 1,
        }
    }

    let repositories = RepositoryStore::new(storage);
    let in_progress = jobs.find_by_status(JobStatus::InProgress)?;
    for mut repository in repositories.find_by_status(RepositoryStatus::Scanning)? {
        if in_progress.iter().any(|j| j.repository_id == repository.id) {
            continue;
        }
        repository.mark_error();
        repositories.update(&repository)?;
        tracing::warn!(repository = %repository.full_name(), "Reset repository left scanning");
        stats.repositories_reset += 1;
    }

    if !stats.is_empty() {
        tracing::info!(
            requeued = stats.requeued,
            failed = stats.failed,
            repositories_reset = stats.repositories_reset,
            "Recovery finished"
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::domain::{RefactoringJob, Repository, event_types};
    use crate::storage::JsonlStorage;
    use tempfile::TempDir;

    fn setup() -> (TempDir, JsonlStorage, Repository) {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonlStorage::new(temp_dir.path()).unwrap();
        let repository = Repository::from_url("https://github.com/acme/widgets").unwrap();
        RepositoryStore::new(&storage).create(&repository).unwrap();
        (temp_dir, storage, repository)
    }

    /// Leave a job claimed and its repository scanning, as a crashed worker would.
    fn abandon_claim(storage: &JsonlStorage, repository: &Repository, job: &RefactoringJob) -> RefactoringJob {
        let jobs = JobStore::new(storage);
        jobs.create(job).unwrap();
        let claimed = jobs.claim_next(&HashSet::new()).unwrap().unwrap();
        let mut scanning = repository.clone();
        scanning.mark_scanning();
        RepositoryStore::new(storage).update(&scanning).unwrap();
        claimed
    }

    #[test]
    fn test_expired_claim_is_requeued() {
        let (_dir, storage, repository) = setup();
        let claimed = abandon_claim(&storage, &repository, &RefactoringJob::new(&repository.id));

        let stats = recover_stale_claims(&storage, Duration::ZERO).unwrap();
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.repositories_reset, 1);

        let job = JobStore::new(&storage).get(&claimed.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.error.as_deref().unwrap().contains("claim expired"));

        let stored = RepositoryStore::new(&storage).get(&repository.id).unwrap().unwrap();
        assert_eq!(stored.status, RepositoryStatus::Error);

        let errors = EventStore::new(&storage).find_by_type(event_types::ERROR).unwrap();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_expired_claim_on_last_attempt_fails() {
        let (_dir, storage, repository) = setup();
        let mut job = RefactoringJob::new(&repository.id);
        job.attempts = job.max_attempts - 1;
        let claimed = abandon_claim(&storage, &repository, &job);

        let stats = recover_stale_claims(&storage, Duration::ZERO).unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.requeued, 0);

        let job = JobStore::new(&storage).get(&claimed.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, job.max_attempts);
    }

    #[test]
    fn test_live_claim_is_left_alone() {
        let (_dir, storage, repository) = setup();
        let claimed = abandon_claim(&storage, &repository, &RefactoringJob::new(&repository.id));

        let stats = recover_stale_claims(&storage, DEFAULT_CLAIM_LEASE).unwrap();
        assert!(stats.is_empty());

        let job = JobStore::new(&storage).get(&claimed.id).unwrap().unwrap();
        assert_eq!(job, claimed);
        let stored = RepositoryStore::new(&storage).get(&repository.id).unwrap().unwrap();
        assert_eq!(stored.status, RepositoryStatus::Scanning);
    }

    #[test]
    fn test_claim_finished_concurrently_wins() {
        let (_dir, storage, repository) = setup();
        let claimed = abandon_claim(&storage, &repository, &RefactoringJob::new(&repository.id));

        // The worker finishes between the recovery read and its write
        let jobs = JobStore::new(&storage);
        let mut done = claimed.clone();
        done.complete(serde_json::json!({})).unwrap();
        jobs.save_transition(&done, claimed.revision).unwrap();

        let mut late = claimed.clone();
        late.fail_recoverable("claim expired").unwrap();
        assert!(!jobs.try_save_transition(&late, claimed.revision).unwrap());

        let stats = recover_stale_claims(&storage, Duration::ZERO).unwrap();
        assert_eq!(stats.requeued + stats.failed, 0);
        assert_eq!(jobs.get(&claimed.id).unwrap().unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_nothing_to_recover() {
        let (_dir, storage, repository) = setup();
        JobStore::new(&storage).create(&RefactoringJob::new(&repository.id)).unwrap();

        let stats = recover_stale_claims(&storage, Duration::ZERO).unwrap();
        assert!(stats.is_empty());
    }
}
