//! Scan cycle driver
//!
//! One pass releases expired claims, enqueues a job for every repository not
//! already being scanned, then drains the queue sequentially. Each job is
//! processed at most once per pass; requeued jobs wait for the next pass. A
//! job that cannot be finished is logged and counted without ending the pass.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::JobStatus;
use crate::error::{RefactorError, Result};
use crate::queue::JobQueue;
use crate::storage::{RepositoryStore, Storage};

/// Tally of one scan cycle or worker run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Jobs created by this cycle
    pub enqueued: usize,
    /// Repositories skipped because a job was already active
    pub skipped: usize,
    pub completed: usize,
    /// Jobs that failed recoverably and went back to PENDING
    pub requeued: usize,
    pub failed: usize,
    /// Claimed jobs whose outcome could not be saved
    pub errored: usize,
    /// Expired claims released before the pass
    pub recovered: usize,
}

impl CycleReport {
    pub fn processed(&self) -> usize {
        self.completed + self.requeued + self.failed + self.errored
    }

    fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Completed => self.completed += 1,
            JobStatus::Pending => self.requeued += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::InProgress => {}
        }
    }
}

/// Recover expired claims, enqueue every sweepable repository, then drain the queue once.
pub async fn run_scan_cycle<S: Storage>(queue: &JobQueue<S>) -> Result<CycleReport> {
    let recovered = queue.recover_stale_claims()?;
    let repositories = RepositoryStore::new(queue.storage().as_ref()).find_sweepable()?;

    let mut report = CycleReport {
        recovered: recovered.requeued + recovered.failed,
        ..Default::default()
    };
    for repository in &repositories {
        match queue.enqueue_if_idle(&repository.id)? {
            Some(_) => report.enqueued += 1,
            None => report.skipped += 1,
        }
    }

    let drained = drain(queue, None).await?;
    report.completed = drained.completed;
    report.requeued = drained.requeued;
    report.failed = drained.failed;
    report.errored = drained.errored;

    tracing::info!(
        repositories = repositories.len(),
        enqueued = report.enqueued,
        skipped = report.skipped,
        completed = report.completed,
        requeued = report.requeued,
        failed = report.failed,
        errored = report.errored,
        recovered = report.recovered,
        "Scan cycle finished"
    );
    Ok(report)
}

/// Recover expired claims, then process jobs until the queue is empty or
/// `max_jobs` have run.
///
/// A job is never picked up twice in one run.
pub async fn run_worker<S: Storage>(queue: &JobQueue<S>, max_jobs: Option<usize>) -> Result<CycleReport> {
    let recovered = queue.recover_stale_claims()?;
    let mut report = drain(queue, max_jobs).await?;
    report.recovered = recovered.requeued + recovered.failed;
    Ok(report)
}

async fn drain<S: Storage>(queue: &JobQueue<S>, max_jobs: Option<usize>) -> Result<CycleReport> {
    let mut report = CycleReport::default();
    let mut seen = HashSet::new();

    while max_jobs.is_none_or(|max| report.processed() < max) {
        let job = match queue.process_next_job_excluding(&seen).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(RefactorError::Job { job_id, source }) => {
                tracing::warn!(job_id = %job_id, error = %source, "Failed to finish job, continuing");
                report.errored += 1;
                seen.insert(job_id);
                continue;
            }
            Err(e) => return Err(e),
        };
        report.record(job.status);
        seen.insert(job.id);
    }
    Ok(report)
}
