//! Refactoring job queue
//!
//! `process_next_job` claims the oldest eligible PENDING job, scans its
//! repository, proposes pull requests for refactor-eligible files and
//! persists the resulting transition before returning. Retry cadence is
//! driven by whoever calls it; the queue has no timer of its own.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::error_handler::ErrorHandler;
use super::recovery::{self, DEFAULT_CLAIM_LEASE, RecoveryStats};
use super::refactor::{PullRequestCreator, RefactorOutcome};
use crate::analysis::AnalysisClient;
use crate::codehost::CodeHostClient;
use crate::domain::{DEFAULT_MAX_ATTEMPTS, RefactoringJob, Repository, ScanResult};
use crate::error::{RefactorError, Result};
use crate::monitor::Monitor;
use crate::scan::{PipelineConfig, ScanPipeline};
use crate::scheduler::priority::{RefactorThresholds, needs_refactor};
use crate::scheduler::rate_limit::{CODEHOST_SERVICE, RateLimiter};
use crate::storage::{JobStore, RepositoryStore, Storage};

/// Branch prefix for bot-created refactor branches.
pub const DEFAULT_BRANCH_PREFIX: &str = "silent-refactor";

#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Attempts allowed per job
    pub max_attempts: u32,
    pub thresholds: RefactorThresholds,
    pub branch_prefix: String,
    /// Deadline for one repository scan; `None` waits indefinitely
    pub scan_timeout: Option<Duration>,
    /// How long a claim may stay IN_PROGRESS before recovery releases it
    pub claim_lease: Duration,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            thresholds: RefactorThresholds::default(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            scan_timeout: Some(Duration::from_secs(600)),
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }
}

/// Insert a PENDING job without touching any collaborator.
pub fn create_job<S: Storage>(storage: &S, repository_id: &str, max_attempts: u32) -> Result<RefactoringJob> {
    let job = RefactoringJob::with_max_attempts(repository_id, max_attempts);
    JobStore::new(storage).create(&job)?;
    tracing::info!(job_id = %job.id, repository_id, "Created refactoring job");
    Ok(job)
}

/// Caller-side de-duplication: skip when an active job exists.
pub fn enqueue_if_idle<S: Storage>(
    storage: &S,
    repository_id: &str,
    max_attempts: u32,
) -> Result<Option<RefactoringJob>> {
    let active = JobStore::new(storage).find_active_for_repository(repository_id)?;
    if let Some(existing) = active.first() {
        tracing::debug!(repository_id, job_id = %existing.id, "Active job exists, not enqueuing");
        return Ok(None);
    }
    create_job(storage, repository_id, max_attempts).map(Some)
}

/// What one successful job run produced.
#[derive(Debug, Clone)]
struct JobRun {
    scan: ScanResult,
    pr_urls: Vec<String>,
    skipped: Vec<serde_json::Value>,
    open_prs: u32,
}

impl JobRun {
    fn metadata(&self) -> serde_json::Value {
        json!({
            "pr_urls": self.pr_urls,
            "repository_score": self.scan.repository_score,
            "summary": self.scan.summary,
            "skipped": self.skipped,
        })
    }
}

pub struct JobQueue<S: Storage> {
    storage: Arc<S>,
    host: Arc<dyn CodeHostClient>,
    limiter: Arc<RateLimiter>,
    pipeline: ScanPipeline,
    creator: PullRequestCreator,
    monitor: Arc<Monitor<S>>,
    errors: ErrorHandler<S>,
    config: JobQueueConfig,
}

impl<S: Storage> JobQueue<S> {
    pub fn new(
        storage: Arc<S>,
        host: Arc<dyn CodeHostClient>,
        analysis: Arc<dyn AnalysisClient>,
        limiter: Arc<RateLimiter>,
        pipeline_config: PipelineConfig,
        config: JobQueueConfig,
    ) -> Self {
        let monitor = Arc::new(Monitor::new(storage.clone()));
        let pipeline = ScanPipeline::new(host.clone(), analysis.clone(), limiter.clone(), pipeline_config);
        let creator = PullRequestCreator::new(host.clone(), analysis, limiter.clone(), config.branch_prefix.clone());
        Self {
            storage,
            host,
            limiter,
            pipeline,
            creator,
            errors: ErrorHandler::new(monitor.clone()),
            monitor,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn monitor(&self) -> &Arc<Monitor<S>> {
        &self.monitor
    }

    pub fn config(&self) -> &JobQueueConfig {
        &self.config
    }

    /// Insert a PENDING job for `repository_id`.
    ///
    /// Does not de-duplicate; see `enqueue_if_idle`.
    pub fn create_job(&self, repository_id: &str) -> Result<RefactoringJob> {
        create_job(self.storage.as_ref(), repository_id, self.config.max_attempts)
    }

    /// Create a job unless the repository already has a PENDING or IN_PROGRESS one.
    pub fn enqueue_if_idle(&self, repository_id: &str) -> Result<Option<RefactoringJob>> {
        enqueue_if_idle(self.storage.as_ref(), repository_id, self.config.max_attempts)
    }

    /// Release claims older than the configured lease; see `recovery`.
    pub fn recover_stale_claims(&self) -> Result<RecoveryStats> {
        recovery::recover_stale_claims(self.storage.as_ref(), self.config.claim_lease)
    }

    /// Claim and run the oldest eligible job. `None` when the queue is empty.
    pub async fn process_next_job(&self) -> Result<Option<RefactoringJob>> {
        self.process_next_job_excluding(&HashSet::new()).await
    }

    /// As `process_next_job`, never claiming a job whose id is in `exclude`.
    ///
    /// A failure after the claim is wrapped in `RefactorError::Job` so callers
    /// can tell which job it belongs to.
    pub async fn process_next_job_excluding(&self, exclude: &HashSet<String>) -> Result<Option<RefactoringJob>> {
        let jobs = JobStore::new(self.storage.as_ref());
        let Some(mut job) = jobs.claim_next(exclude)? else {
            return Ok(None);
        };
        let claimed_revision = job.revision;
        tracing::info!(
            job_id = %job.id,
            repository_id = %job.repository_id,
            attempt = job.attempts + 1,
            max_attempts = job.max_attempts,
            "Processing job"
        );

        let outcome = self.run_job(&job).await;
        if let Err(e) = self.finish_job(&mut job, outcome, claimed_revision) {
            return Err(RefactorError::job(&job.id, e));
        }
        Ok(Some(job))
    }

    /// Apply the run's outcome to the claimed job and persist it.
    fn finish_job(&self, job: &mut RefactoringJob, outcome: Result<JobRun>, claimed_revision: u64) -> Result<()> {
        match outcome {
            Ok(run) => {
                job.complete(run.metadata())?;
                tracing::info!(job_id = %job.id, prs = run.pr_urls.len(), "Job completed");
            }
            Err(e) => {
                self.errors.handle(job, &e)?;
            }
        }
        JobStore::new(self.storage.as_ref()).save_transition(job, claimed_revision)
    }

    async fn run_job(&self, job: &RefactoringJob) -> Result<JobRun> {
        let repositories = RepositoryStore::new(self.storage.as_ref());
        let mut repository = repositories
            .get(&job.repository_id)?
            .ok_or_else(|| RefactorError::NotFound(format!("repository {}", job.repository_id)))?;

        repository.mark_scanning();
        repositories.update(&repository)?;

        let result = self.scan_and_propose(&repository).await;
        match &result {
            Ok(run) => repository.mark_scanned(run.open_prs, run.scan.total_issues() as u32),
            Err(_) => repository.mark_error(),
        }
        repositories.update(&repository)?;
        result
    }

    async fn scan_and_propose(&self, repository: &Repository) -> Result<JobRun> {
        let (owner, repo) = (repository.owner.as_str(), repository.name.as_str());
        let scan = self.scan_with_deadline(owner, repo).await?;

        if let Err(e) = self.monitor.log_analysis(&repository.id, &scan) {
            tracing::warn!(repository = %repository.full_name(), error = %e, "Failed to record analysis event");
        }

        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        let open = self.host.list_open_pull_requests(owner, repo).await?;
        let prefix = format!("{}/", self.creator.branch_prefix().trim_end_matches('/'));
        let mut open_prs = open.iter().filter(|pr| pr.head.starts_with(&prefix)).count() as u32;

        let eligible: Vec<_> = scan
            .prioritized_files
            .iter()
            .filter(|f| needs_refactor(f, &self.config.thresholds))
            .collect();
        tracing::info!(
            repository = %repository.full_name(),
            score = scan.repository_score,
            eligible = eligible.len(),
            "Scan finished"
        );

        let mut pr_urls = Vec::new();
        let mut skipped = Vec::new();
        if !eligible.is_empty() {
            self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
            let base = self.host.default_branch(owner, repo).await?;

            for file in eligible {
                match self.creator.propose(owner, repo, &base, &open, file).await? {
                    RefactorOutcome::Opened(pr) => {
                        if let Err(e) = self.monitor.log_pr_created(&repository.id, &file.path, &pr.url) {
                            tracing::warn!(url = %pr.url, error = %e, "Failed to record PR event");
                        }
                        open_prs += 1;
                        pr_urls.push(pr.url);
                    }
                    RefactorOutcome::Reused(pr) => pr_urls.push(pr.url),
                    RefactorOutcome::Skipped(reason) => {
                        skipped.push(json!({ "path": file.path, "reason": reason }));
                    }
                }
            }
        }

        Ok(JobRun {
            scan,
            pr_urls,
            skipped,
            open_prs,
        })
    }

    async fn scan_with_deadline(&self, owner: &str, repo: &str) -> Result<ScanResult> {
        let scan = self.pipeline.scan_repository(owner, repo);
        match self.config.scan_timeout {
            Some(limit) => tokio::time::timeout(limit, scan).await.map_err(|_| {
                RefactorError::scan(
                    owner,
                    repo,
                    RefactorError::Transient(format!("scan timed out after {}s", limit.as_secs_f64())),
                )
            })?,
            None => scan.await,
        }
    }
}
