//! Activity monitoring
//!
//! Records analysis, PR and error events for dashboards and rolls job
//! history up into summary statistics.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::{EventRecord, JobStatus, ScanResult, event_types};
use crate::error::Result;
use crate::storage::{EventStore, JobStore, Storage};

/// Rollup of job history and PR activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub total_jobs: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub prs_created: usize,
    /// Percentage of terminal jobs that completed, 0 when none are terminal
    pub success_rate: u32,
}

pub struct Monitor<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> Monitor<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn log_event(&self, event: &EventRecord) -> Result<()> {
        tracing::debug!(
            event_type = %event.event_type,
            repository_id = %event.repository_id,
            "Recording event"
        );
        EventStore::new(self.storage.as_ref()).append(event)
    }

    /// Record a finished scan with its score and summary.
    pub fn log_analysis(&self, repository_id: &str, scan: &ScanResult) -> Result<()> {
        let details = json!({
            "repository_score": scan.repository_score,
            "total_issues": scan.total_issues(),
            "summary": scan.summary,
        });
        self.log_event(&EventRecord::analysis(repository_id, details))
    }

    pub fn log_pr_created(&self, repository_id: &str, path: &str, url: &str) -> Result<()> {
        self.log_event(&EventRecord::pr_created(repository_id, path, url))
    }

    pub fn log_error(&self, repository_id: &str, job_id: &str, error: &str) -> Result<()> {
        self.log_event(&EventRecord::error(repository_id, job_id, error))
    }

    /// Most recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        let mut events = EventStore::new(self.storage.as_ref()).list_all()?;
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit);
        Ok(events)
    }

    pub fn stats(&self) -> Result<MonitorStats> {
        let jobs = JobStore::new(self.storage.as_ref()).list_all()?;
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();

        let completed = count(JobStatus::Completed);
        let failed = count(JobStatus::Failed);
        let terminal = completed + failed;
        let success_rate = if terminal == 0 {
            0
        } else {
            ((completed as f64 / terminal as f64) * 100.0).round() as u32
        };

        let prs_created = EventStore::new(self.storage.as_ref())
            .find_by_type(event_types::PR_CREATED)?
            .len();

        Ok(MonitorStats {
            total_jobs: jobs.len(),
            completed,
            failed,
            pending: count(JobStatus::Pending),
            in_progress: count(JobStatus::InProgress),
            prs_created,
            success_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RefactoringJob, ScanSummary};
    use crate::storage::JsonlStorage;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<JsonlStorage>) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(temp_dir.path()).unwrap());
        (temp_dir, storage)
    }

    fn job_in(storage: &JsonlStorage, status: JobStatus) {
        let mut job = RefactoringJob::new("repo-1");
        job.status = status;
        JobStore::new(storage).create(&job).unwrap();
    }

    #[test]
    fn test_stats_empty() {
        let (_dir, storage) = setup();
        let stats = Monitor::new(storage).stats().unwrap();
        assert_eq!(stats, MonitorStats::default());
    }

    #[test]
    fn test_stats_success_rate_rounds() {
        let (_dir, storage) = setup();
        job_in(&storage, JobStatus::Completed);
        job_in(&storage, JobStatus::Completed);
        job_in(&storage, JobStatus::Failed);
        job_in(&storage, JobStatus::Pending);
        job_in(&storage, JobStatus::InProgress);

        let stats = Monitor::new(storage).stats().unwrap();
        assert_eq!(stats.total_jobs, 5);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_progress, 1);
        // 2 of 3 terminal jobs
        assert_eq!(stats.success_rate, 67);
    }

    #[test]
    fn test_prs_created_counts_events() {
        let (_dir, storage) = setup();
        let monitor = Monitor::new(storage);
        monitor.log_pr_created("repo-1", "a.ts", "https://github.com/acme/w/pull/1").unwrap();
        monitor.log_pr_created("repo-1", "b.ts", "https://github.com/acme/w/pull/2").unwrap();
        monitor.log_error("repo-1", "job-1", "boom").unwrap();

        assert_eq!(monitor.stats().unwrap().prs_created, 2);
    }

    #[test]
    fn test_log_analysis_details() {
        let (_dir, storage) = setup();
        let monitor = Monitor::new(storage);
        let scan = ScanResult {
            repository_score: 85,
            prioritized_files: vec![],
            summary: ScanSummary {
                total_files: 4,
                ..Default::default()
            },
        };
        monitor.log_analysis("repo-1", &scan).unwrap();

        let events = monitor.recent_events(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event_types::ANALYSIS);
        assert_eq!(events[0].details["repository_score"], 85);
        assert_eq!(events[0].details["summary"]["total_files"], 4);
    }

    #[test]
    fn test_recent_events_limit() {
        let (_dir, storage) = setup();
        let monitor = Monitor::new(storage);
        for i in 0..5 {
            monitor.log_error("repo-1", &format!("job-{}", i), "boom").unwrap();
        }
        assert_eq!(monitor.recent_events(3).unwrap().len(), 3);
    }
}
