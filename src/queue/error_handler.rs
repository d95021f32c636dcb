//! Failure classification for refactoring jobs
//!
//! An error is recoverable unless its message carries the fatal marker.
//! Recoverable failures send the job back to PENDING until its attempts run
//! out; fatal ones fail it immediately.

use std::sync::Arc;

use crate::domain::{JobStatus, RefactoringJob};
use crate::error::{FATAL_MARKER, RefactorError, Result};
use crate::monitor::Monitor;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Recoverable,
    Fatal,
}

pub fn classify(error: &RefactorError) -> FailureClass {
    classify_message(&error.to_string())
}

pub fn classify_message(message: &str) -> FailureClass {
    if message.contains(FATAL_MARKER) {
        FailureClass::Fatal
    } else {
        FailureClass::Recoverable
    }
}

/// Applies failures to jobs and records them as error events.
pub struct ErrorHandler<S: Storage> {
    monitor: Arc<Monitor<S>>,
}

impl<S: Storage> ErrorHandler<S> {
    pub fn new(monitor: Arc<Monitor<S>>) -> Self {
        Self { monitor }
    }

    /// Transition an in-progress job for `error`; returns the new status.
    ///
    /// The job is only mutated in memory; persisting it is the caller's job.
    pub fn handle(&self, job: &mut RefactoringJob, error: &RefactorError) -> Result<JobStatus> {
        let message = error.to_string();
        let status = match classify_message(&message) {
            FailureClass::Fatal => {
                job.fail_fatal(&message)?;
                JobStatus::Failed
            }
            FailureClass::Recoverable => job.fail_recoverable(&message)?,
        };

        tracing::warn!(
            job_id = %job.id,
            repository_id = %job.repository_id,
            attempts = job.attempts,
            max_attempts = job.max_attempts,
            status = %status,
            error = %message,
            "Job attempt failed"
        );

        if let Err(e) = self.monitor.log_error(&job.repository_id, &job.id, &message) {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to record error event");
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event_types;
    use crate::storage::JsonlStorage;
    use tempfile::TempDir;

    fn handler() -> (TempDir, ErrorHandler<JsonlStorage>, Arc<Monitor<JsonlStorage>>) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(temp_dir.path()).unwrap());
        let monitor = Arc::new(Monitor::new(storage));
        (temp_dir, ErrorHandler::new(monitor.clone()), monitor)
    }

    fn started_job() -> RefactoringJob {
        let mut job = RefactoringJob::new("repo-1");
        job.start().unwrap();
        job
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&RefactorError::Transient("timeout".to_string())),
            FailureClass::Recoverable
        );
        assert_eq!(
            classify(&RefactorError::NotFound("acme/widgets".to_string())),
            FailureClass::Recoverable
        );
        assert_eq!(
            classify(&RefactorError::FatalConfiguration("no token".to_string())),
            FailureClass::Fatal
        );
        let wrapped = RefactorError::scan(
            "acme",
            "widgets",
            RefactorError::FatalConfiguration("no token".to_string()),
        );
        assert_eq!(classify(&wrapped), FailureClass::Fatal);
    }

    #[test]
    fn test_recoverable_requeues() {
        let (_dir, handler, _) = handler();
        let mut job = started_job();
        let status = handler
            .handle(&mut job, &RefactorError::Transient("503".to_string()))
            .unwrap();
        assert_eq!(status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error.as_deref(), Some("Transient error: 503"));
    }

    #[test]
    fn test_fatal_fails_immediately_and_logs() {
        let (_dir, handler, monitor) = handler();
        let mut job = started_job();
        let status = handler
            .handle(&mut job, &RefactorError::FatalConfiguration("no token".to_string()))
            .unwrap();
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);

        let events = monitor.recent_events(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event_types::ERROR);
        assert_eq!(events[0].details["job_id"], job.id.as_str());
    }

    #[test]
    fn test_pending_job_rejected() {
        let (_dir, handler, _) = handler();
        let mut job = RefactoringJob::new("repo-1");
        let result = handler.handle(&mut job, &RefactorError::Transient("x".to_string()));
        assert!(matches!(result, Err(RefactorError::InvalidState(_))));
    }
}
