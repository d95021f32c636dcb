//! Event record types for monitoring.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{generate_event_id, now_ms};

/// Event type constants
pub mod event_types {
    pub const ANALYSIS: &str = "analysis";
    pub const PR_CREATED: &str = "pr_created";
    pub const ERROR: &str = "error";
}

/// Activity log entry surfaced to dashboards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub id: String,
    /// One of `event_types`
    pub event_type: String,
    pub repository_id: String,
    /// Event-specific details
    pub details: Value,
    /// Unix timestamp in milliseconds
    pub created_at: u64,
}

impl EventRecord {
    pub fn new(event_type: &str, repository_id: &str, details: Value) -> Self {
        Self {
            id: generate_event_id(),
            event_type: event_type.to_string(),
            repository_id: repository_id.to_string(),
            details,
            created_at: now_ms(),
        }
    }

    /// A completed scan with its score and summary
    pub fn analysis(repository_id: &str, details: Value) -> Self {
        Self::new(event_types::ANALYSIS, repository_id, details)
    }

    pub fn pr_created(repository_id: &str, path: &str, url: &str) -> Self {
        Self::new(
            event_types::PR_CREATED,
            repository_id,
            serde_json::json!({ "path": path, "url": url }),
        )
    }

    pub fn error(repository_id: &str, job_id: &str, error: &str) -> Self {
        Self::new(
            event_types::ERROR,
            repository_id,
            serde_json::json!({ "job_id": job_id, "error": error }),
        )
    }

    pub fn is_error(&self) -> bool {
        self.event_type == event_types::ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_record_new() {
        let event = EventRecord::new("analysis", "repo-1", Value::Null);
        assert!(event.id.starts_with("evt-"));
        assert_eq!(event.event_type, "analysis");
        assert_eq!(event.repository_id, "repo-1");
        assert!(event.created_at > 0);
    }

    #[test]
    fn test_pr_created() {
        let event = EventRecord::pr_created("repo-1", "src/a.ts", "https://example.test/pull/3");
        assert_eq!(event.event_type, event_types::PR_CREATED);
        assert_eq!(event.details["path"], "src/a.ts");
        assert_eq!(event.details["url"], "https://example.test/pull/3");
    }

    #[test]
    fn test_error_event() {
        let event = EventRecord::error("repo-1", "job-9", "boom");
        assert!(event.is_error());
        assert_eq!(event.details["job_id"], "job-9");
        assert_eq!(event.details["error"], "boom");
    }
}
