//! Error types for Silent Refactor
//!
//! Centralized error handling using thiserror. Collaborator-specific errors
//! (`AnalysisError`, `CodeHostError`) convert into `RefactorError`, which is
//! what the job queue classifies.

use thiserror::Error;

/// Marker carried by the message of every non-recoverable error.
pub const FATAL_MARKER: &str = "FATAL:";

/// All error types that can occur in Silent Refactor
#[derive(Debug, Error)]
pub enum RefactorError {
    /// Network, timeout or rate-limit failure from a collaborator
    #[error("Transient error: {0}")]
    Transient(String),

    /// Repository or file missing at the code host
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing credentials or a permanently exceeded quota
    #[error("FATAL: configuration error: {0}")]
    FatalConfiguration(String),

    /// Analysis service returned something we could not parse
    #[error("Malformed analysis: {0}")]
    MalformedAnalysis(String),

    /// A repository scan could not be performed
    #[error("Failed to scan repository {repository}: {source}")]
    Scan {
        repository: String,
        #[source]
        source: Box<RefactorError>,
    },

    /// A pull request review was aborted
    #[error("Failed to review PR #{pr}: {source}")]
    Review {
        pr: u64,
        #[source]
        source: Box<RefactorError>,
    },

    /// A claimed job could not be finished or persisted
    #[error("Failed to finish job {job_id}: {source}")]
    Job {
        job_id: String,
        #[source]
        source: Box<RefactorError>,
    },

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RefactorError {
    /// Wrap an error as a scan failure for `owner/repo`.
    pub fn scan(owner: &str, repo: &str, source: RefactorError) -> Self {
        RefactorError::Scan {
            repository: format!("{}/{}", owner, repo),
            source: Box::new(source),
        }
    }

    /// Wrap an error as a review failure for a pull request.
    pub fn review(pr: u64, source: RefactorError) -> Self {
        RefactorError::Review {
            pr,
            source: Box::new(source),
        }
    }

    /// Wrap an error raised while finishing a claimed job.
    pub fn job(job_id: &str, source: RefactorError) -> Self {
        RefactorError::Job {
            job_id: job_id.to_string(),
            source: Box::new(source),
        }
    }

    /// True if the message carries the fatal marker anywhere in its chain.
    pub fn is_fatal(&self) -> bool {
        self.to_string().contains(FATAL_MARKER)
    }

    /// The innermost error, unwrapping scan, review and job wrappers.
    pub fn root(&self) -> &RefactorError {
        match self {
            RefactorError::Scan { source, .. }
            | RefactorError::Review { source, .. }
            | RefactorError::Job { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for Silent Refactor operations
pub type Result<T> = std::result::Result<T, RefactorError>;
