//! Code host trait, wire types and errors

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RefactorError;

/// A branch name and the SHA of its head commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
}

/// One file written to a branch as a single commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommit {
    pub path: String,
    pub content: String,
    pub branch: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub title: String,
    /// Head branch name
    pub head: String,
    /// Base branch name
    pub base: String,
}

/// A file changed by a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    /// `added`, `modified`, `removed`, `renamed`, ...
    pub status: String,
    pub patch: Option<String>,
}

impl FileDiff {
    pub fn is_removed(&self) -> bool {
        self.status == "removed"
    }
}

/// Pre-authorized access to a code host.
#[async_trait]
pub trait CodeHostClient: Send + Sync {
    /// Paths of all files on the default branch.
    async fn list_files(&self, owner: &str, repo: &str) -> Result<Vec<String>, CodeHostError>;

    /// File content at `git_ref`, or the default branch when `None`.
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<String, CodeHostError>;

    async fn default_branch(&self, owner: &str, repo: &str) -> Result<BranchRef, CodeHostError>;

    /// Create `name` at `from_sha`. An existing branch of that name is not an error.
    async fn create_branch(&self, owner: &str, repo: &str, name: &str, from_sha: &str) -> Result<(), CodeHostError>;

    async fn commit_file(&self, owner: &str, repo: &str, commit: &FileCommit) -> Result<(), CodeHostError>;

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, CodeHostError>;

    async fn list_open_pull_requests(&self, owner: &str, repo: &str) -> Result<Vec<PullRequest>, CodeHostError>;

    async fn get_pull_request_files(&self, owner: &str, repo: &str, number: u64)
    -> Result<Vec<FileDiff>, CodeHostError>;

    async fn approve(&self, owner: &str, repo: &str, number: u64, body: &str) -> Result<(), CodeHostError>;

    async fn merge(&self, owner: &str, repo: &str, number: u64) -> Result<(), CodeHostError>;

    async fn request_changes(&self, owner: &str, repo: &str, number: u64, feedback: &str)
    -> Result<(), CodeHostError>;
    /// Close without merging.
    async fn close_pull_request(&self, owner: &str, repo: &str, number: u64) -> Result<(), CodeHostError>;
}

/// Errors that can occur talking to the code host
#[derive(Debug, thiserror::Error)]
pub enum CodeHostError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CodeHostError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CodeHostError::RateLimited { .. } => true,
            CodeHostError::Api { status, .. } => *status >= 500,
            CodeHostError::Network(_) => true,
            CodeHostError::Unauthorized(_) => false,
            CodeHostError::NotFound(_) => false,
            CodeHostError::InvalidResponse(_) => false,
        }
    }
}

impl From<CodeHostError> for RefactorError {
    fn from(err: CodeHostError) -> Self {
        match err {
            CodeHostError::Unauthorized(_) => RefactorError::FatalConfiguration(err.to_string()),
            CodeHostError::NotFound(what) => RefactorError::NotFound(what),
            other => RefactorError::Transient(other.to_string()),
        }
    }
}
