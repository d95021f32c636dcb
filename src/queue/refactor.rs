//! Pull request creation for refactor-eligible files
//!
//! Each file gets a branch named from its path, so repeated runs converge on
//! the same branch and reuse the pull request already open for it.

use std::sync::Arc;

use crate::analysis::{AnalysisClient, AnalysisError};
use crate::codehost::{BranchRef, CodeHostClient, FileCommit, NewPullRequest, PullRequest};
use crate::domain::{FileAnalysis, Issue, RefactorSuggestion};
use crate::error::Result;
use crate::id::branch_name_for_path;
use crate::scan::language_for_path;
use crate::scheduler::rate_limit::{ANALYSIS_SERVICE, CODEHOST_SERVICE, RateLimiter};

/// Result of proposing a refactor for one file
#[derive(Debug, Clone, PartialEq)]
pub enum RefactorOutcome {
    /// A new pull request was opened
    Opened(PullRequest),
    /// A pull request for the file's branch was already open
    Reused(PullRequest),
    /// Nothing to propose; carries the reason
    Skipped(String),
}

impl RefactorOutcome {
    pub fn pull_request(&self) -> Option<&PullRequest> {
        match self {
            RefactorOutcome::Opened(pr) | RefactorOutcome::Reused(pr) => Some(pr),
            RefactorOutcome::Skipped(_) => None,
        }
    }
}

pub struct PullRequestCreator {
    host: Arc<dyn CodeHostClient>,
    analysis: Arc<dyn AnalysisClient>,
    limiter: Arc<RateLimiter>,
    branch_prefix: String,
}

impl PullRequestCreator {
    pub fn new(
        host: Arc<dyn CodeHostClient>,
        analysis: Arc<dyn AnalysisClient>,
        limiter: Arc<RateLimiter>,
        branch_prefix: impl Into<String>,
    ) -> Self {
        Self {
            host,
            analysis,
            limiter,
            branch_prefix: branch_prefix.into(),
        }
    }

    pub fn branch_prefix(&self) -> &str {
        &self.branch_prefix
    }

    /// Propose a refactor of `file` against `base`.
    ///
    /// `open` is the repository's open pull requests, used to reuse an
    /// existing PR for the file's branch.
    pub async fn propose(
        &self,
        owner: &str,
        repo: &str,
        base: &BranchRef,
        open: &[PullRequest],
        file: &FileAnalysis,
    ) -> Result<RefactorOutcome> {
        let branch = branch_name_for_path(&self.branch_prefix, &file.path);
        if let Some(existing) = open.iter().find(|pr| pr.head == branch) {
            tracing::info!(owner, repo, path = %file.path, pr = existing.number, "Reusing open pull request");
            return Ok(RefactorOutcome::Reused(existing.clone()));
        }

        self.limiter.wait_for_capacity(ANALYSIS_SERVICE).await;
        let suggestion = match self
            .analysis
            .refactor(&file.content, language_for_path(&file.path))
            .await
        {
            Ok(suggestion) => suggestion,
            Err(AnalysisError::Malformed(reason)) => {
                tracing::warn!(owner, repo, path = %file.path, reason = %reason, "Unusable refactor suggestion");
                return Ok(RefactorOutcome::Skipped(format!("malformed suggestion: {}", reason)));
            }
            Err(e) => return Err(e.into()),
        };

        let code = suggestion.code.trim();
        if code.is_empty() || code == file.content.trim() {
            tracing::info!(owner, repo, path = %file.path, "Refactor produced no change, skipping");
            return Ok(RefactorOutcome::Skipped("no change suggested".to_string()));
        }

        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        self.host.create_branch(owner, repo, &branch, &base.sha).await?;

        let commit = FileCommit {
            path: file.path.clone(),
            content: suggestion.code.clone(),
            branch: branch.clone(),
            message: format!("Automated refactor of {}", file.path),
        };
        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        self.host.commit_file(owner, repo, &commit).await?;

        let request = NewPullRequest {
            title: format!("Automated refactor: {}", file.path),
            head: branch,
            base: base.name.clone(),
            body: pull_request_body(&suggestion, &file.analysis.issues),
        };
        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        let pr = self.host.create_pull_request(owner, repo, &request).await?;

        tracing::info!(owner, repo, path = %file.path, pr = pr.number, url = %pr.url, "Opened refactor pull request");
        Ok(RefactorOutcome::Opened(pr))
    }
}

fn pull_request_body(suggestion: &RefactorSuggestion, issues: &[Issue]) -> String {
    let mut body = String::from("## Automated refactor\n\n");
    if !suggestion.explanation.trim().is_empty() {
        body.push_str(suggestion.explanation.trim());
        body.push_str("\n\n");
    }
    if !issues.is_empty() {
        body.push_str("### Issues addressed\n\n");
        for issue in issues {
            let severity = format!("{:?}", issue.severity).to_lowercase();
            let label = issue
                .title
                .as_deref()
                .or(issue.description.as_deref())
                .unwrap_or("unspecified issue");
            body.push_str(&format!("- [{}] {}\n", severity, label));
        }
    }
    body
}
