//! Pull request reviewer
//!
//! Fetches a pull request's changed files at its head branch, classifies
//! them and acts: approve (and merge when allowed) or request changes.
//! Reviews are never retried here.

use std::sync::Arc;

use super::classifier::{ChangeClassifier, ChangedFile, ReviewResult};
use crate::codehost::{CodeHostClient, PullRequest};
use crate::error::{RefactorError, Result};
use crate::scheduler::rate_limit::{CODEHOST_SERVICE, RateLimiter};

/// Outcome of reviewing every open bot pull request in a repository.
#[derive(Debug, Clone, Default)]
pub struct ReviewSweep {
    pub reviewed: Vec<(u64, ReviewResult)>,
    /// Pull request number and error message
    pub failures: Vec<(u64, String)>,
}

pub struct PrReviewer {
    host: Arc<dyn CodeHostClient>,
    classifier: Arc<dyn ChangeClassifier>,
    limiter: Arc<RateLimiter>,
    branch_prefix: String,
}

impl PrReviewer {
    pub fn new(
        host: Arc<dyn CodeHostClient>,
        classifier: Arc<dyn ChangeClassifier>,
        limiter: Arc<RateLimiter>,
        branch_prefix: impl Into<String>,
    ) -> Self {
        Self {
            host,
            classifier,
            limiter,
            branch_prefix: branch_prefix.into(),
        }
    }

    /// Review pull request `number` in `owner/repo`.
    ///
    /// Any collaborator failure aborts the review with an error naming the PR.
    pub async fn review_pr(&self, owner: &str, repo: &str, number: u64) -> Result<ReviewResult> {
        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        let open = self
            .host
            .list_open_pull_requests(owner, repo)
            .await
            .map_err(|e| RefactorError::review(number, e.into()))?;
        let pr = open
            .into_iter()
            .find(|pr| pr.number == number)
            .ok_or_else(|| {
                RefactorError::review(number, RefactorError::NotFound(format!("open pull request #{}", number)))
            })?;

        self.review(owner, repo, &pr)
            .await
            .map_err(|e| RefactorError::review(number, e))
    }

    /// Review every open pull request whose head is under the bot prefix.
    ///
    /// Per-PR failures are collected, not propagated.
    pub async fn review_open_pull_requests(&self, owner: &str, repo: &str) -> Result<ReviewSweep> {
        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        let open = self.host.list_open_pull_requests(owner, repo).await?;
        let prefix = format!("{}/", self.branch_prefix.trim_end_matches('/'));

        let mut sweep = ReviewSweep::default();
        for pr in open.iter().filter(|pr| pr.head.starts_with(&prefix)) {
            match self.review(owner, repo, pr).await {
                Ok(result) => sweep.reviewed.push((pr.number, result)),
                Err(e) => {
                    let err = RefactorError::review(pr.number, e);
                    tracing::warn!(owner, repo, pr = pr.number, error = %err, "Review failed");
                    sweep.failures.push((pr.number, err.to_string()));
                }
            }
        }
        tracing::info!(
            owner,
            repo,
            reviewed = sweep.reviewed.len(),
            failed = sweep.failures.len(),
            "Reviewed open pull requests"
        );
        Ok(sweep)
    }

    /// Close pull request `number` without merging.
    pub async fn close_pr(&self, owner: &str, repo: &str, number: u64) -> Result<()> {
        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        self.host
            .close_pull_request(owner, repo, number)
            .await
            .map_err(|e| RefactorError::review(number, e.into()))?;
        tracing::info!(owner, repo, pr = number, "Closed pull request");
        Ok(())
    }

    async fn review(&self, owner: &str, repo: &str, pr: &PullRequest) -> Result<ReviewResult> {
        let changes = self.changes(owner, repo, pr).await?;
        let review = self.classifier.classify(changes).await?;

        if review.is_valid {
            self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
            self.host.approve(owner, repo, pr.number, &review.feedback).await?;
            if review.can_merge {
                self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
                self.host.merge(owner, repo, pr.number).await?;
            }
        } else {
            self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
            self.host
                .request_changes(owner, repo, pr.number, &review.feedback)
                .await?;
        }

        tracing::info!(
            owner,
            repo,
            pr = pr.number,
            valid = review.is_valid,
            merged = review.can_merge,
            "Reviewed pull request"
        );
        Ok(review)
    }

    async fn changes(&self, owner: &str, repo: &str, pr: &PullRequest) -> Result<Vec<ChangedFile>> {
        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        let diffs = self.host.get_pull_request_files(owner, repo, pr.number).await?;

        let mut changes = Vec::new();
        for diff in diffs.into_iter().filter(|d| !d.is_removed()) {
            self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
            let content = self
                .host
                .get_file_content(owner, repo, &diff.path, Some(&pr.head))
                .await?;
            changes.push(ChangedFile {
                path: diff.path,
                content,
                patch: diff.patch,
            });
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FakeAnalysisClient;
    use crate::codehost::{FileCommit, HostFailure, HostOp, InMemoryCodeHost, NewPullRequest, PullState, ReviewAction};
    use crate::domain::{AnalysisResult, Issue, Severity};
    use crate::review::{AnalysisClassifier, ReviewConfig};

    async fn open_pr(host: &InMemoryCodeHost, branch: &str, content: &str) -> PullRequest {
        let base = host.default_branch("acme", "widgets").await.unwrap();
        host.create_branch("acme", "widgets", branch, &base.sha).await.unwrap();
        host.commit_file(
            "acme",
            "widgets",
            &FileCommit {
                path: "src/app.ts".to_string(),
                content: content.to_string(),
                branch: branch.to_string(),
                message: "change".to_string(),
            },
        )
        .await
        .unwrap();
        host.create_pull_request(
            "acme",
            "widgets",
            &NewPullRequest {
                title: format!("Change on {}", branch),
                head: branch.to_string(),
                base: base.name,
                body: String::new(),
            },
        )
        .await
        .unwrap()
    }

    fn reviewer(host: Arc<InMemoryCodeHost>, auto_merge: bool) -> PrReviewer {
        let analysis = FakeAnalysisClient::default().with_result(
            "tangled",
            AnalysisResult::new(vec![Issue::new(Severity::High).with_title("God function")], 20),
        );
        let limiter = Arc::new(RateLimiter::default());
        let classifier = AnalysisClassifier::new(
            Arc::new(analysis),
            limiter.clone(),
            ReviewConfig {
                auto_merge,
                ..Default::default()
            },
        );
        PrReviewer::new(host, Arc::new(classifier), limiter, "silent-refactor")
    }

    fn host() -> Arc<InMemoryCodeHost> {
        let host = Arc::new(InMemoryCodeHost::new());
        host.add_repository("acme", "widgets", &[("src/app.ts", "const app = 1;\n")]);
        host
    }

    #[tokio::test]
    async fn test_valid_pr_approved_and_merged() {
        let host = host();
        let pr = open_pr(&host, "silent-refactor/src-app-ts", "export const app = 1;\n").await;

        let result = reviewer(host.clone(), true)
            .review_pr("acme", "widgets", pr.number)
            .await
            .unwrap();
        assert!(result.is_valid && result.can_merge);
        assert_eq!(result.changes[0].content, "export const app = 1;\n");

        assert!(matches!(host.reviews("acme", "widgets", pr.number)[0], ReviewAction::Approved(_)));
        assert_eq!(host.pull_requests("acme", "widgets")[0].1, PullState::Merged);
        assert_eq!(
            host.file_on_branch("acme", "widgets", "main", "src/app.ts").unwrap(),
            "export const app = 1;\n"
        );
    }

    #[tokio::test]
    async fn test_valid_pr_not_merged_without_auto_merge() {
        let host = host();
        let pr = open_pr(&host, "silent-refactor/src-app-ts", "export const app = 1;\n").await;

        reviewer(host.clone(), false)
            .review_pr("acme", "widgets", pr.number)
            .await
            .unwrap();
        assert_eq!(host.calls(HostOp::Approve), 1);
        assert_eq!(host.calls(HostOp::Merge), 0);
        assert_eq!(host.pull_requests("acme", "widgets")[0].1, PullState::Open);
    }

    #[tokio::test]
    async fn test_invalid_pr_gets_changes_requested() {
        let host = host();
        let pr = open_pr(&host, "silent-refactor/src-app-ts", "tangled()\n").await;

        let result = reviewer(host.clone(), true)
            .review_pr("acme", "widgets", pr.number)
            .await
            .unwrap();
        assert!(!result.is_valid);
        match &host.reviews("acme", "widgets", pr.number)[0] {
            ReviewAction::ChangesRequested(feedback) => assert!(feedback.contains("God function")),
            other => panic!("expected changes requested, got {:?}", other),
        }
        assert_eq!(host.calls(HostOp::Approve), 0);
    }

    #[tokio::test]
    async fn test_collaborator_failure_names_pr() {
        let host = host();
        let pr = open_pr(&host, "silent-refactor/src-app-ts", "x\n").await;
        host.fail_next(HostOp::GetPullRequestFiles, HostFailure::Unavailable);

        let err = reviewer(host.clone(), true)
            .review_pr("acme", "widgets", pr.number)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with(&format!("Failed to review PR #{}:", pr.number)));
        assert!(host.reviews("acme", "widgets", pr.number).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pr_is_not_found() {
        let err = reviewer(host(), true).review_pr("acme", "widgets", 99).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to review PR #99: Not found: open pull request #99"
        );
    }

    #[tokio::test]
    async fn test_closed_pr_is_no_longer_reviewable() {
        let host = host();
        let pr = open_pr(&host, "silent-refactor/src-app-ts", "export const app = 1;\n").await;
        let reviewer = reviewer(host.clone(), true);

        reviewer.close_pr("acme", "widgets", pr.number).await.unwrap();
        assert_eq!(host.pull_requests("acme", "widgets")[0].1, PullState::Closed);

        let err = reviewer.review_pr("acme", "widgets", pr.number).await.unwrap_err();
        assert!(matches!(err.root(), RefactorError::NotFound(_)));

        let err = reviewer.close_pr("acme", "widgets", 42).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to review PR #42:"));
    }

    #[tokio::test]
    async fn test_sweep_reviews_only_bot_prs_and_collects_failures() {
        let host = host();
        let human = open_pr(&host, "feature/login", "x\n").await;
        let first = open_pr(&host, "silent-refactor/one", "export const one = 1;\n").await;
        let second = open_pr(&host, "silent-refactor/two", "export const two = 2;\n").await;
        // First bot PR's file listing fails; the sweep moves on
        host.fail_next(HostOp::GetPullRequestFiles, HostFailure::Unavailable);

        let sweep = reviewer(host.clone(), false)
            .review_open_pull_requests("acme", "widgets")
            .await
            .unwrap();

        assert_eq!(sweep.failures.len(), 1);
        assert_eq!(sweep.failures[0].0, first.number);
        assert_eq!(sweep.reviewed.len(), 1);
        assert_eq!(sweep.reviewed[0].0, second.number);
        assert!(host.reviews("acme", "widgets", human.number).is_empty());
    }
}
