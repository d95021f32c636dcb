//! Change-set classification for pull request review.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisClient;
use crate::domain::{AnalysisResult, Severity};
use crate::error::Result;
use crate::queue::DEFAULT_BRANCH_PREFIX;
use crate::scan::language_for_path;
use crate::scheduler::rate_limit::{ANALYSIS_SERVICE, RateLimiter};

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Merge approved pull requests that clear `min_merge_score`
    pub auto_merge: bool,
    pub min_merge_score: u32,
    /// Only pull requests from branches under this prefix are swept
    pub branch_prefix: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            auto_merge: false,
            min_merge_score: 70,
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
        }
    }
}

/// A changed file as it stands on the pull request's head branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub is_valid: bool,
    pub can_merge: bool,
    pub feedback: String,
    pub changes: Vec<ChangedFile>,
}

/// Decides whether a change set is acceptable.
#[async_trait]
pub trait ChangeClassifier: Send + Sync {
    async fn classify(&self, changes: Vec<ChangedFile>) -> Result<ReviewResult>;
}

/// Classifier backed by the analysis service.
///
/// A change set is valid when no file has a high-severity issue, and
/// mergeable when it is valid, auto-merge is on and every file scores at
/// least `min_merge_score`.
pub struct AnalysisClassifier {
    analysis: Arc<dyn AnalysisClient>,
    limiter: Arc<RateLimiter>,
    config: ReviewConfig,
}

impl AnalysisClassifier {
    pub fn new(analysis: Arc<dyn AnalysisClient>, limiter: Arc<RateLimiter>, config: ReviewConfig) -> Self {
        Self {
            analysis,
            limiter,
            config,
        }
    }
}

#[async_trait]
impl ChangeClassifier for AnalysisClassifier {
    async fn classify(&self, changes: Vec<ChangedFile>) -> Result<ReviewResult> {
        let mut results = Vec::with_capacity(changes.len());
        for change in &changes {
            self.limiter.wait_for_capacity(ANALYSIS_SERVICE).await;
            let result = self
                .analysis
                .analyze(&change.content, language_for_path(&change.path))
                .await?;
            results.push(result);
        }

        let is_valid = results.iter().all(|r| !r.has(Severity::High));
        let can_merge = is_valid
            && self.config.auto_merge
            && !results.is_empty()
            && results.iter().all(|r| r.score >= self.config.min_merge_score);

        let feedback = feedback(&changes, &results, is_valid);
        Ok(ReviewResult {
            is_valid,
            can_merge,
            feedback,
            changes,
        })
    }
}

fn feedback(changes: &[ChangedFile], results: &[AnalysisResult], is_valid: bool) -> String {
    if changes.is_empty() {
        return "Automated review completed: no reviewable changes".to_string();
    }

    let mut lines = Vec::new();
    if is_valid {
        lines.push(format!(
            "Automated review completed: {} file(s) checked, no blocking issues",
            changes.len()
        ));
    } else {
        lines.push("Automated review found blocking issues:".to_string());
    }

    for (change, result) in changes.iter().zip(results) {
        lines.push(format!("- {} (score {})", change.path, result.score));
        for issue in &result.issues {
            let severity = format!("{:?}", issue.severity).to_lowercase();
            let label = issue
                .title
                .as_deref()
                .or(issue.description.as_deref())
                .unwrap_or("unspecified issue");
            lines.push(format!("  - [{}] {}", severity, label));
        }
    }
    lines.join("\n")
}
