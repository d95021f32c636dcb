//! Priority calculation for analyzed files.
//!
//! Files are scored by a weighted issue count (high 3, medium 2, low 1).
//! The repository health score starts at 100 and loses 5 points per unit of
//! file score, saturating at 0.

use crate::domain::{FileAnalysis, Issue, ScanResult, ScanSummary, Severity};

/// Health points lost per unit of issue score.
pub const REPOSITORY_PENALTY_PER_POINT: u32 = 5;
/// Best possible repository score.
pub const MAX_REPOSITORY_SCORE: u32 = 100;

/// Weighted sum of issue severities.
pub fn score(issues: &[Issue]) -> u32 {
    issues.iter().map(|i| i.severity.weight()).sum()
}

pub fn file_score(file: &FileAnalysis) -> u32 {
    score(&file.analysis.issues)
}

/// Repository health: `max(100 - 5 * sum(file scores), 0)`.
pub fn repository_score(files: &[FileAnalysis]) -> u32 {
    let total: u32 = files.iter().map(file_score).sum();
    MAX_REPOSITORY_SCORE.saturating_sub(total.saturating_mul(REPOSITORY_PENALTY_PER_POINT))
}

/// Order files by descending score. Ties keep their input order.
pub fn prioritize(mut files: Vec<FileAnalysis>) -> Vec<FileAnalysis> {
    // sort_by is stable
    files.sort_by(|a, b| file_score(b).cmp(&file_score(a)));
    files
}

/// Thresholds above which a file is worth an automated refactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefactorThresholds {
    /// Minimum number of high-severity issues.
    pub high_issues: usize,
    /// Minimum number of medium-severity issues.
    pub medium_issues: usize,
    /// Analysis scores strictly below this qualify.
    pub min_score: u32,
}

impl Default for RefactorThresholds {
    fn default() -> Self {
        Self {
            high_issues: 1,
            medium_issues: 3,
            min_score: 60,
        }
    }
}

/// True when any one threshold is crossed.
pub fn needs_refactor(file: &FileAnalysis, thresholds: &RefactorThresholds) -> bool {
    let analysis = &file.analysis;
    analysis.count(Severity::High) >= thresholds.high_issues
        || analysis.count(Severity::Medium) >= thresholds.medium_issues
        || analysis.score < thresholds.min_score
}

/// Aggregate per-file analyses into a scan result.
///
/// `files` must be in discovery order; the summary counts files, so a file
/// with two high issues counts once towards `high_priority_issues`.
pub fn summarize(files: Vec<FileAnalysis>) -> ScanResult {
    let summary = ScanSummary {
        total_files: files.len(),
        files_with_issues: files.iter().filter(|f| !f.analysis.issues.is_empty()).count(),
        high_priority_issues: files.iter().filter(|f| f.analysis.has(Severity::High)).count(),
        medium_priority_issues: files.iter().filter(|f| f.analysis.has(Severity::Medium)).count(),
        low_priority_issues: files.iter().filter(|f| f.analysis.has(Severity::Low)).count(),
    };
    let repository_score = repository_score(&files);

    ScanResult {
        repository_score,
        prioritized_files: prioritize(files),
        summary,
    }
}
