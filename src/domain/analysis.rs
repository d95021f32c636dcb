//! Analysis result types produced during a scan
//!
//! These are ephemeral: produced and consumed within one scan pass. Only the
//! rollup survives, in repository counters and job metadata.

use serde::{Deserialize, Serialize};

/// Severity of a single issue reported by the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Weight used by the priority score
    pub fn weight(&self) -> u32 {
        match self {
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(alias = "importance")]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity) -> Self {
        Self {
            severity,
            title: None,
            description: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Structured output of one `analyze` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(alias = "suggestions")]
    pub issues: Vec<Issue>,
    /// Health score, 0-100, higher is healthier
    pub score: u32,
}

impl AnalysisResult {
    pub fn new(issues: Vec<Issue>, score: u32) -> Self {
        Self {
            issues,
            score: score.min(100),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has(&self, severity: Severity) -> bool {
        self.issues.iter().any(|i| i.severity == severity)
    }
}

/// A file's snapshot and its analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: String,
    /// Content as read at scan time
    pub content: String,
    pub analysis: AnalysisResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_files: usize,
    pub files_with_issues: usize,
    /// Files with at least one high-severity issue
    pub high_priority_issues: usize,
    /// Files with at least one medium-severity issue
    pub medium_priority_issues: usize,
    /// Files with at least one low-severity issue
    pub low_priority_issues: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub repository_score: u32,
    /// Ordered by descending priority score, ties in discovery order
    pub prioritized_files: Vec<FileAnalysis>,
    pub summary: ScanSummary,
}

impl ScanResult {
    /// Total number of issues across all analyzed files
    pub fn total_issues(&self) -> usize {
        self.prioritized_files.iter().map(|f| f.analysis.issues.len()).sum()
    }
}

/// Refactored content proposed for a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactorSuggestion {
    pub code: String,
    #[serde(default)]
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_weights() {
        assert_eq!(Severity::High.weight(), 3);
        assert_eq!(Severity::Medium.weight(), 2);
        assert_eq!(Severity::Low.weight(), 1);
    }

    #[test]
    fn test_analysis_result_clamps_score() {
        let result = AnalysisResult::new(vec![], 250);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_counts_by_severity() {
        let result = AnalysisResult::new(
            vec![
                Issue::new(Severity::High),
                Issue::new(Severity::Medium),
                Issue::new(Severity::Medium),
            ],
            50,
        );
        assert_eq!(result.count(Severity::High), 1);
        assert_eq!(result.count(Severity::Medium), 2);
        assert_eq!(result.count(Severity::Low), 0);
        assert!(result.has(Severity::High));
        assert!(!result.has(Severity::Low));
    }

    #[test]
    fn test_deserialize_accepts_suggestion_aliases() {
        let json = r#"{"suggestions":[{"importance":"high","title":"Unchecked null"}],"score":40}"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, Severity::High);
        assert_eq!(result.issues[0].title.as_deref(), Some("Unchecked null"));
    }

    #[test]
    fn test_deserialize_rejects_unknown_severity() {
        let json = r#"{"issues":[{"severity":"critical"}],"score":40}"#;
        assert!(serde_json::from_str::<AnalysisResult>(json).is_err());
    }
}
