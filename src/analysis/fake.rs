//! Deterministic in-process analysis client.
//!
//! Responses are scripted by content marker: the first rule whose marker
//! appears in the analyzed content wins. Unmatched content gets the default.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::client::{AnalysisClient, AnalysisError};
use crate::domain::{AnalysisResult, RefactorSuggestion};

/// Failure kinds the fake can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    Transient,
    Malformed,
    Unauthorized,
}

impl FakeFailure {
    fn to_error(self) -> AnalysisError {
        match self {
            FakeFailure::Transient => AnalysisError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            },
            FakeFailure::Malformed => AnalysisError::Malformed("unparseable response".to_string()),
            FakeFailure::Unauthorized => AnalysisError::Api {
                status: 401,
                message: "invalid api key".to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub struct FakeAnalysisClient {
    default_result: AnalysisResult,
    results: Vec<(String, AnalysisResult)>,
    failures: Mutex<Vec<(String, FakeFailure, Option<usize>)>>,
    refactors: Vec<(String, RefactorSuggestion)>,
    refactor_failures: Vec<(String, FakeFailure)>,
    analyze_calls: AtomicUsize,
    refactor_calls: AtomicUsize,
}

impl Default for FakeAnalysisClient {
    fn default() -> Self {
        Self::new(AnalysisResult::new(Vec::new(), 100))
    }
}

impl FakeAnalysisClient {
    pub fn new(default_result: AnalysisResult) -> Self {
        Self {
            default_result,
            results: Vec::new(),
            failures: Mutex::new(Vec::new()),
            refactors: Vec::new(),
            refactor_failures: Vec::new(),
            analyze_calls: AtomicUsize::new(0),
            refactor_calls: AtomicUsize::new(0),
        }
    }

    /// Return `result` for content containing `marker`.
    pub fn with_result(mut self, marker: &str, result: AnalysisResult) -> Self {
        self.results.push((marker.to_string(), result));
        self
    }

    /// Always fail `analyze` for content containing `marker`.
    pub fn failing_on(self, marker: &str, failure: FakeFailure) -> Self {
        self.push_failure(marker, failure, None);
        self
    }

    /// Fail `analyze` for content containing `marker` the next `times` calls.
    pub fn failing_times(self, marker: &str, failure: FakeFailure, times: usize) -> Self {
        self.push_failure(marker, failure, Some(times));
        self
    }

    /// Return `suggestion` when refactoring content containing `marker`.
    pub fn with_refactor(mut self, marker: &str, suggestion: RefactorSuggestion) -> Self {
        self.refactors.push((marker.to_string(), suggestion));
        self
    }

    /// Always fail `refactor` for content containing `marker`.
    pub fn failing_refactor_on(mut self, marker: &str, failure: FakeFailure) -> Self {
        self.refactor_failures.push((marker.to_string(), failure));
        self
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn refactor_calls(&self) -> usize {
        self.refactor_calls.load(Ordering::SeqCst)
    }

    fn push_failure(&self, marker: &str, failure: FakeFailure, times: Option<usize>) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.push((marker.to_string(), failure, times));
    }

    fn take_failure(&self, content: &str) -> Option<FakeFailure> {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let rule = failures
            .iter_mut()
            .find(|(marker, _, remaining)| content.contains(marker.as_str()) && *remaining != Some(0))?;
        if let Some(remaining) = rule.2.as_mut() {
            *remaining -= 1;
        }
        Some(rule.1)
    }
}

#[async_trait]
impl AnalysisClient for FakeAnalysisClient {
    async fn analyze(&self, content: &str, _language: &str) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = self.take_failure(content) {
            return Err(failure.to_error());
        }

        let result = self
            .results
            .iter()
            .find(|(marker, _)| content.contains(marker.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.default_result.clone());
        Ok(result)
    }

    async fn refactor(&self, content: &str, _language: &str) -> Result<RefactorSuggestion, AnalysisError> {
        self.refactor_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((_, failure)) = self
            .refactor_failures
            .iter()
            .find(|(marker, _)| content.contains(marker.as_str()))
        {
            return Err(failure.to_error());
        }

        let suggestion = self
            .refactors
            .iter()
            .find(|(marker, _)| content.contains(marker.as_str()))
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| RefactorSuggestion {
                code: format!("{}\n// refactored\n", content.trim_end()),
                explanation: "Tidied structure".to_string(),
            });
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Issue, Severity};

    #[tokio::test]
    async fn test_scripted_results() {
        let bad = AnalysisResult::new(vec![Issue::new(Severity::High)], 30);
        let client = FakeAnalysisClient::default().with_result("BAD", bad.clone());

        assert_eq!(client.analyze("this is BAD code", "Rust").await.unwrap(), bad);
        assert!(client.analyze("fine", "Rust").await.unwrap().issues.is_empty());
        assert_eq!(client.analyze_calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_times_then_recovers() {
        let client = FakeAnalysisClient::default().failing_times("flaky", FakeFailure::Transient, 1);

        assert!(client.analyze("flaky", "Rust").await.is_err());
        assert!(client.analyze("flaky", "Rust").await.is_ok());
    }

    #[tokio::test]
    async fn test_default_refactor_differs_from_input() {
        let client = FakeAnalysisClient::default();
        let suggestion = client.refactor("let a = 1;", "Rust").await.unwrap();
        assert_ne!(suggestion.code, "let a = 1;");
        assert_eq!(client.refactor_calls(), 1);
    }
}
