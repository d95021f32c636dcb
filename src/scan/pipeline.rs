//! Repository scan: enumerate, read, analyze, prioritize.
//!
//! Per-file work runs concurrently up to a bounded fan-out, each call gated
//! by the rate limiter. A file that fails is logged and dropped; only a
//! failure to enumerate the repository fails the scan.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::languages::{default_extensions, is_code_file, language_for_path};
use crate::analysis::AnalysisClient;
use crate::codehost::CodeHostClient;
use crate::domain::{FileAnalysis, ScanResult};
use crate::error::{RefactorError, Result};
use crate::scheduler::priority::summarize;
use crate::scheduler::rate_limit::{ANALYSIS_SERVICE, CODEHOST_SERVICE, RateLimiter};

/// Scan pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on concurrent per-file analyses.
    pub max_workers: usize,
    /// Recognized code file extensions.
    pub extensions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            extensions: default_extensions(),
        }
    }
}

pub struct ScanPipeline {
    host: Arc<dyn CodeHostClient>,
    analysis: Arc<dyn AnalysisClient>,
    limiter: Arc<RateLimiter>,
    config: PipelineConfig,
}

impl ScanPipeline {
    pub fn new(
        host: Arc<dyn CodeHostClient>,
        analysis: Arc<dyn AnalysisClient>,
        limiter: Arc<RateLimiter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            host,
            analysis,
            limiter,
            config,
        }
    }

    /// Concurrent analyses: the smaller of the analysis quota and the worker count.
    pub fn fan_out(&self) -> usize {
        let quota = self
            .limiter
            .quota(ANALYSIS_SERVICE)
            .map(|q| q.limit)
            .unwrap_or(usize::MAX);
        quota.min(self.config.max_workers).max(1)
    }

    /// Scan `owner/repo` and return its prioritized analysis.
    ///
    /// Fails with a scan error if the file list cannot be read, or if a
    /// per-file call reports a fatal configuration problem.
    pub async fn scan_repository(&self, owner: &str, repo: &str) -> Result<ScanResult> {
        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        let files = self
            .host
            .list_files(owner, repo)
            .await
            .map_err(|e| RefactorError::scan(owner, repo, e.into()))?;

        let candidates: Vec<String> = files
            .into_iter()
            .filter(|path| is_code_file(path, &self.config.extensions))
            .collect();

        tracing::info!(
            owner,
            repo,
            candidates = candidates.len(),
            fan_out = self.fan_out(),
            "Scanning repository"
        );

        let mut outcomes = stream::iter(candidates.into_iter().enumerate())
            .map(|(idx, path)| async move {
                let outcome = self.analyze_file(owner, repo, &path).await;
                (idx, path, outcome)
            })
            .buffer_unordered(self.fan_out())
            .collect::<Vec<_>>()
            .await;

        // Back to discovery order so ties in priority stay deterministic
        outcomes.sort_by_key(|(idx, _, _)| *idx);

        let mut analyses = Vec::with_capacity(outcomes.len());
        let mut failed = 0usize;
        for (_, path, outcome) in outcomes {
            match outcome {
                Ok(analysis) => analyses.push(analysis),
                Err(e) if e.is_fatal() => return Err(RefactorError::scan(owner, repo, e)),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(owner, repo, path = %path, error = %e, "File analysis failed, excluding from scan");
                }
            }
        }

        let result = summarize(analyses);
        tracing::info!(
            owner,
            repo,
            analyzed = result.summary.total_files,
            failed,
            score = result.repository_score,
            "Scan complete"
        );
        Ok(result)
    }

    async fn analyze_file(&self, owner: &str, repo: &str, path: &str) -> Result<FileAnalysis> {
        self.limiter.wait_for_capacity(CODEHOST_SERVICE).await;
        let content = self.host.get_file_content(owner, repo, path, None).await?;

        self.limiter.wait_for_capacity(ANALYSIS_SERVICE).await;
        let analysis = self.analysis.analyze(&content, language_for_path(path)).await?;

        Ok(FileAnalysis {
            path: path.to_string(),
            content,
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, FakeAnalysisClient, FakeFailure};
    use crate::codehost::{HostFailure, HostOp, InMemoryCodeHost};
    use crate::domain::{AnalysisResult, Issue, RefactorSuggestion, Severity};
    use crate::scheduler::rate_limit::RateLimitConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pipeline(host: Arc<InMemoryCodeHost>, analysis: Arc<dyn AnalysisClient>) -> (ScanPipeline, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig::default()
                .with_quota(ANALYSIS_SERVICE, 1000, Duration::from_secs(60))
                .with_poll_interval(Duration::from_millis(5)),
        ));
        let pipeline = ScanPipeline::new(host, analysis, Arc::clone(&limiter), PipelineConfig::default());
        (pipeline, limiter)
    }

    fn ten_files() -> Vec<(String, String)> {
        (0..10)
            .map(|i| {
                let marker = if i == 3 || i == 7 { "FAIL" } else { "ok" };
                (format!("src/file{}.ts", i), format!("// {} {}", marker, i))
            })
            .collect()
    }

    fn host_with(files: &[(String, String)]) -> Arc<InMemoryCodeHost> {
        let host = InMemoryCodeHost::new();
        let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
        host.add_repository("acme", "widgets", &refs);
        Arc::new(host)
    }

    #[tokio::test]
    async fn test_partial_failures_are_excluded() {
        let host = host_with(&ten_files());
        let analysis = Arc::new(FakeAnalysisClient::default().failing_on("FAIL", FakeFailure::Malformed));
        let (pipeline, _) = pipeline(host, analysis.clone());

        let result = pipeline.scan_repository("acme", "widgets").await.unwrap();

        assert_eq!(result.summary.total_files, 8);
        assert_eq!(analysis.analyze_calls(), 10);
        assert!(result.prioritized_files.iter().all(|f| !f.content.contains("FAIL")));
    }

    #[tokio::test]
    async fn test_filters_non_code_files() {
        let files = vec![
            ("README.md".to_string(), "# hi".to_string()),
            ("src/a.py".to_string(), "print(1)".to_string()),
            ("assets/logo.png".to_string(), "bin".to_string()),
        ];
        let host = host_with(&files);
        let analysis = Arc::new(FakeAnalysisClient::default());
        let (pipeline, _) = pipeline(host, analysis.clone());

        let result = pipeline.scan_repository("acme", "widgets").await.unwrap();
        assert_eq!(result.summary.total_files, 1);
        assert_eq!(result.prioritized_files[0].path, "src/a.py");
        assert_eq!(analysis.analyze_calls(), 1);
    }

    #[tokio::test]
    async fn test_prioritized_order_is_deterministic() {
        let files = vec![
            ("a.ts".to_string(), "medium".to_string()),
            ("b.ts".to_string(), "high".to_string()),
            ("c.ts".to_string(), "medium".to_string()),
        ];
        let host = host_with(&files);
        let analysis = Arc::new(
            FakeAnalysisClient::default()
                .with_result("high", AnalysisResult::new(vec![Issue::new(Severity::High); 3], 20))
                .with_result("medium", AnalysisResult::new(vec![Issue::new(Severity::Medium); 2], 70)),
        );
        let (pipeline, _) = pipeline(host, analysis);

        for _ in 0..3 {
            let result = pipeline.scan_repository("acme", "widgets").await.unwrap();
            let order: Vec<&str> = result.prioritized_files.iter().map(|f| f.path.as_str()).collect();
            assert_eq!(order, vec!["b.ts", "a.ts", "c.ts"]);
            assert_eq!(result.repository_score, 0);
        }
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_scan_error() {
        let host = host_with(&ten_files());
        host.fail_next(HostOp::ListFiles, HostFailure::Unavailable);
        let (pipeline, _) = pipeline(host, Arc::new(FakeAnalysisClient::default()));

        let err = pipeline.scan_repository("acme", "widgets").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to scan repository acme/widgets"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_repository_is_not_found() {
        let host = Arc::new(InMemoryCodeHost::new());
        let (pipeline, _) = pipeline(host, Arc::new(FakeAnalysisClient::default()));

        let err = pipeline.scan_repository("acme", "gone").await.unwrap_err();
        assert!(matches!(err.root(), RefactorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fatal_analysis_aborts_scan() {
        let host = host_with(&ten_files());
        let analysis = Arc::new(FakeAnalysisClient::default().failing_on("FAIL", FakeFailure::Unauthorized));
        let (pipeline, _) = pipeline(host, analysis);

        let err = pipeline.scan_repository("acme", "widgets").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_every_call_is_gated() {
        let host = host_with(&ten_files());
        let (pipeline, limiter) = pipeline(host, Arc::new(FakeAnalysisClient::default()));

        pipeline.scan_repository("acme", "widgets").await.unwrap();
        assert_eq!(limiter.in_window(CODEHOST_SERVICE), 11);
        assert_eq!(limiter.in_window(ANALYSIS_SERVICE), 10);
    }

    #[test]
    fn test_fan_out_bounded_by_quota() {
        let host = Arc::new(InMemoryCodeHost::new());
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig::default().with_quota(ANALYSIS_SERVICE, 2, Duration::from_secs(60)),
        ));
        let pipeline = ScanPipeline::new(
            host,
            Arc::new(FakeAnalysisClient::default()),
            limiter,
            PipelineConfig::default(),
        );
        assert_eq!(pipeline.fan_out(), 2);
    }

    /// Tracks the peak number of in-flight analyses.
    #[derive(Default)]
    struct ConcurrencyGauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisClient for ConcurrencyGauge {
        async fn analyze(&self, _content: &str, _language: &str) -> std::result::Result<AnalysisResult, AnalysisError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(AnalysisResult::new(Vec::new(), 100))
        }

        async fn refactor(&self, content: &str, _language: &str) -> std::result::Result<RefactorSuggestion, AnalysisError> {
            Ok(RefactorSuggestion {
                code: content.to_string(),
                explanation: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_fan_out_never_exceeds_workers() {
        let host = host_with(&ten_files());
        let gauge = Arc::new(ConcurrencyGauge::default());
        let limiter = Arc::new(RateLimiter::default());
        let config = PipelineConfig {
            max_workers: 3,
            ..PipelineConfig::default()
        };
        let pipeline = ScanPipeline::new(host, gauge.clone(), limiter, config);

        let result = pipeline.scan_repository("acme", "widgets").await.unwrap();
        assert_eq!(result.summary.total_files, 10);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    }
}
