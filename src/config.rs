use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use silent_refactor::analysis::{AnthropicConfig, DEFAULT_API_KEY_ENV};
use silent_refactor::codehost::{DEFAULT_TOKEN_ENV, GITHUB_API_URL, GitHubConfig};
use silent_refactor::queue::{DEFAULT_BRANCH_PREFIX, JobQueueConfig};
use silent_refactor::review::ReviewConfig;
use silent_refactor::scan::{PipelineConfig, default_extensions};
use silent_refactor::scheduler::{ANALYSIS_SERVICE, CODEHOST_SERVICE, RateLimitConfig, RefactorThresholds};
use silent_refactor::webhook::{DEFAULT_SECRET_ENV, WebhookConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub rate_limits: RateLimitsConfig,
    pub scan: ScanConfig,
    pub thresholds: ThresholdsConfig,
    pub jobs: JobsConfig,
    pub github: GitHubSection,
    pub analysis: AnalysisSection,
    pub review: ReviewSection,
    pub webhook: WebhookSection,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub limit: usize,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Quota per service name
    pub services: BTreeMap<String, QuotaConfig>,
    pub poll_interval_ms: u64,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            ANALYSIS_SERVICE.to_string(),
            QuotaConfig {
                limit: 10,
                window_secs: 60,
            },
        );
        services.insert(
            CODEHOST_SERVICE.to_string(),
            QuotaConfig {
                limit: 5000,
                window_secs: 3600,
            },
        );
        Self {
            services,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_workers: usize,
    /// 0 disables the deadline
    pub timeout_secs: u64,
    pub extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            timeout_secs: 600,
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub high_issues: usize,
    pub medium_issues: usize,
    pub min_score: u32,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        let defaults = RefactorThresholds::default();
        Self {
            high_issues: defaults.high_issues,
            medium_issues: defaults.medium_issues,
            min_score: defaults.min_score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub max_attempts: u32,
    /// Seconds a claim may stay in progress before it is released
    pub claim_lease_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            claim_lease_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSection {
    pub api_url: String,
    pub token_env: String,
    pub branch_prefix: String,
    pub timeout_ms: u64,
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            timeout_ms: 60000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub api_key_env: String,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        let defaults = AnthropicConfig::default();
        Self {
            api_url: defaults.api_url,
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            timeout_ms: defaults.timeout.as_millis() as u64,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSection {
    pub auto_merge: bool,
    pub min_merge_score: u32,
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            auto_merge: false,
            min_merge_score: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSection {
    pub secret_env: String,
    pub branches: Vec<String>,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            secret_env: DEFAULT_SECRET_ENV.to_string(),
            branches: WebhookConfig::default().branches,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("silent-refactor"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            rate_limits: RateLimitsConfig::default(),
            scan: ScanConfig::default(),
            thresholds: ThresholdsConfig::default(),
            jobs: JobsConfig::default(),
            github: GitHubSection::default(),
            analysis: AnalysisSection::default(),
            review: ReviewSection::default(),
            webhook: WebhookSection::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        let mut config = RateLimitConfig::default()
            .with_poll_interval(Duration::from_millis(self.rate_limits.poll_interval_ms.max(1)));
        for (service, quota) in &self.rate_limits.services {
            config = config.with_quota(service, quota.limit, Duration::from_secs(quota.window_secs));
        }
        config
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_workers: self.scan.max_workers.max(1),
            extensions: self.scan.extensions.clone(),
        }
    }

    pub fn thresholds(&self) -> RefactorThresholds {
        RefactorThresholds {
            high_issues: self.thresholds.high_issues,
            medium_issues: self.thresholds.medium_issues,
            min_score: self.thresholds.min_score,
        }
    }

    pub fn job_queue_config(&self) -> JobQueueConfig {
        JobQueueConfig {
            max_attempts: self.jobs.max_attempts,
            thresholds: self.thresholds(),
            branch_prefix: self.github.branch_prefix.clone(),
            scan_timeout: (self.scan.timeout_secs > 0).then(|| Duration::from_secs(self.scan.timeout_secs)),
            claim_lease: Duration::from_secs(self.jobs.claim_lease_secs),
        }
    }

    pub fn review_config(&self) -> ReviewConfig {
        ReviewConfig {
            auto_merge: self.review.auto_merge,
            min_merge_score: self.review.min_merge_score,
            branch_prefix: self.github.branch_prefix.clone(),
        }
    }

    pub fn webhook_config(&self) -> WebhookConfig {
        WebhookConfig {
            branches: self.webhook.branches.clone(),
            ..WebhookConfig::from_env(&self.webhook.secret_env)
        }
    }

    pub fn anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig {
            api_url: self.analysis.api_url.clone(),
            model: self.analysis.model.clone(),
            max_tokens: self.analysis.max_tokens,
            timeout: Duration::from_millis(self.analysis.timeout_ms),
        }
    }

    pub fn github_config(&self) -> GitHubConfig {
        GitHubConfig {
            api_url: self.github.api_url.clone(),
            timeout: Duration::from_millis(self.github.timeout_ms),
        }
    }
}
