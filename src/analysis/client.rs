//! Analysis service trait and error types

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AnalysisResult, RefactorSuggestion};
use crate::error::RefactorError;

/// Opaque code classifier. Each call is independent.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Classify `content` into structured issues and a health score.
    async fn analyze(&self, content: &str, language: &str) -> Result<AnalysisResult, AnalysisError>;

    /// Propose an improved version of `content`.
    async fn refactor(&self, content: &str, language: &str) -> Result<RefactorSuggestion, AnalysisError>;
}

/// Errors that can occur talking to the analysis service
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed analysis response: {0}")]
    Malformed(String),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },
}

impl AnalysisError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::RateLimited { .. } => true,
            AnalysisError::Api { status, .. } => *status >= 500,
            AnalysisError::Network(_) => true,
            AnalysisError::Malformed(_) => false,
            AnalysisError::MissingApiKey { .. } => false,
        }
    }
}

impl From<AnalysisError> for RefactorError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::MissingApiKey { .. } => RefactorError::FatalConfiguration(err.to_string()),
            AnalysisError::Api { status: 401 | 403, .. } => RefactorError::FatalConfiguration(err.to_string()),
            AnalysisError::Api { status: 404, .. } => RefactorError::NotFound(err.to_string()),
            AnalysisError::Malformed(msg) => RefactorError::MalformedAnalysis(msg),
            other => RefactorError::Transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(
            AnalysisError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );
        assert!(
            AnalysisError::Api {
                status: 503,
                message: "overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(
            !AnalysisError::Api {
                status: 400,
                message: "bad request".to_string()
            }
            .is_retryable()
        );
        assert!(!AnalysisError::Malformed("no json".to_string()).is_retryable());
    }

    #[test]
    fn test_taxonomy_mapping() {
        let fatal: RefactorError = AnalysisError::MissingApiKey {
            env_var: "KEY".to_string(),
        }
        .into();
        assert!(fatal.is_fatal());

        let unauthorized: RefactorError = AnalysisError::Api {
            status: 401,
            message: "invalid x-api-key".to_string(),
        }
        .into();
        assert!(unauthorized.is_fatal());

        let malformed: RefactorError = AnalysisError::Malformed("truncated".to_string()).into();
        assert!(matches!(malformed, RefactorError::MalformedAnalysis(_)));

        let limited: RefactorError = AnalysisError::RateLimited {
            retry_after: Duration::from_secs(1),
        }
        .into();
        assert!(matches!(limited, RefactorError::Transient(_)));
        assert!(!limited.is_fatal());
    }
}
