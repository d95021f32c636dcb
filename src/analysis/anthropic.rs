//! Anthropic-backed analysis client
//!
//! Sends one stateless Messages API request per call and parses the JSON
//! object out of the text response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::client::{AnalysisClient, AnalysisError};
use super::prompt;
use crate::domain::{AnalysisResult, RefactorSuggestion};

/// Anthropic API URL
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub const DEFAULT_MAX_TOKENS: u32 = 4000;

pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Configuration for the Anthropic client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_url: ANTHROPIC_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(120),
        }
    }
}

impl AnthropicConfig {
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

pub struct AnthropicAnalysisClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
}

impl AnthropicAnalysisClient {
    /// Create a client reading the API key from `env_var`
    pub fn from_env(env_var: &str, config: AnthropicConfig) -> Result<Self, AnalysisError> {
        let api_key = std::env::var(env_var).map_err(|_| AnalysisError::MissingApiKey {
            env_var: env_var.to_string(),
        })?;
        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, api_key, config })
    }

    fn build_request(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": 0,
            "system": system,
            "messages": [{ "role": "user", "content": user }]
        })
    }

    /// Send a request and return the concatenated text blocks
    async fn send_request(&self, body: Value) -> Result<String, AnalysisError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(AnalysisError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Malformed(format!("response body is not JSON: {}", e)))?;

        let text = body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AnalysisError::Malformed("no text content in response".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl AnalysisClient for AnthropicAnalysisClient {
    async fn analyze(&self, content: &str, language: &str) -> Result<AnalysisResult, AnalysisError> {
        let body = self.build_request(
            prompt::ANALYSIS_SYSTEM_PROMPT,
            &prompt::analysis_prompt(content, language),
        );
        let text = self.send_request(body).await?;
        prompt::parse_analysis(&text)
    }

    async fn refactor(&self, content: &str, language: &str) -> Result<RefactorSuggestion, AnalysisError> {
        let body = self.build_request(
            prompt::REFACTOR_SYSTEM_PROMPT,
            &prompt::refactor_prompt(content, language),
        );
        let text = self.send_request(body).await?;
        prompt::parse_refactor(&text)
    }
}

impl std::fmt::Debug for AnthropicAnalysisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAnalysisClient")
            .field("api_url", &self.config.api_url)
            .field("model", &self.config.model)
            .finish()
    }
}
