//! Analysis service layer - classifies code and proposes refactors
//!
//! This module provides:
//! - AnalysisClient trait for the service seam
//! - AnthropicAnalysisClient backed by the Messages API
//! - FakeAnalysisClient for deterministic tests
//! - Prompt text and response parsing

pub mod anthropic;
pub mod client;
pub mod fake;
pub mod prompt;

pub use anthropic::{AnthropicAnalysisClient, AnthropicConfig, DEFAULT_API_KEY_ENV};
pub use client::{AnalysisClient, AnalysisError};
pub use fake::{FakeAnalysisClient, FakeFailure};
