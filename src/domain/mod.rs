//! Domain types for Silent Refactor
//!
//! - RefactoringJob: per-repository unit of work and its state machine
//! - Repository: code-host coordinates plus scan status and counters
//! - Analysis types: issues, per-file analyses and scan results
//! - EventRecord: activity log entries

pub mod analysis;
pub mod event;
pub mod job;
pub mod repository;

pub use analysis::{AnalysisResult, FileAnalysis, Issue, RefactorSuggestion, ScanResult, ScanSummary, Severity};
pub use event::{EventRecord, event_types};
pub use job::{DEFAULT_MAX_ATTEMPTS, JobStatus, RefactoringJob};
pub use repository::{Repository, RepositoryStatus, parse_github_url};
