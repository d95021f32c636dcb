//! Review of bot-opened pull requests
//!
//! `PrReviewer` gathers a pull request's changes and acts on the verdict of a
//! `ChangeClassifier`; `AnalysisClassifier` is the analysis-backed default.

pub mod classifier;
pub mod reviewer;

pub use classifier::{AnalysisClassifier, ChangeClassifier, ChangedFile, ReviewConfig, ReviewResult};
pub use reviewer::{PrReviewer, ReviewSweep};
