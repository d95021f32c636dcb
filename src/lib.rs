//! Silent Refactor - automated code-health scanning and refactor pull requests
//!
//! A periodic sweep enqueues one job per registered repository. Each job scans
//! the repository's code files through an analysis service, ranks them by
//! issue severity and opens a pull request for every file that crosses the
//! refactor thresholds. Bot pull requests are later reviewed, approved and
//! optionally merged.

pub mod analysis;
pub mod codehost;
pub mod domain;
pub mod error;
pub mod id;
pub mod monitor;
pub mod queue;
pub mod review;
pub mod scan;
pub mod scheduler;
pub mod storage;
pub mod webhook;

pub use error::{RefactorError, Result};
