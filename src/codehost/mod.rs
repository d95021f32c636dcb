//! Code host layer - repository files, branches and pull requests
//!
//! `CodeHostClient` is the seam; `GitHubClient` talks to the GitHub REST API
//! and `InMemoryCodeHost` backs tests.

pub mod client;
pub mod fake;
pub mod github;

pub use client::{BranchRef, CodeHostClient, CodeHostError, FileCommit, FileDiff, NewPullRequest, PullRequest};
pub use fake::{HostFailure, HostOp, InMemoryCodeHost, PullState, ReviewAction};
pub use github::{DEFAULT_TOKEN_ENV, GITHUB_API_URL, GitHubClient, GitHubConfig};
