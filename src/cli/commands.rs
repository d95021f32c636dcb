//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - repo: register/list repositories
//! - enqueue, sweep, work: queue a job, run a scan cycle, drain the queue
//! - review, close: review or close bot pull requests
//! - jobs, stats: inspection
//! - webhook: verify and handle a push delivery

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Silent Refactor - scans repositories and opens refactor pull requests
#[derive(Parser, Debug)]
#[command(name = "silent-refactor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Repository registration
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Queue a scan job for a repository unless one is already active
    Enqueue {
        /// Repository ID
        repository_id: String,
    },

    /// Run one scan cycle over every registered repository
    Sweep,

    /// Process queued jobs until the queue is empty
    Work {
        /// Stop after this many jobs
        #[arg(short, long)]
        max_jobs: Option<usize>,
    },

    /// Review open bot pull requests, or a single one
    Review {
        /// Repository owner
        owner: String,

        /// Repository name
        repo: String,

        /// Pull request number
        #[arg(long)]
        pr: Option<u64>,
    },

    /// Close a pull request without merging
    Close {
        /// Repository owner
        owner: String,

        /// Repository name
        repo: String,

        /// Pull request number
        pr: u64,
    },

    /// List jobs
    Jobs {
        /// Filter by status (pending, in_progress, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show job and pull request statistics
    Stats,

    /// Verify and handle a webhook delivery
    Webhook {
        /// File holding the raw payload
        #[arg(long)]
        payload: PathBuf,

        /// Value of the X-Hub-Signature-256 header
        #[arg(long)]
        signature: String,

        /// Value of the X-GitHub-Event header
        #[arg(long)]
        event: Option<String>,
    },
}

/// Repository subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum RepoCommands {
    /// Register a repository by its GitHub URL
    Add {
        /// e.g. https://github.com/acme/widgets
        url: String,
    },

    /// List registered repositories
    List,
}
