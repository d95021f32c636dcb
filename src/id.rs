//! ID generation utilities
//!
//! Provides functions for generating identifiers for jobs, repositories and events,
//! and the deterministic branch names used for refactor pull requests.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn generate_id(prefix: &str) -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("{}-{}-{:04x}", prefix, timestamp, random)
}

/// Generate a job ID
///
/// Format: `job-{timestamp_ms}-{random_hex}`
pub fn generate_job_id() -> String {
    generate_id("job")
}

/// Generate a repository ID
///
/// Format: `repo-{timestamp_ms}-{random_hex}`
pub fn generate_repository_id() -> String {
    generate_id("repo")
}

/// Generate an event ID
///
/// Format: `evt-{timestamp_ms}-{random_hex}`
pub fn generate_event_id() -> String {
    generate_id("evt")
}

/// Deterministic branch name for a file path.
///
/// Repeated runs against the same file converge on the same branch:
/// `src/lib/Api Client.ts` under prefix `silent-refactor` becomes
/// `silent-refactor/src-lib-api-client-ts`.
pub fn branch_name_for_path(prefix: &str, path: &str) -> String {
    let mut slug = String::with_capacity(path.len());
    let mut last_dash = true;
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-');
    format!("{}/{}", prefix.trim_end_matches('/'), slug)
}
