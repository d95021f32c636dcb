//! Repository record
//!
//! The core only reads code-host coordinates and writes status and counters
//! during a scan cycle. Ownership by a user account lives elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RefactorError, Result};
use crate::id::{generate_repository_id, now_ms};

/// Scan status shown to downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    Active,
    Scanning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub github_url: String,
    pub status: RepositoryStatus,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub open_prs: u32,
    pub issues_found: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Repository {
    /// Register a repository from its GitHub URL
    pub fn from_url(github_url: &str) -> Result<Self> {
        let (owner, name) = parse_github_url(github_url)?;
        let now = now_ms();
        Ok(Self {
            id: generate_repository_id(),
            owner,
            name,
            github_url: github_url.to_string(),
            status: RepositoryStatus::Active,
            last_scan_at: None,
            open_prs: 0,
            issues_found: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn mark_scanning(&mut self) {
        self.status = RepositoryStatus::Scanning;
        self.last_scan_at = Some(Utc::now());
        self.touch();
    }

    pub fn mark_scanned(&mut self, open_prs: u32, issues_found: u32) {
        self.status = RepositoryStatus::Active;
        self.open_prs = open_prs;
        self.issues_found = issues_found;
        self.touch();
    }

    pub fn mark_error(&mut self) {
        self.status = RepositoryStatus::Error;
        self.touch();
    }

    /// Update the timestamp
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

/// Extract `(owner, repo)` from a GitHub URL.
///
/// Accepts `https://github.com/acme/widgets`, `.git` suffixes and trailing
/// slashes; the last two path segments are taken.
pub fn parse_github_url(url: &str) -> Result<(String, String)> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let path = if let Some((_, rest)) = trimmed.split_once("://") {
        rest.split_once('/').map(|(_, path)| path).unwrap_or("")
    } else if let Some((_, path)) = trimmed.split_once(':') {
        path
    } else {
        trimmed
    };

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [.., owner, repo] => Ok((owner.to_string(), repo.to_string())),
        _ => Err(RefactorError::NotFound(format!("invalid repository URL: {}", url))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https_url() {
        let (owner, repo) = parse_github_url("https://github.com/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn test_parse_url_with_git_suffix_and_slash() {
        let (owner, repo) = parse_github_url("https://github.com/acme/widgets.git").unwrap();
        assert_eq!((owner.as_str(), repo.as_str()), ("acme", "widgets"));

        let (owner, repo) = parse_github_url("https://github.com/acme/widgets/").unwrap();
        assert_eq!((owner.as_str(), repo.as_str()), ("acme", "widgets"));
    }

    #[test]
    fn test_parse_ssh_url() {
        let (owner, repo) = parse_github_url("git@github.com:acme/widgets.git").unwrap();
        assert_eq!((owner.as_str(), repo.as_str()), ("acme", "widgets"));
    }

    #[test]
    fn test_parse_bare_coordinates() {
        let (owner, repo) = parse_github_url("acme/widgets").unwrap();
        assert_eq!((owner.as_str(), repo.as_str()), ("acme", "widgets"));
    }

    #[test]
    fn test_parse_invalid_url() {
        assert!(matches!(parse_github_url("https://github.com/"), Err(RefactorError::NotFound(_))));
        assert!(parse_github_url("widgets").is_err());
    }

    #[test]
    fn test_from_url_defaults() {
        let repo = Repository::from_url("https://github.com/acme/widgets").unwrap();
        assert!(repo.id.starts_with("repo-"));
        assert_eq!(repo.status, RepositoryStatus::Active);
        assert_eq!(repo.full_name(), "acme/widgets");
        assert!(repo.last_scan_at.is_none());
    }

    #[test]
    fn test_status_lifecycle() {
        let mut repo = Repository::from_url("https://github.com/acme/widgets").unwrap();
        repo.mark_scanning();
        assert_eq!(repo.status, RepositoryStatus::Scanning);
        assert!(repo.last_scan_at.is_some());

        repo.mark_scanned(2, 7);
        assert_eq!(repo.status, RepositoryStatus::Active);
        assert_eq!(repo.open_prs, 2);
        assert_eq!(repo.issues_found, 7);

        repo.mark_error();
        assert_eq!(repo.status, RepositoryStatus::Error);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&RepositoryStatus::Scanning).unwrap(), "\"scanning\"");
    }
}
