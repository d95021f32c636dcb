//! In-memory code host for tests and dry runs.
//!
//! Repositories are maps of branch name to files. Branch SHAs are synthetic
//! and change on every commit. Failures can be queued per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{BranchRef, CodeHostClient, CodeHostError, FileCommit, FileDiff, NewPullRequest, PullRequest};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    ListFiles,
    GetFileContent,
    DefaultBranch,
    CreateBranch,
    CommitFile,
    CreatePullRequest,
    ListOpenPullRequests,
    GetPullRequestFiles,
    Approve,
    Merge,
    RequestChanges,
    ClosePullRequest,
}

/// Failure kinds the fake can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFailure {
    Unavailable,
    NotFound,
    Unauthorized,
}

impl HostFailure {
    fn to_error(self, op: HostOp) -> CodeHostError {
        match self {
            HostFailure::Unavailable => CodeHostError::Api {
                status: 503,
                message: format!("{:?} unavailable", op),
            },
            HostFailure::NotFound => CodeHostError::NotFound(format!("{:?} target", op)),
            HostFailure::Unauthorized => CodeHostError::Unauthorized("Bad credentials".to_string()),
        }
    }
}

/// Review action recorded against a pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Approved(String),
    ChangesRequested(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullState {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone)]
struct Branch {
    sha: String,
    files: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct Pull {
    pr: PullRequest,
    state: PullState,
    reviews: Vec<ReviewAction>,
}

#[derive(Debug, Clone)]
struct Repo {
    default_branch: String,
    branches: HashMap<String, Branch>,
    pulls: Vec<Pull>,
}

#[derive(Debug, Default)]
struct HostState {
    repos: HashMap<String, Repo>,
    failures: VecDeque<(HostOp, HostFailure)>,
    calls: HashMap<HostOp, usize>,
    next_sha: u64,
}

impl HostState {
    fn sha(&mut self) -> String {
        self.next_sha += 1;
        format!("{:040x}", self.next_sha)
    }

    /// Record the call and pop the first queued failure for `op`.
    fn enter(&mut self, op: HostOp) -> Result<(), CodeHostError> {
        *self.calls.entry(op).or_default() += 1;
        let queued = self
            .failures
            .iter()
            .position(|(o, _)| *o == op)
            .and_then(|pos| self.failures.remove(pos));
        match queued {
            Some((_, failure)) => Err(failure.to_error(op)),
            None => Ok(()),
        }
    }

    fn repo(&mut self, owner: &str, repo: &str) -> Result<&mut Repo, CodeHostError> {
        self.repos
            .get_mut(&key(owner, repo))
            .ok_or_else(|| CodeHostError::NotFound(format!("{}/{}", owner, repo)))
    }
}

fn key(owner: &str, repo: &str) -> String {
    format!("{}/{}", owner, repo)
}

#[derive(Debug, Default)]
pub struct InMemoryCodeHost {
    state: Mutex<HostState>,
}

impl InMemoryCodeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a repository whose `main` branch holds `files`.
    pub fn add_repository(&self, owner: &str, repo: &str, files: &[(&str, &str)]) {
        let mut state = self.lock();
        let sha = state.sha();
        let files = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        let mut branches = HashMap::new();
        branches.insert("main".to_string(), Branch { sha, files });
        state.repos.insert(
            key(owner, repo),
            Repo {
                default_branch: "main".to_string(),
                branches,
                pulls: Vec::new(),
            },
        );
    }

    /// Queue a single failure for the next call of `op`.
    pub fn fail_next(&self, op: HostOp, failure: HostFailure) {
        self.lock().failures.push_back((op, failure));
    }

    pub fn calls(&self, op: HostOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Content of `path` on `branch`.
    pub fn file_on_branch(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Option<String> {
        let state = self.lock();
        state
            .repos
            .get(&key(owner, repo))?
            .branches
            .get(branch)?
            .files
            .get(path)
            .cloned()
    }

    pub fn branch_names(&self, owner: &str, repo: &str) -> Vec<String> {
        let state = self.lock();
        let mut names: Vec<String> = state
            .repos
            .get(&key(owner, repo))
            .map(|r| r.branches.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Every pull request ever opened, with its state.
    pub fn pull_requests(&self, owner: &str, repo: &str) -> Vec<(PullRequest, PullState)> {
        let state = self.lock();
        state
            .repos
            .get(&key(owner, repo))
            .map(|r| r.pulls.iter().map(|p| (p.pr.clone(), p.state)).collect())
            .unwrap_or_default()
    }

    pub fn reviews(&self, owner: &str, repo: &str, number: u64) -> Vec<ReviewAction> {
        let state = self.lock();
        state
            .repos
            .get(&key(owner, repo))
            .and_then(|r| r.pulls.iter().find(|p| p.pr.number == number))
            .map(|p| p.reviews.clone())
            .unwrap_or_default()
    }
}

fn pull_mut<'a>(repo: &'a mut Repo, owner: &str, name: &str, number: u64) -> Result<&'a mut Pull, CodeHostError> {
    repo.pulls
        .iter_mut()
        .find(|p| p.pr.number == number)
        .ok_or_else(|| CodeHostError::NotFound(format!("{}/{}#{}", owner, name, number)))
}

#[async_trait]
impl CodeHostClient for InMemoryCodeHost {
    async fn list_files(&self, owner: &str, repo: &str) -> Result<Vec<String>, CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::ListFiles)?;
        let repo = state.repo(owner, repo)?;
        Ok(repo
            .branches
            .get(&repo.default_branch)
            .map(|b| b.files.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<String, CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::GetFileContent)?;
        let repo_state = state.repo(owner, repo)?;
        let branch = git_ref.unwrap_or(repo_state.default_branch.as_str()).to_string();
        repo_state
            .branches
            .get(&branch)
            .and_then(|b| b.files.get(path))
            .cloned()
            .ok_or_else(|| CodeHostError::NotFound(format!("{}/{}:{}@{}", owner, repo, path, branch)))
    }

    async fn default_branch(&self, owner: &str, repo: &str) -> Result<BranchRef, CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::DefaultBranch)?;
        let repo_state = state.repo(owner, repo)?;
        let name = repo_state.default_branch.clone();
        let sha = repo_state
            .branches
            .get(&name)
            .map(|b| b.sha.clone())
            .ok_or_else(|| CodeHostError::NotFound(format!("{}/{}@{}", owner, repo, name)))?;
        Ok(BranchRef { name, sha })
    }

    async fn create_branch(&self, owner: &str, repo: &str, name: &str, from_sha: &str) -> Result<(), CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::CreateBranch)?;
        let repo_state = state.repo(owner, repo)?;
        if repo_state.branches.contains_key(name) {
            return Ok(());
        }
        let source = repo_state
            .branches
            .values()
            .find(|b| b.sha == from_sha)
            .cloned()
            .ok_or_else(|| CodeHostError::NotFound(format!("commit {}", from_sha)))?;
        repo_state.branches.insert(name.to_string(), source);
        Ok(())
    }

    async fn commit_file(&self, owner: &str, repo: &str, commit: &FileCommit) -> Result<(), CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::CommitFile)?;
        let sha = state.sha();
        let repo_state = state.repo(owner, repo)?;
        let branch = repo_state
            .branches
            .get_mut(&commit.branch)
            .ok_or_else(|| CodeHostError::NotFound(format!("{}/{}@{}", owner, repo, commit.branch)))?;
        branch.files.insert(commit.path.clone(), commit.content.clone());
        branch.sha = sha;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::CreatePullRequest)?;
        let repo_state = state.repo(owner, repo)?;
        if !repo_state.branches.contains_key(&pr.head) {
            return Err(CodeHostError::Api {
                status: 422,
                message: format!("Validation Failed: head {} does not exist", pr.head),
            });
        }
        if repo_state
            .pulls
            .iter()
            .any(|p| p.state == PullState::Open && p.pr.head == pr.head)
        {
            return Err(CodeHostError::Api {
                status: 422,
                message: format!("Validation Failed: A pull request already exists for {}", pr.head),
            });
        }

        let number = repo_state.pulls.len() as u64 + 1;
        let created = PullRequest {
            number,
            url: format!("https://github.com/{}/{}/pull/{}", owner, repo, number),
            title: pr.title.clone(),
            head: pr.head.clone(),
            base: pr.base.clone(),
        };
        repo_state.pulls.push(Pull {
            pr: created.clone(),
            state: PullState::Open,
            reviews: Vec::new(),
        });
        Ok(created)
    }

    async fn list_open_pull_requests(&self, owner: &str, repo: &str) -> Result<Vec<PullRequest>, CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::ListOpenPullRequests)?;
        let repo_state = state.repo(owner, repo)?;
        Ok(repo_state
            .pulls
            .iter()
            .filter(|p| p.state == PullState::Open)
            .map(|p| p.pr.clone())
            .collect())
    }

    async fn get_pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<FileDiff>, CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::GetPullRequestFiles)?;
        let repo_state = state.repo(owner, repo)?;
        let pull = repo_state
            .pulls
            .iter()
            .find(|p| p.pr.number == number)
            .ok_or_else(|| CodeHostError::NotFound(format!("{}/{}#{}", owner, repo, number)))?;

        let empty = BTreeMap::new();
        let base = repo_state.branches.get(&pull.pr.base).map(|b| &b.files).unwrap_or(&empty);
        let head = repo_state.branches.get(&pull.pr.head).map(|b| &b.files).unwrap_or(&empty);

        let mut diffs = Vec::new();
        for (path, content) in head {
            match base.get(path) {
                None => diffs.push(diff(path, "added")),
                Some(old) if old != content => diffs.push(diff(path, "modified")),
                _ => {}
            }
        }
        for path in base.keys().filter(|p| !head.contains_key(*p)) {
            diffs.push(diff(path, "removed"));
        }
        Ok(diffs)
    }

    async fn approve(&self, owner: &str, repo: &str, number: u64, body: &str) -> Result<(), CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::Approve)?;
        let repo_state = state.repo(owner, repo)?;
        pull_mut(repo_state, owner, repo, number)?
            .reviews
            .push(ReviewAction::Approved(body.to_string()));
        Ok(())
    }

    async fn merge(&self, owner: &str, repo: &str, number: u64) -> Result<(), CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::Merge)?;
        let sha = state.sha();
        let repo_state = state.repo(owner, repo)?;
        let pull = pull_mut(repo_state, owner, repo, number)?;
        if pull.state != PullState::Open {
            return Err(CodeHostError::Api {
                status: 405,
                message: "Pull Request is not mergeable".to_string(),
            });
        }
        pull.state = PullState::Merged;
        let (head, base) = (pull.pr.head.clone(), pull.pr.base.clone());

        let head_files = repo_state.branches.get(&head).map(|b| b.files.clone()).unwrap_or_default();
        if let Some(base_branch) = repo_state.branches.get_mut(&base) {
            base_branch.files.extend(head_files);
            base_branch.sha = sha;
        }
        Ok(())
    }

    async fn request_changes(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        feedback: &str,
    ) -> Result<(), CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::RequestChanges)?;
        let repo_state = state.repo(owner, repo)?;
        pull_mut(repo_state, owner, repo, number)?
            .reviews
            .push(ReviewAction::ChangesRequested(feedback.to_string()));
        Ok(())
    }

    async fn close_pull_request(&self, owner: &str, repo: &str, number: u64) -> Result<(), CodeHostError> {
        let mut state = self.lock();
        state.enter(HostOp::ClosePullRequest)?;
        let repo_state = state.repo(owner, repo)?;
        let pull = pull_mut(repo_state, owner, repo, number)?;
        if pull.state == PullState::Open {
            pull.state = PullState::Closed;
        }
        Ok(())
    }
}

fn diff(path: &str, status: &str) -> FileDiff {
    FileDiff {
        path: path.to_string(),
        status: status.to_string(),
        patch: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> InMemoryCodeHost {
        let host = InMemoryCodeHost::new();
        host.add_repository("acme", "widgets", &[("b.ts", "b"), ("a.ts", "a")]);
        host
    }

    #[tokio::test]
    async fn test_list_files_sorted() {
        let host = host();
        assert_eq!(host.list_files("acme", "widgets").await.unwrap(), vec!["a.ts", "b.ts"]);
        assert!(matches!(
            host.list_files("acme", "missing").await,
            Err(CodeHostError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_branch_commit_pr_merge() {
        let host = host();
        let main = host.default_branch("acme", "widgets").await.unwrap();
        host.create_branch("acme", "widgets", "bot/a", &main.sha).await.unwrap();
        // Idempotent
        host.create_branch("acme", "widgets", "bot/a", &main.sha).await.unwrap();

        let commit = FileCommit {
            path: "a.ts".to_string(),
            content: "a2".to_string(),
            branch: "bot/a".to_string(),
            message: "m".to_string(),
        };
        host.commit_file("acme", "widgets", &commit).await.unwrap();
        assert_eq!(host.file_on_branch("acme", "widgets", "main", "a.ts").as_deref(), Some("a"));

        let pr = host
            .create_pull_request(
                "acme",
                "widgets",
                &NewPullRequest {
                    title: "t".to_string(),
                    head: "bot/a".to_string(),
                    base: "main".to_string(),
                    body: String::new(),
                },
            )
            .await
            .unwrap();

        let files = host.get_pull_request_files("acme", "widgets", pr.number).await.unwrap();
        assert_eq!(files, vec![diff("a.ts", "modified")]);

        host.merge("acme", "widgets", pr.number).await.unwrap();
        assert_eq!(host.file_on_branch("acme", "widgets", "main", "a.ts").as_deref(), Some("a2"));
        assert!(host.list_open_pull_requests("acme", "widgets").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed_once() {
        let host = host();
        host.fail_next(HostOp::ListFiles, HostFailure::Unavailable);

        assert!(host.list_files("acme", "widgets").await.is_err());
        assert!(host.list_files("acme", "widgets").await.is_ok());
        assert_eq!(host.calls(HostOp::ListFiles), 2);
    }

    #[tokio::test]
    async fn test_closed_pull_request_leaves_open_list() {
        let host = host();
        let main = host.default_branch("acme", "widgets").await.unwrap();
        host.create_branch("acme", "widgets", "bot/b", &main.sha).await.unwrap();
        let pr = host
            .create_pull_request(
                "acme",
                "widgets",
                &NewPullRequest {
                    title: "t".to_string(),
                    head: "bot/b".to_string(),
                    base: "main".to_string(),
                    body: String::new(),
                },
            )
            .await
            .unwrap();

        host.close_pull_request("acme", "widgets", pr.number).await.unwrap();

        assert!(host.list_open_pull_requests("acme", "widgets").await.unwrap().is_empty());
        assert_eq!(host.pull_requests("acme", "widgets")[0].1, PullState::Closed);
        assert!(host.merge("acme", "widgets", pr.number).await.is_err());
    }
}
