//! GitHub REST API client

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::client::{BranchRef, CodeHostClient, CodeHostError, FileCommit, FileDiff, NewPullRequest, PullRequest};

pub const GITHUB_API_URL: &str = "https://api.github.com";

pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

const API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = "silent-refactor";

const JSON_ACCEPT: &str = "application/vnd.github+json";

const RAW_ACCEPT: &str = "application/vnd.github.raw+json";

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct GitHubClient {
    client: Client,
    token: String,
    config: GitHubConfig,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    title: String,
    head: PullBranch,
    base: PullBranch,
}

#[derive(Deserialize)]
struct PullBranch {
    #[serde(rename = "ref")]
    name: String,
}

impl From<PullResponse> for PullRequest {
    fn from(pr: PullResponse) -> Self {
        Self {
            number: pr.number,
            url: pr.html_url,
            title: pr.title,
            head: pr.head.name,
            base: pr.base.name,
        }
    }
}

#[derive(Deserialize)]
struct PullFileResponse {
    filename: String,
    status: String,
    patch: Option<String>,
}

/// Human-readable message from an API error body
fn api_error_message(body: &str) -> String {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(body) {
        let detail = api_error
            .errors
            .first()
            .and_then(|e| e.message.clone())
            .unwrap_or_default();
        return if detail.is_empty() {
            api_error.message
        } else {
            format!("{}: {}", api_error.message, detail)
        };
    }

    if body.chars().count() > MAX_ERROR_BODY_LEN {
        let truncated: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{}... (truncated)", truncated)
    } else {
        body.to_string()
    }
}

impl GitHubClient {
    /// Create a client reading the token from `env_var`
    pub fn from_env(env_var: &str, config: GitHubConfig) -> Result<Self, CodeHostError> {
        let token = std::env::var(env_var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CodeHostError::Unauthorized(format!("environment variable {} not set", env_var)))?;
        Self::with_token(token, config)
    }

    pub fn with_token(token: String, config: GitHubConfig) -> Result<Self, CodeHostError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, token, config })
    }

    fn request(&self, method: Method, path: &str, accept: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        self.client
            .request(method, url)
            .header("Accept", accept)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send a request, mapping failure statuses onto `CodeHostError`
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, CodeHostError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers();
        let quota_exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "0");
        let retry_after = headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.unwrap_or_default();
        let message = api_error_message(&body);

        Err(match status.as_u16() {
            401 => CodeHostError::Unauthorized(message),
            403 if quota_exhausted || retry_after.is_some() => CodeHostError::RateLimited { retry_after },
            403 => CodeHostError::Unauthorized(message),
            404 => CodeHostError::NotFound(what.to_string()),
            429 => CodeHostError::RateLimited { retry_after },
            code => CodeHostError::Api { status: code, message },
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T, CodeHostError> {
        let response = self.send(builder, what).await?;
        response
            .json()
            .await
            .map_err(|e| CodeHostError::InvalidResponse(format!("{}: {}", what, e)))
    }

    /// Blob SHA of `path` on `branch`, if the file exists there
    async fn existing_file_sha(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Option<String>, CodeHostError> {
        let what = format!("{}/{}:{}@{}", owner, repo, path, branch);
        let builder = self
            .request(Method::GET, &format!("/repos/{}/{}/contents/{}", owner, repo, path), JSON_ACCEPT)
            .query(&[("ref", branch)]);

        match self.send_json::<ContentResponse>(builder, &what).await {
            Ok(content) => Ok(Some(content.sha)),
            Err(CodeHostError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn submit_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        event: &str,
        body: &str,
    ) -> Result<(), CodeHostError> {
        let builder = self
            .request(
                Method::POST,
                &format!("/repos/{}/{}/pulls/{}/reviews", owner, repo, number),
                JSON_ACCEPT,
            )
            .json(&json!({ "event": event, "body": body }));
        self.send(builder, &format!("{}/{}#{}", owner, repo, number)).await?;
        Ok(())
    }
}

#[async_trait]
impl CodeHostClient for GitHubClient {
    async fn list_files(&self, owner: &str, repo: &str) -> Result<Vec<String>, CodeHostError> {
        let builder = self
            .request(Method::GET, &format!("/repos/{}/{}/git/trees/HEAD", owner, repo), JSON_ACCEPT)
            .query(&[("recursive", "1")]);
        let tree: TreeResponse = self.send_json(builder, &format!("{}/{}", owner, repo)).await?;

        if tree.truncated {
            tracing::warn!(owner, repo, "Repository tree truncated, scanning a partial file list");
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<String, CodeHostError> {
        let mut builder = self.request(Method::GET, &format!("/repos/{}/{}/contents/{}", owner, repo, path), RAW_ACCEPT);
        if let Some(git_ref) = git_ref {
            builder = builder.query(&[("ref", git_ref)]);
        }
        let response = self.send(builder, &format!("{}/{}:{}", owner, repo, path)).await?;
        Ok(response.text().await?)
    }

    async fn default_branch(&self, owner: &str, repo: &str) -> Result<BranchRef, CodeHostError> {
        let what = format!("{}/{}", owner, repo);
        let repo_info: RepoResponse = self
            .send_json(self.request(Method::GET, &format!("/repos/{}/{}", owner, repo), JSON_ACCEPT), &what)
            .await?;

        let head: RefResponse = self
            .send_json(
                self.request(
                    Method::GET,
                    &format!("/repos/{}/{}/git/ref/heads/{}", owner, repo, repo_info.default_branch),
                    JSON_ACCEPT,
                ),
                &what,
            )
            .await?;

        Ok(BranchRef {
            name: repo_info.default_branch,
            sha: head.object.sha,
        })
    }

    async fn create_branch(&self, owner: &str, repo: &str, name: &str, from_sha: &str) -> Result<(), CodeHostError> {
        let builder = self
            .request(Method::POST, &format!("/repos/{}/{}/git/refs", owner, repo), JSON_ACCEPT)
            .json(&json!({ "ref": format!("refs/heads/{}", name), "sha": from_sha }));

        match self.send(builder, &format!("{}/{}", owner, repo)).await {
            Ok(_) => Ok(()),
            Err(CodeHostError::Api { status: 422, message }) if message.contains("already exists") => {
                tracing::debug!(owner, repo, branch = name, "Branch already exists, reusing");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn commit_file(&self, owner: &str, repo: &str, commit: &FileCommit) -> Result<(), CodeHostError> {
        let existing_sha = self.existing_file_sha(owner, repo, &commit.path, &commit.branch).await?;

        let mut body = json!({
            "message": commit.message,
            "content": BASE64.encode(commit.content.as_bytes()),
            "branch": commit.branch,
        });
        if let Some(sha) = existing_sha {
            body["sha"] = json!(sha);
        }

        let builder = self
            .request(
                Method::PUT,
                &format!("/repos/{}/{}/contents/{}", owner, repo, commit.path),
                JSON_ACCEPT,
            )
            .json(&body);
        self.send(builder, &format!("{}/{}:{}", owner, repo, commit.path)).await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, CodeHostError> {
        let builder = self
            .request(Method::POST, &format!("/repos/{}/{}/pulls", owner, repo), JSON_ACCEPT)
            .json(pr);
        let created: PullResponse = self.send_json(builder, &format!("{}/{}", owner, repo)).await?;
        Ok(created.into())
    }

    async fn list_open_pull_requests(&self, owner: &str, repo: &str) -> Result<Vec<PullRequest>, CodeHostError> {
        let builder = self
            .request(Method::GET, &format!("/repos/{}/{}/pulls", owner, repo), JSON_ACCEPT)
            .query(&[("state", "open"), ("per_page", "100")]);
        let pulls: Vec<PullResponse> = self.send_json(builder, &format!("{}/{}", owner, repo)).await?;
        Ok(pulls.into_iter().map(PullRequest::from).collect())
    }

    async fn get_pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<FileDiff>, CodeHostError> {
        let builder = self
            .request(
                Method::GET,
                &format!("/repos/{}/{}/pulls/{}/files", owner, repo, number),
                JSON_ACCEPT,
            )
            .query(&[("per_page", "100")]);
        let files: Vec<PullFileResponse> = self
            .send_json(builder, &format!("{}/{}#{}", owner, repo, number))
            .await?;

        Ok(files
            .into_iter()
            .map(|f| FileDiff {
                path: f.filename,
                status: f.status,
                patch: f.patch,
            })
            .collect())
    }

    async fn approve(&self, owner: &str, repo: &str, number: u64, body: &str) -> Result<(), CodeHostError> {
        self.submit_review(owner, repo, number, "APPROVE", body).await
    }

    async fn merge(&self, owner: &str, repo: &str, number: u64) -> Result<(), CodeHostError> {
        let builder = self
            .request(
                Method::PUT,
                &format!("/repos/{}/{}/pulls/{}/merge", owner, repo, number),
                JSON_ACCEPT,
            )
            .json(&json!({ "merge_method": "squash" }));
        self.send(builder, &format!("{}/{}#{}", owner, repo, number)).await?;
        Ok(())
    }

    async fn request_changes(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        feedback: &str,
    ) -> Result<(), CodeHostError> {
        self.submit_review(owner, repo, number, "REQUEST_CHANGES", feedback).await
    }

    async fn close_pull_request(&self, owner: &str, repo: &str, number: u64) -> Result<(), CodeHostError> {
        let builder = self
            .request(Method::PATCH, &format!("/repos/{}/{}/pulls/{}", owner, repo, number), JSON_ACCEPT)
            .json(&json!({ "state": "closed" }));
        self.send(builder, &format!("{}/{}#{}", owner, repo, number)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.config.api_url)
            .finish_non_exhaustive()
    }
}
