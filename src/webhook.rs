//! GitHub push webhook handling
//!
//! Verifies the `X-Hub-Signature-256` header against the raw payload and, for
//! pushes to a tracked branch of a registered repository, enqueues a scan job
//! unless one is already active.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::domain::DEFAULT_MAX_ATTEMPTS;
use crate::error::RefactorError;
use crate::queue::enqueue_if_idle;
use crate::storage::{RepositoryStore, Storage};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const DEFAULT_SECRET_ENV: &str = "GITHUB_WEBHOOK_SECRET";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    MissingSecret,

    #[error("missing X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Refactor(#[from] RefactorError),
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared secret; `None` rejects every delivery
    pub secret: Option<String>,
    /// Branch names whose pushes trigger a scan
    pub branches: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            branches: vec!["main".to_string(), "master".to_string()],
        }
    }
}

impl WebhookConfig {
    /// Read the secret from `env_var`; empty counts as unset.
    pub fn from_env(env_var: &str) -> Self {
        Self {
            secret: std::env::var(env_var).ok().filter(|s| !s.is_empty()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// A new job was created
    Enqueued { job_id: String },
    /// The repository already has an active job
    AlreadyQueued,
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    repository: Option<PushRepository>,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    name: Option<String>,
    full_name: Option<String>,
    html_url: Option<String>,
    owner: Option<PushOwner>,
}

#[derive(Debug, Deserialize)]
struct PushOwner {
    login: Option<String>,
    name: Option<String>,
}

fn keyed(secret: &str, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(payload);
    Ok(mac)
}

/// `sha256=<hex>` signature of `payload` under `secret`.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, WebhookError> {
    let digest = keyed(secret, payload)?.finalize().into_bytes();
    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest)))
}

/// Check `signature` against `payload` in constant time.
pub fn verify_signature(secret: Option<&str>, payload: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
    let secret = secret.ok_or(WebhookError::MissingSecret)?;
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    let digest = signature
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(WebhookError::InvalidSignature)?;
    let expected = hex::decode(digest).map_err(|_| WebhookError::InvalidSignature)?;

    keyed(secret, payload)?
        .verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

pub struct WebhookHandler {
    config: WebhookConfig,
    max_attempts: u32,
}

impl WebhookHandler {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Attempts allowed for jobs this handler creates.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Verify and act on one delivery.
    ///
    /// `event` is the `X-GitHub-Event` header when known; anything other than
    /// `push` is ignored after verification.
    pub fn handle<S: Storage>(
        &self,
        storage: &S,
        event: Option<&str>,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        verify_signature(self.config.secret.as_deref(), payload, signature)?;

        if let Some(event) = event.filter(|e| *e != "push") {
            return Ok(WebhookOutcome::Ignored(format!("event {}", event)));
        }

        let push: PushEvent = serde_json::from_slice(payload)?;
        let Some(git_ref) = push.git_ref.as_deref() else {
            return Ok(WebhookOutcome::Ignored("not a push event".to_string()));
        };
        let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
        if !self.config.branches.iter().any(|b| b == branch) {
            return Ok(WebhookOutcome::Ignored(format!("push to {}", branch)));
        }

        let Some(repository) = push.repository else {
            return Ok(WebhookOutcome::Ignored("payload has no repository".to_string()));
        };
        let repositories = RepositoryStore::new(storage);
        let Some(registered) = find_registered(&repositories, &repository)? else {
            let name = repository.full_name.or(repository.name).unwrap_or_default();
            tracing::info!(repository = %name, "Push for unregistered repository ignored");
            return Ok(WebhookOutcome::Ignored(format!("unregistered repository {}", name)));
        };

        match enqueue_if_idle(storage, &registered.id, self.max_attempts)? {
            Some(job) => {
                tracing::info!(repository = %registered.full_name(), job_id = %job.id, branch, "Push queued scan");
                Ok(WebhookOutcome::Enqueued { job_id: job.id })
            }
            None => Ok(WebhookOutcome::AlreadyQueued),
        }
    }
}

fn find_registered<S: Storage>(
    repositories: &RepositoryStore<'_, S>,
    pushed: &PushRepository,
) -> Result<Option<crate::domain::Repository>, RefactorError> {
    if let Some(found) = pushed
        .html_url
        .as_deref()
        .and_then(|url| repositories.find_by_url(url).ok().flatten())
    {
        return Ok(Some(found));
    }
    if let Some((owner, name)) = pushed.full_name.as_deref().and_then(|f| f.split_once('/')) {
        return repositories.find_by_coordinates(owner, name);
    }
    let owner = pushed
        .owner
        .as_ref()
        .and_then(|o| o.login.as_deref().or(o.name.as_deref()));
    match (owner, pushed.name.as_deref()) {
        (Some(owner), Some(name)) => repositories.find_by_coordinates(owner, name),
        _ => Ok(None),
    }
}
