//! GitHub REST access for the handful of pull request operations the bot needs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::types::{ChangedFile, PullRequest, PullRequestRef, ReactionId, ReactionKind};
use crate::config::GitHubConfig;

/// GitHub caps `per_page` at 100 on list endpoints.
const MAX_PER_PAGE: usize = 100;
const SNIPPET_LEN: usize = 300;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GitHub rejected credentials ({status}) for {url}")]
    Unauthorized { status: u16, url: String },

    #[error("GitHub rate limit exceeded for {url}")]
    RateLimited { url: String },

    #[error("GitHub resource not found: {url}")]
    NotFound { url: String },

    #[error("GitHub returned {status} for {url}: {snippet}")]
    Status {
        status: u16,
        url: String,
        snippet: String,
    },

    #[error("Unexpected GitHub response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Invalid GitHub token header")]
    InvalidToken,

    #[error("GitHub App authentication failed: {0}")]
    AppAuth(String),
}

impl GitHubError {
    /// Map a non-success status onto the error taxonomy callers branch on.
    fn from_status(status: StatusCode, url: String, snippet: String, quota_exhausted: bool) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => GitHubError::RateLimited { url },
            StatusCode::FORBIDDEN if quota_exhausted => GitHubError::RateLimited { url },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GitHubError::Unauthorized {
                status: status.as_u16(),
                url,
            },
            StatusCode::NOT_FOUND => GitHubError::NotFound { url },
            _ => GitHubError::Status {
                status: status.as_u16(),
                url,
                snippet,
            },
        }
    }
}

/// Pull request operations the summarization flow depends on.
/// Implemented over HTTP by [`GitHubClient`] and in memory by test doubles.
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    /// Fetch title and current description.
    async fn get_pull(&self, pr: &PullRequestRef) -> Result<PullRequest, GitHubError>;

    /// Changed files in platform order, at most `limit` of them.
    async fn list_files(
        &self,
        pr: &PullRequestRef,
        limit: usize,
    ) -> Result<Vec<ChangedFile>, GitHubError>;

    /// Replace the PR description.
    async fn update_body(&self, pr: &PullRequestRef, body: &str) -> Result<(), GitHubError>;

    /// React on the PR's issue and return the reaction id.
    async fn create_reaction(
        &self,
        pr: &PullRequestRef,
        kind: ReactionKind,
    ) -> Result<ReactionId, GitHubError>;

    async fn delete_reaction(&self, pr: &PullRequestRef, id: ReactionId)
        -> Result<(), GitHubError>;
}

/// reqwest-backed [`PullRequestApi`].
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    body: Option<String>,
}

#[derive(Deserialize)]
struct FileEntry {
    filename: String,
    patch: Option<String>,
}

#[derive(Deserialize)]
struct ReactionResponse {
    id: ReactionId,
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct CreateReaction<'a> {
    content: &'a str,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: &str) -> Result<Self, GitHubError> {
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| GitHubError::InvalidToken)?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            header::HeaderValue::from_static("2022-11-28"),
        );

        let client = reqwest::Client::builder()
            .user_agent("pr-helper")
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self, pr: &PullRequestRef) -> String {
        format!("{}/repos/{}/{}", self.api_base, pr.owner, pr.repo)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, GitHubError> {
        check_status(request.send().await?).await
    }
}

/// Pass successful responses through; turn everything else into a typed error.
pub(super) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let quota_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    let text = response.text().await.unwrap_or_default();
    let err = GitHubError::from_status(status, url, make_snippet(&text), quota_exhausted);
    warn!(%status, error = %err, "GitHub request failed");
    Err(err)
}

pub(super) async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GitHubError> {
    let url = response.url().to_string();
    response.json::<T>().await.map_err(|e| GitHubError::Decode {
        url,
        reason: e.to_string(),
    })
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    #[instrument(skip(self), fields(pr = %pr))]
    async fn get_pull(&self, pr: &PullRequestRef) -> Result<PullRequest, GitHubError> {
        let url = format!("{}/pulls/{}", self.repo_url(pr), pr.number);
        let response = self.send(self.client.get(&url)).await?;
        let pull: PullResponse = decode(response).await?;
        debug!(title = %pull.title, has_body = pull.body.is_some(), "received PR metadata");

        Ok(PullRequest {
            number: pull.number,
            title: pull.title,
            body: pull.body,
        })
    }

    #[instrument(skip(self), fields(pr = %pr))]
    async fn list_files(
        &self,
        pr: &PullRequestRef,
        limit: usize,
    ) -> Result<Vec<ChangedFile>, GitHubError> {
        let url = format!("{}/pulls/{}/files", self.repo_url(pr), pr.number);
        let per_page = limit.clamp(1, MAX_PER_PAGE);
        let mut files = Vec::new();
        let mut page = 1usize;

        while files.len() < limit {
            let request = self
                .client
                .get(&url)
                .query(&[("per_page", per_page), ("page", page)]);
            let entries: Vec<FileEntry> = decode(self.send(request).await?).await?;
            let fetched = entries.len();
            debug!(page, fetched, "received PR files page");

            files.extend(
                entries
                    .into_iter()
                    .map(|entry| ChangedFile::new(entry.filename, entry.patch.unwrap_or_default())),
            );

            if fetched < per_page {
                break;
            }
            page += 1;
        }

        files.truncate(limit);
        Ok(files)
    }

    #[instrument(skip(self, body), fields(pr = %pr, body_len = body.len()))]
    async fn update_body(&self, pr: &PullRequestRef, body: &str) -> Result<(), GitHubError> {
        let url = format!("{}/pulls/{}", self.repo_url(pr), pr.number);
        self.send(self.client.patch(&url).json(&UpdateBody { body }))
            .await?;
        debug!("updated PR body");
        Ok(())
    }

    #[instrument(skip(self), fields(pr = %pr, kind = kind.as_str()))]
    async fn create_reaction(
        &self,
        pr: &PullRequestRef,
        kind: ReactionKind,
    ) -> Result<ReactionId, GitHubError> {
        let url = format!("{}/issues/{}/reactions", self.repo_url(pr), pr.number);
        let payload = CreateReaction {
            content: kind.as_str(),
        };
        let response = self.send(self.client.post(&url).json(&payload)).await?;
        let reaction: ReactionResponse = decode(response).await?;
        debug!(reaction_id = reaction.id, "created reaction");
        Ok(reaction.id)
    }

    #[instrument(skip(self), fields(pr = %pr))]
    async fn delete_reaction(
        &self,
        pr: &PullRequestRef,
        id: ReactionId,
    ) -> Result<(), GitHubError> {
        let url = format!("{}/issues/{}/reactions/{}", self.repo_url(pr), pr.number, id);
        self.send(self.client.delete(&url)).await?;
        debug!(reaction_id = id, "deleted reaction");
        Ok(())
    }
}

/// Trim an error body down to something that fits on one log line.
pub(crate) fn make_snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_LEN {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_LEN).collect();
    format!("{}…", cut)
}
