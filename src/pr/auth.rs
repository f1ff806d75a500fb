//! Picks the GitHub client a request should use.
//!
//! With a plain token every PR shares one client. As a GitHub App, each
//! installation gets its own short-lived token, minted from an RS256 app
//! JWT and cached until shortly before it expires.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::github::{check_status, decode, GitHubClient, GitHubError, PullRequestApi};
use super::types::PullRequestRef;
use crate::config::{GitHubAuth, GitHubConfig};

/// GitHub rejects app JWTs that live longer than ten minutes.
const JWT_LIFETIME: Duration = Duration::from_secs(9 * 60);
/// Backdate `iat` to absorb clock drift between us and GitHub.
const JWT_BACKDATE: Duration = Duration::from_secs(60);
/// Installation tokens last an hour; stop using them well before that.
const TOKEN_REUSE: Duration = Duration::from_secs(50 * 60);

/// Hands out the [`PullRequestApi`] allowed to act on a given PR.
#[async_trait]
pub trait GitHubClients: Send + Sync {
    async fn client_for(&self, pr: &PullRequestRef)
        -> Result<Arc<dyn PullRequestApi>, GitHubError>;
}

/// Build the client source matching the configured credentials.
pub fn clients_from_config(
    config: &GitHubConfig,
    auth: GitHubAuth<'_>,
) -> Result<Arc<dyn GitHubClients>, GitHubError> {
    match auth {
        GitHubAuth::Token(token) => {
            info!("authenticating to GitHub with a static token");
            let client: Arc<dyn PullRequestApi> = Arc::new(GitHubClient::new(config, token)?);
            Ok(Arc::new(SharedClient::new(client)))
        }
        GitHubAuth::App {
            app_id,
            private_key,
        } => {
            info!(app_id, "authenticating to GitHub as an App");
            let credentials = AppCredentials::from_pem(app_id, private_key)?;
            Ok(Arc::new(InstallationClients::new(config, credentials)?))
        }
    }
}

/// Same client for every PR.
pub struct SharedClient {
    client: Arc<dyn PullRequestApi>,
}

impl SharedClient {
    pub fn new(client: Arc<dyn PullRequestApi>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GitHubClients for SharedClient {
    async fn client_for(
        &self,
        _pr: &PullRequestRef,
    ) -> Result<Arc<dyn PullRequestApi>, GitHubError> {
        Ok(self.client.clone())
    }
}

#[derive(Serialize)]
struct AppClaims {
    iat: u64,
    exp: u64,
    iss: String,
}

/// App id plus the parsed private key.
pub struct AppCredentials {
    app_id: u64,
    key: EncodingKey,
}

impl AppCredentials {
    pub fn from_pem(app_id: u64, pem: &str) -> Result<Self, GitHubError> {
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| GitHubError::AppAuth(format!("invalid private key: {e}")))?;
        Ok(Self { app_id, key })
    }

    /// Signed app JWT valid from `now` (seconds since the epoch).
    pub fn jwt(&self, now: u64) -> Result<String, GitHubError> {
        let claims = AppClaims {
            iat: now.saturating_sub(JWT_BACKDATE.as_secs()),
            exp: now + JWT_LIFETIME.as_secs(),
            iss: self.app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| GitHubError::AppAuth(format!("failed to sign app JWT: {e}")))
    }
}

#[derive(Deserialize)]
struct AccessToken {
    token: String,
}

#[derive(Deserialize)]
struct Installation {
    id: u64,
}

struct CachedClient {
    client: Arc<dyn PullRequestApi>,
    minted_at: Instant,
}

/// One [`GitHubClient`] per installation, authenticated with an
/// installation access token.
pub struct InstallationClients {
    config: GitHubConfig,
    credentials: AppCredentials,
    http: reqwest::Client,
    cache: Mutex<HashMap<u64, CachedClient>>,
}

impl InstallationClients {
    pub fn new(config: &GitHubConfig, credentials: AppCredentials) -> Result<Self, GitHubError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        let http = reqwest::Client::builder()
            .user_agent("pr-helper")
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            config: config.clone(),
            credentials,
            http,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn api_base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }

    fn app_jwt(&self) -> Result<String, GitHubError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GitHubError::AppAuth(format!("system clock before epoch: {e}")))?;
        self.credentials.jwt(now.as_secs())
    }

    fn cached(&self, installation_id: u64) -> Option<Arc<dyn PullRequestApi>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&installation_id)
            .filter(|entry| entry.minted_at.elapsed() < TOKEN_REUSE)
            .map(|entry| entry.client.clone())
    }

    /// Installation from the webhook payload, or the one installed on the
    /// repository when the PR came from somewhere else (the CLI).
    async fn installation_id(&self, pr: &PullRequestRef) -> Result<u64, GitHubError> {
        if let Some(id) = pr.installation_id {
            return Ok(id);
        }
        let url = format!("{}/repos/{}/{}/installation", self.api_base(), pr.owner, pr.repo);
        let request = self.http.get(&url).bearer_auth(self.app_jwt()?);
        let installation: Installation = decode(check_status(request.send().await?).await?).await?;
        debug!(installation_id = installation.id, "looked up repository installation");
        Ok(installation.id)
    }

    #[instrument(skip(self))]
    async fn mint_token(&self, installation_id: u64) -> Result<String, GitHubError> {
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base(),
            installation_id
        );
        let request = self.http.post(&url).bearer_auth(self.app_jwt()?);
        let token: AccessToken = decode(check_status(request.send().await?).await?).await?;
        info!("minted installation access token");
        Ok(token.token)
    }
}

#[async_trait]
impl GitHubClients for InstallationClients {
    async fn client_for(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Arc<dyn PullRequestApi>, GitHubError> {
        let installation_id = self.installation_id(pr).await?;
        if let Some(client) = self.cached(installation_id) {
            return Ok(client);
        }

        let token = self.mint_token(installation_id).await?;
        let client: Arc<dyn PullRequestApi> = Arc::new(GitHubClient::new(&self.config, &token)?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                installation_id,
                CachedClient {
                    client: client.clone(),
                    minted_at: Instant::now(),
                },
            );
        Ok(client)
    }
}
