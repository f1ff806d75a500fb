use base64::Engine;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = ".pr-helper.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// How the bot authenticates against the GitHub API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubAuth<'a> {
    /// Exchange an app JWT for a token per installation.
    App { app_id: u64, private_key: &'a str },
    /// One token for every request.
    Token(&'a str),
}

/// Top-level configuration loaded from .pr-helper.toml and the environment.
///
/// Every section is optional in the file; secrets normally come from env vars.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Installation or personal access token. Falls back to GITHUB_TOKEN.
    pub token: Option<String>,
    /// GitHub App id. With `app_private_key` it takes precedence over `token`.
    pub app_id: Option<u64>,
    /// PEM-encoded GitHub App private key.
    pub app_private_key: Option<String>,
    /// REST API root, e.g. "https://api.github.com"
    pub api_base: String,
    /// Shared secret GitHub signs webhook deliveries with.
    pub webhook_secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            app_id: None,
            app_private_key: None,
            api_base: "https://api.github.com".to_string(),
            webhook_secret: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API (without `/v1`).
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Token cap for the aggregation call.
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.0,
            max_tokens: Some(4000),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Maximum number of changed files summarized per PR.
    pub max_files: usize,
    /// Maximum number of per-file LLM requests in flight for one PR.
    pub concurrency: usize,
    /// Upper bound on a single LLM call, on top of the HTTP client timeout.
    pub call_timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_files: 75,
            concurrency: 8,
            call_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// How long running summary jobs get to finish after Ctrl+C.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
            shutdown_grace_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or .pr-helper.toml in the current
    /// directory), then apply environment overrides.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load from a specific path without env overrides (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Overlay environment variables onto the file values.
    /// `lookup` is injected so tests don't have to mutate the process env.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(raw) = lookup("GITHUB_APP_ID") {
            self.github.app_id = Some(raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "GITHUB_APP_ID",
                value: raw.clone(),
            })?);
        }
        if let Some(raw) = lookup("GITHUB_APP_PRIVATE_KEY") {
            self.github.app_private_key = Some(decode_private_key(&raw)?);
        }
        if let Some(base) = lookup("GITHUB_API_BASE") {
            self.github.api_base = base;
        }
        if let Some(secret) =
            lookup("GITHUB_WEBHOOK_SECRET").or_else(|| lookup("GITHUB_APP_WEBHOOK_SECRET"))
        {
            self.github.webhook_secret = Some(secret);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("OPENAI_BASE_URL") {
            self.llm.endpoint = endpoint;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(raw) = lookup("PR_HELPER_MAX_FILES") {
            self.summary.max_files = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "PR_HELPER_MAX_FILES",
                value: raw.clone(),
            })?;
        }
        if let Some(addr) = lookup("PR_HELPER_ADDR") {
            self.server.addr = addr;
        }
        Ok(())
    }

    pub fn github_token(&self) -> Result<&str, ConfigError> {
        non_empty(self.github.token.as_deref()).ok_or(ConfigError::Missing("github.token"))
    }

    /// App credentials when both halves are set, otherwise the plain token.
    pub fn github_auth(&self) -> Result<GitHubAuth<'_>, ConfigError> {
        let private_key = non_empty(self.github.app_private_key.as_deref());
        match (self.github.app_id, private_key) {
            (Some(app_id), Some(private_key)) => Ok(GitHubAuth::App {
                app_id,
                private_key,
            }),
            (Some(_), None) => Err(ConfigError::Missing("github.app_private_key")),
            (None, _) => self
                .github_token()
                .map(GitHubAuth::Token)
                .map_err(|_| ConfigError::Missing("github.token or github.app_id")),
        }
    }

    pub fn webhook_secret(&self) -> Result<&str, ConfigError> {
        non_empty(self.github.webhook_secret.as_deref())
            .ok_or(ConfigError::Missing("github.webhook_secret"))
    }

    pub fn llm_api_key(&self) -> Result<&str, ConfigError> {
        non_empty(self.llm.api_key.as_deref()).ok_or(ConfigError::Missing("llm.api_key"))
    }

    /// Check everything the webhook server needs before it binds.
    pub fn validate_for_server(&self) -> Result<(), ConfigError> {
        self.github_auth()?;
        self.webhook_secret()?;
        self.llm_api_key()?;
        if self.summary.max_files == 0 {
            return Err(ConfigError::InvalidEnv {
                name: "summary.max_files",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// GITHUB_APP_PRIVATE_KEY holds the PEM base64-encoded so it fits on one
/// line of a `.env` file. A raw PEM is accepted as well.
fn decode_private_key(raw: &str) -> Result<String, ConfigError> {
    let raw = raw.trim();
    if raw.starts_with("-----BEGIN") {
        return Ok(raw.to_string());
    }
    let invalid = || ConfigError::InvalidEnv {
        name: "GITHUB_APP_PRIVATE_KEY",
        value: "<not base64-encoded PEM>".to_string(),
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw)
        .map_err(|_| invalid())?;
    String::from_utf8(bytes).map_err(|_| invalid())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
