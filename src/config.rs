//! Configuration management for spotkit.
//!
//! This module handles loading values from environment variables and `.env`
//! files, and holds the runtime settings of the HTTP clients. The lookup
//! order is:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Library defaults (where applicable)

use std::{env, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Loads environment variables from a `.env` file in the local data directory.
///
/// The file lives under the platform-specific local data directory:
/// - Linux: `~/.local/share/spotkit/.env`
/// - macOS: `~/Library/Application Support/spotkit/.env`
/// - Windows: `%LOCALAPPDATA%/spotkit/.env`
///
/// A missing file is not an error; the process environment is used as is.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the file
/// exists but cannot be parsed.
pub async fn load_env() -> Result<()> {
    let path = env_file_path();
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }

    if !path.is_file() {
        return Ok(());
    }

    dotenv::from_path(&path)
        .map_err(|e| Error::Config(format!("cannot load {}: {}", path.display(), e)))
}

pub fn env_file_path() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotkit/.env");
    path
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| Error::Config(format!("{key} must be set")))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Client ID of the registered Spotify application (`SPOTIFY_CLIENT_ID`).
pub fn spotify_client_id() -> Result<String> {
    required("SPOTIFY_CLIENT_ID")
}

/// Client secret (`SPOTIFY_CLIENT_SECRET`). Absent for PKCE-only apps.
///
/// # Security Note
///
/// The client secret should be kept confidential and never exposed in logs
/// or version control.
pub fn spotify_client_secret() -> Option<String> {
    optional("SPOTIFY_CLIENT_SECRET")
}

/// Redirect URI registered with the application (`SPOTIFY_REDIRECT_URI`).
pub fn spotify_redirect_uri() -> Option<String> {
    optional("SPOTIFY_REDIRECT_URI")
}

/// User access token (`SPOTIFY_ACCESS_TOKEN`).
pub fn spotify_access_token() -> Result<String> {
    required("SPOTIFY_ACCESS_TOKEN")
}

/// User refresh token (`SPOTIFY_REFRESH_TOKEN`).
pub fn spotify_refresh_token() -> Option<String> {
    optional("SPOTIFY_REFRESH_TOKEN")
}

/// Base URLs of the Web API and the accounts service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api_url: String,
    pub authorize_url: String,
    pub token_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            authorize_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Defaults overridden by `SPOTIFY_API_URL`, `SPOTIFY_API_AUTH_URL` and
    /// `SPOTIFY_API_TOKEN_URL` when set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: optional("SPOTIFY_API_URL").unwrap_or(defaults.api_url),
            authorize_url: optional("SPOTIFY_API_AUTH_URL").unwrap_or(defaults.authorize_url),
            token_url: optional("SPOTIFY_API_TOKEN_URL").unwrap_or(defaults.token_url),
        }
    }

    /// Points every endpoint at one host, e.g. a mock server.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_url: format!("{base}/v1"),
            authorize_url: format!("{base}/authorize"),
            token_url: format!("{base}/api/token"),
        }
    }
}

/// Proxy settings applied to every request. These are the only proxies used;
/// `HTTP_PROXY` and friends in the process environment are ignored.
#[derive(Debug, Clone, Default)]
pub struct Proxies {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Proxies {
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none() && self.all.is_none()
    }
}

/// Backoff settings for 429 answers and transport timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Seconds; the n-th retry waits `backoff_factor * 2^n`.
    pub backoff_factor: f64,
    /// Larger `Retry-After` values are not waited out.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_factor: 0.1,
            max_retry_after: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor * 2f64.powi(attempt.min(16) as i32);
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay before retry number `attempt` (zero based), or `None` when the
    /// budget is spent or the server asks for an unreasonable wait.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        match retry_after {
            Some(wait) if wait > self.max_retry_after => None,
            Some(wait) => Some(wait),
            None => Some(self.backoff(attempt)),
        }
    }
}

/// Runtime settings shared by [`crate::Spotify`] and [`crate::AsyncSpotify`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub proxies: Proxies,
    pub cache: bool,
    /// Probe the user's token when user credentials are installed.
    pub ensure_user_auth: bool,
    /// Fetch `/me` into the user credentials when they are installed.
    pub populate_user_creds: bool,
    /// Send `market=from_token` on user calls that accept a market.
    pub default_to_locale: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            timeout: Duration::from_secs(7),
            retry: RetryPolicy::default(),
            proxies: Proxies::default(),
            cache: true,
            ensure_user_auth: false,
            populate_user_creds: false,
            default_to_locale: true,
        }
    }
}
