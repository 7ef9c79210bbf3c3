//! # Clients
//!
//! [`Spotify`] (blocking) and [`AsyncSpotify`] share one protocol:
//!
//! 1. Ask the [`AuthManager`] for the caller's bearer token, refreshing it
//!    first when it is expired and refreshable.
//! 2. Hand the request to the transport (which deals with 429, timeouts and
//!    the response cache).
//! 3. On 401, refresh once and resend once. If another request refreshed in
//!    the meantime, its token is reused instead of refreshing again.
//!
//! Credential state sits behind a mutex that is held for the duration of a
//! refresh, so concurrent requests never refresh the same token twice.
//!
//! Both clients are created through [`SpotifyBuilder`]:
//!
//! ```rust,ignore
//! use spotkit::{ClientCredentials, Spotify};
//!
//! let spotify = Spotify::builder()
//!     .client_creds(ClientCredentials::new("id", "secret"))
//!     .build()?;
//! spotify.authorize_client_creds(None)?;
//! let results = spotify.search("daft punk", &["artist"], None, Some(5), None)?;
//! ```

mod blocking;
mod nonblocking;

pub use blocking::Spotify;
pub use nonblocking::AsyncSpotify;

use std::time::Duration;

use serde_json::Value;

use crate::{
    auth::{AuthManager, Caller},
    config::{ClientConfig, Endpoints, Proxies},
    creds::{ClientCredentials, UserCredentials},
    error::{Error, Result},
    http::{Query, Request, build_url},
    utils,
};

/// Query sent to check that a token is accepted; it needs no scope.
const PROBE_QUERY: &str = "Hey spotify am I authorized";

#[derive(Debug, Clone, Default)]
pub struct SpotifyBuilder {
    access_token: Option<String>,
    client_creds: Option<ClientCredentials>,
    user_creds: Option<UserCredentials>,
    config: ClientConfig,
}

impl SpotifyBuilder {
    /// Shortcut for user credentials made of a bare access token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn client_creds(mut self, creds: ClientCredentials) -> Self {
        self.client_creds = Some(creds);
        self
    }

    pub fn user_creds(mut self, creds: UserCredentials) -> Self {
        self.user_creds = Some(creds);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    pub fn backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.config.retry.backoff_factor = backoff_factor;
        self
    }

    pub fn proxies(mut self, proxies: Proxies) -> Self {
        self.config.proxies = proxies;
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.config.cache = enabled;
        self
    }

    pub fn ensure_user_auth(mut self, enabled: bool) -> Self {
        self.config.ensure_user_auth = enabled;
        self
    }

    pub fn populate_user_creds(mut self, enabled: bool) -> Self {
        self.config.populate_user_creds = enabled;
        self
    }

    pub fn default_to_locale(mut self, enabled: bool) -> Self {
        self.config.default_to_locale = enabled;
        self
    }

    fn into_parts(self) -> Result<(AuthManager, ClientConfig)> {
        let user = match (self.access_token, self.user_creds) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "Either provide an access token or user credentials, not both".to_string(),
                ));
            }
            (Some(token), None) => Some(UserCredentials::new(token)),
            (None, user) => user,
        };

        let auth = AuthManager::new(
            self.client_creds.unwrap_or_default(),
            user,
            self.config.endpoints.clone(),
        );
        Ok((auth, self.config))
    }

    pub fn build(self) -> Result<Spotify> {
        let (auth, config) = self.into_parts()?;
        let has_user = auth.user_creds().is_some();
        let client = Spotify::from_parts(auth, config)?;

        if has_user {
            client.after_user_change()?;
        }
        Ok(client)
    }

    pub async fn build_async(self) -> Result<AsyncSpotify> {
        let (auth, config) = self.into_parts()?;
        let has_user = auth.user_creds().is_some();
        let client = AsyncSpotify::from_parts(auth, config)?;

        if has_user {
            client.after_user_change().await?;
        }
        Ok(client)
    }
}

fn probe_request(config: &ClientConfig) -> Result<Request> {
    let query = Query::new().set("q", PROBE_QUERY).set("type", "artist");
    Ok(Request::get(build_url(&config.endpoints.api_url, "/search", &query)?))
}

fn api_request(
    config: &ClientConfig,
    method: reqwest::Method,
    path: &str,
    query: &Query,
    body: Option<Value>,
) -> Result<Request> {
    let request = Request::new(method, build_url(&config.endpoints.api_url, path, query)?);
    Ok(match body {
        Some(json) => request.json(json),
        None => request,
    })
}

/// Users default to the market of their token when none is given.
fn resolve_market(
    config: &ClientConfig,
    caller: Option<Caller>,
    market: Option<&str>,
) -> Option<String> {
    match market {
        Some(m) => Some(m.to_string()),
        None if config.default_to_locale && caller == Some(Caller::User) => {
            Some("from_token".to_string())
        }
        None => None,
    }
}

fn search_request(
    config: &ClientConfig,
    q: &str,
    types: &[&str],
    market: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<Request> {
    let types = if types.is_empty() {
        "track".to_string()
    } else {
        utils::comma_join(types)
    };
    let query = Query::new()
        .set("q", q)
        .set("type", types)
        .add("market", market)
        .add("limit", limit)
        .add("offset", offset);
    api_request(config, reqwest::Method::GET, "/search", &query, None)
}

/// Request for the `next`/`previous` URL of a paging object, if any.
fn page_request(response: &Value, key: &str) -> Option<Request> {
    utils::find_key_recursively(response, key, 3)
        .and_then(Value::as_str)
        .map(Request::get)
}

/// Any failure of the client credentials flow that reached or waited on the
/// token endpoint becomes one authentication error.
fn client_auth_failure(err: Error) -> Error {
    let status = match &err {
        Error::Auth { status, .. } | Error::Api { status, .. } => *status,
        Error::RateLimited { .. } => Some(429),
        Error::Timeout(_) => None,
        _ => return err,
    };
    Error::Auth {
        status,
        message: "Failed to authenticate with client credentials".to_string(),
    }
}
