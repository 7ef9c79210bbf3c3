//! # HTTP layer
//!
//! Transport-agnostic request and response models plus the two transports
//! that send them:
//!
//! ```text
//! Client (Spotify / AsyncSpotify)
//!          ↓  Request + bearer token
//! Transport (blocking / nonblocking)
//!     ├── Response cache (ETag, max-age)
//!     ├── 429 backoff honouring Retry-After
//!     └── timeout retries for idempotent methods
//!          ↓
//! reqwest
//! ```
//!
//! The transports never interpret 401; the clients own that because a 401
//! means "refresh and try once more", which needs the credential state.

pub mod blocking;
pub mod cache;
pub mod nonblocking;

use std::time::Duration;

use reqwest::{
    Method, Proxy, StatusCode,
    header::{HeaderMap, HeaderValue, RETRY_AFTER},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    auth::TokenRequest,
    config::Proxies,
    error::{Error, Result},
    types::TokenResponse,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn form(mut self, form: Vec<(String, String)>) -> Self {
        self.body = Body::Form(form);
        self
    }

    /// Requests that can be resent after a timeout without side effects.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE
        )
    }
}

impl TryFrom<&TokenRequest> for Request {
    type Error = Error;

    fn try_from(token: &TokenRequest) -> Result<Self> {
        let mut request = Request::post(token.url.clone()).form(token.form.clone());
        if let Some(authorization) = &token.authorization {
            let value = HeaderValue::from_str(authorization)
                .map_err(|e| Error::Config(format!("invalid authorization header: {e}")))?;
            request
                .headers
                .insert(reqwest::header::AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// Query string builder that skips unset and empty values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            let value = value.to_string();
            if !value.is_empty() {
                self.pairs.push((key.to_string(), value));
            }
        }
        self
    }

    pub fn set<V: ToString>(self, key: &str, value: V) -> Self {
        self.add(key, Some(value))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// `base` + `path` + encoded query.
pub fn build_url(base: &str, path: &str, query: &Query) -> Result<String> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    if query.is_empty() {
        return Ok(joined);
    }

    let url = reqwest::Url::parse_with_params(&joined, query.pairs())
        .map_err(|e| Error::Config(format!("invalid URL {joined}: {e}")))?;
    Ok(url.into())
}

/// Traffic a configured proxy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScope {
    Http,
    Https,
    All,
}

/// Configured proxies in the order reqwest consults them. reqwest takes the
/// first proxy that intercepts a request, so scheme specific entries come
/// before the catch-all one.
pub fn proxy_targets(proxies: &Proxies) -> Vec<(ProxyScope, &str)> {
    [
        (ProxyScope::Http, proxies.http.as_deref()),
        (ProxyScope::Https, proxies.https.as_deref()),
        (ProxyScope::All, proxies.all.as_deref()),
    ]
    .into_iter()
    .filter_map(|(scope, url)| url.map(|url| (scope, url)))
    .collect()
}

pub fn build_proxies(proxies: &Proxies) -> Result<Vec<Proxy>> {
    let mut built = Vec::new();

    for (scope, url) in proxy_targets(proxies) {
        let proxy = match scope {
            ProxyScope::Http => Proxy::http(url),
            ProxyScope::Https => Proxy::https(url),
            ProxyScope::All => Proxy::all(url),
        };
        let mut proxy = proxy.map_err(|e| Error::Config(format!("invalid proxy {url}: {e}")))?;
        if let Some(username) = &proxies.username {
            proxy = proxy.basic_auth(username, proxies.password.as_deref().unwrap_or(""));
        }
        built.push(proxy);
    }

    Ok(built)
}

/// A fully read HTTP answer.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub from_cache: bool,
}

impl Response {
    pub fn from_parts(status: StatusCode, headers: HeaderMap, bytes: &[u8]) -> Self {
        Self {
            status,
            headers,
            body: decode_body(bytes),
            from_cache: false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn message(&self) -> String {
        error_message(&self.body).unwrap_or_else(|| {
            self.status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        })
    }

    /// Body of a successful answer, typed error otherwise.
    pub fn into_value(self, url: &str) -> Result<Value> {
        if self.status.is_success() || self.status == StatusCode::NOT_MODIFIED {
            return Ok(self.body);
        }

        let status = Some(self.status.as_u16());
        let message = self.message();
        warn!("{} answered {}: {}", url, self.status, message);
        if self.status == StatusCode::UNAUTHORIZED {
            return Err(Error::Auth { status, message });
        }

        Err(Error::Api {
            status,
            message,
            url: Some(url.to_string()),
        })
    }

    pub fn into_json<T: DeserializeOwned>(self, url: &str) -> Result<T> {
        Ok(serde_json::from_value(self.into_value(url)?)?)
    }

    /// Answer of the token endpoint; every failure is an authentication error.
    pub fn into_token(self) -> Result<TokenResponse> {
        if !self.status.is_success() {
            return Err(Error::Auth {
                status: Some(self.status.as_u16()),
                message: self.message(),
            });
        }
        let status = Some(self.status.as_u16());
        serde_json::from_value(self.body).map_err(|e| Error::Auth {
            status,
            message: format!("Malformed token response: {e}"),
        })
    }
}

/// Empty bodies become `{}`; bodies that are not JSON become a string.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Value::Object(Map::new());
    }

    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Reads the message out of the Web API or the accounts service error shapes.
pub fn error_message(body: &Value) -> Option<String> {
    if let Some(msg) = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return Some(msg.to_string());
    }
    if let Some(msg) = body.get("error_description").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    if let Some(msg) = body.get("error").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    body.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}
