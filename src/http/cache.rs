//! In-memory cache for GET answers.
//!
//! Entries are keyed by a digest of the bearer token and the URL so two users
//! never see each other's data. An entry is stored only when the answer can
//! be revalidated (`ETag`) or carries a freshness lifetime (`max-age`).

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use moka::sync::Cache as MokaCache;
use reqwest::{
    Method, StatusCode,
    header::{CACHE_CONTROL, ETAG, HeaderMap},
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{Request, Response};

#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub body: Value,
    pub etag: Option<String>,
    pub max_age: Option<Duration>,
    pub stored_at: Instant,
}

impl CachedEntry {
    pub fn is_fresh(&self) -> bool {
        self.max_age
            .is_some_and(|max_age| self.stored_at.elapsed() < max_age)
    }

    pub fn to_response(&self) -> Response {
        Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: self.body.clone(),
            from_cache: true,
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct CacheControl {
    no_store: bool,
    no_cache: bool,
    max_age: Option<Duration>,
}

fn cache_control(headers: &HeaderMap) -> CacheControl {
    let mut parsed = CacheControl::default();
    let Some(value) = headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok()) else {
        return parsed;
    };

    for directive in value.split(',').map(|d| d.trim().to_ascii_lowercase()) {
        match directive.as_str() {
            "no-store" => parsed.no_store = true,
            "no-cache" => parsed.no_cache = true,
            d => {
                if let Some(secs) = d.strip_prefix("max-age=") {
                    parsed.max_age = secs.trim().parse::<u64>().ok().map(Duration::from_secs);
                }
            }
        }
    }
    parsed
}

#[derive(Clone)]
pub struct ResponseCache {
    entries: MokaCache<String, Arc<CachedEntry>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::with_capacity(1000)
    }
}

impl ResponseCache {
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            entries: MokaCache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(Duration::from_secs(3600))
                .build(),
        }
    }

    /// Cache key for `request`, `None` when it is not cacheable.
    pub fn key_for(request: &Request, bearer: Option<&str>) -> Option<String> {
        if request.method != Method::GET {
            return None;
        }

        let mut hasher = Sha256::new();
        hasher.update(bearer.unwrap_or_default().as_bytes());
        hasher.update(b"\n");
        hasher.update(request.url.as_bytes());
        Some(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<CachedEntry>> {
        self.entries.get(key)
    }

    /// Folds a network answer into the cache and returns what the caller
    /// should see: the stored body on 304, the answer itself otherwise.
    pub fn complete(
        &self,
        key: &str,
        cached: Option<Arc<CachedEntry>>,
        response: Response,
    ) -> Response {
        let control = cache_control(&response.headers);

        if response.status == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                debug!("cache revalidated");
                let refreshed = CachedEntry {
                    max_age: control.max_age.or(entry.max_age),
                    stored_at: Instant::now(),
                    ..(*entry).clone()
                };
                let answer = refreshed.to_response();
                self.entries.insert(key.to_string(), Arc::new(refreshed));
                return answer;
            }
            return response;
        }

        if response.status != StatusCode::OK || control.no_store {
            return response;
        }

        let etag = response
            .headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let max_age = if control.no_cache {
            None
        } else {
            control.max_age
        };

        if etag.is_some() || max_age.is_some() {
            self.entries.insert(
                key.to_string(),
                Arc::new(CachedEntry {
                    body: response.body.clone(),
                    etag,
                    max_age,
                    stored_at: Instant::now(),
                }),
            );
        }
        response
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn ok_response(headers: &[(reqwest::header::HeaderName, &'static str)]) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        Response {
            status: StatusCode::OK,
            headers: map,
            body: json!({"id": "wizzler"}),
            from_cache: false,
        }
    }

    #[test]
    fn parses_cache_control_directives() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("private, max-age=30, no-cache"),
        );
        let parsed = cache_control(&headers);
        assert!(parsed.no_cache);
        assert!(!parsed.no_store);
        assert_eq!(parsed.max_age, Some(Duration::from_secs(30)));
    }

    #[test]
    fn only_gets_are_keyed_and_keys_depend_on_token() {
        let get = Request::get("https://api.spotify.com/v1/me");
        let post = Request::post("https://api.spotify.com/v1/me");
        assert!(ResponseCache::key_for(&post, Some("a")).is_none());
        assert_ne!(
            ResponseCache::key_for(&get, Some("a")),
            ResponseCache::key_for(&get, Some("b"))
        );
    }

    #[test]
    fn stores_fresh_answers_and_serves_304_from_cache() {
        let cache = ResponseCache::default();
        cache.complete("k", None, ok_response(&[(ETAG, "\"v1\"")]));

        let entry = cache.lookup("k").expect("entry stored");
        assert_eq!(entry.etag.as_deref(), Some("\"v1\""));
        assert!(!entry.is_fresh());

        let not_modified = Response {
            status: StatusCode::NOT_MODIFIED,
            headers: HeaderMap::new(),
            body: json!({}),
            from_cache: false,
        };
        let answer = cache.complete("k", Some(entry), not_modified);
        assert!(answer.from_cache);
        assert_eq!(answer.body, json!({"id": "wizzler"}));
    }

    #[test]
    fn no_store_and_validator_less_answers_are_skipped() {
        let cache = ResponseCache::default();
        cache.complete("a", None, ok_response(&[(CACHE_CONTROL, "no-store, max-age=60")]));
        cache.complete("b", None, ok_response(&[]));
        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_none());

        cache.complete("c", None, ok_response(&[(CACHE_CONTROL, "max-age=60")]));
        assert!(cache.lookup("c").is_some_and(|e| e.is_fresh()));
    }
}
