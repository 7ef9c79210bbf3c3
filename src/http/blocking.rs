use std::thread::sleep;

use reqwest::{
    blocking::Client,
    header::{HeaderValue, IF_NONE_MATCH},
};
use tracing::{debug, warn};

use super::{Body, Request, Response, build_proxies, cache::CachedEntry, cache::ResponseCache};
use crate::{
    config::{ClientConfig, RetryPolicy},
    error::{Error, Result},
};

/// Blocking transport: sends a [`Request`] and reads the whole answer,
/// backing off on 429 and on timeouts of idempotent requests.
pub struct BlockingTransport {
    client: Client,
    retry: RetryPolicy,
    cache: Option<ResponseCache>,
}

impl BlockingTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout).no_proxy();
        for proxy in build_proxies(&config.proxies)? {
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            retry: config.retry.clone(),
            cache: config.cache.then(ResponseCache::default),
        })
    }

    pub fn execute(&self, request: &Request, bearer: Option<&str>) -> Result<Response> {
        let key = self
            .cache
            .as_ref()
            .and_then(|_| ResponseCache::key_for(request, bearer));
        let cached = match (&self.cache, &key) {
            (Some(cache), Some(key)) => cache.lookup(key),
            _ => None,
        };

        if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh()) {
            debug!("{} {} served from cache", request.method, request.url);
            return Ok(entry.to_response());
        }

        let response = self.send_with_backoff(request, bearer, cached.as_deref())?;

        Ok(match (&self.cache, key) {
            (Some(cache), Some(key)) => cache.complete(&key, cached, response),
            _ => response,
        })
    }

    fn send_with_backoff(
        &self,
        request: &Request,
        bearer: Option<&str>,
        cached: Option<&CachedEntry>,
    ) -> Result<Response> {
        let mut attempt = 0;

        loop {
            match self.send_once(request, bearer, cached) {
                Ok(response) if response.status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response.retry_after();
                    match self.retry.delay(attempt, retry_after) {
                        Some(wait) => {
                            warn!(
                                "Rate limited on {}, retrying in {:?} (attempt {})",
                                request.url,
                                wait,
                                attempt + 1
                            );
                            sleep(wait);
                            attempt += 1;
                        }
                        None => {
                            return Err(Error::RateLimited {
                                url: request.url.clone(),
                                retry_after,
                            });
                        }
                    }
                }
                Ok(response) => return Ok(response),
                Err(err) if err.is_timeout() => {
                    let wait = request
                        .is_idempotent()
                        .then(|| self.retry.delay(attempt, None))
                        .flatten();
                    match wait {
                        Some(wait) => {
                            warn!("Request to {} timed out, retrying in {:?}", request.url, wait);
                            sleep(wait);
                            attempt += 1;
                        }
                        None => return Err(Error::Timeout(request.url.clone())),
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn send_once(
        &self,
        request: &Request,
        bearer: Option<&str>,
        cached: Option<&CachedEntry>,
    ) -> reqwest::Result<Response> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());

        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(etag) = cached
            .and_then(|e| e.etag.as_deref())
            .and_then(|etag| HeaderValue::from_str(etag).ok())
        {
            builder = builder.header(IF_NONE_MATCH, etag);
        }

        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(json) => builder.json(json),
            Body::Form(form) => builder.form(form),
        };

        let res = builder.send()?;
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.bytes()?;

        debug!("{} {} -> {}", request.method, request.url, status);
        Ok(Response::from_parts(status, headers, &bytes))
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }
}
