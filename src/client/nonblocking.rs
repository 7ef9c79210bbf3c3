use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    SpotifyBuilder, api_request, client_auth_failure, page_request, probe_request, resolve_market,
    search_request,
};
use crate::{
    auth::{AuthManager, AuthUriOptions, Caller, TokenRequest},
    config::ClientConfig,
    creds::{ClientCredentials, UserCredentials},
    error::{Error, Result},
    http::{Query, Request, Response, nonblocking::AsyncTransport},
    types::TokenResponse,
};

struct Inner {
    auth: Mutex<AuthManager>,
    transport: AsyncTransport,
    config: ClientConfig,
}

/// Async Spotify client. Clones share credentials, connection pool and
/// cache, so it can be handed to many tasks at once.
#[derive(Clone)]
pub struct AsyncSpotify {
    inner: Arc<Inner>,
}

impl AsyncSpotify {
    pub fn builder() -> SpotifyBuilder {
        SpotifyBuilder::default()
    }

    pub(super) fn from_parts(auth: AuthManager, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                auth: Mutex::new(auth),
                transport: AsyncTransport::new(&config)?,
                config,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub async fn caller(&self) -> Option<Caller> {
        self.inner.auth.lock().await.caller()
    }

    pub async fn client_creds(&self) -> ClientCredentials {
        self.inner.auth.lock().await.client_creds().clone()
    }

    pub async fn user_creds(&self) -> Option<UserCredentials> {
        self.inner.auth.lock().await.user_creds().cloned()
    }

    pub async fn is_oauth_ready(&self) -> bool {
        self.inner.auth.lock().await.is_oauth_ready()
    }

    pub async fn auth_uri(&self, options: AuthUriOptions) -> Result<String> {
        self.inner.auth.lock().await.auth_uri(options)
    }

    /// Sends `request` signed by the current caller.
    ///
    /// An expired token is refreshed before sending when possible. A `401`
    /// answer triggers one refresh and one retry; a second rejection is final.
    ///
    /// # Errors
    ///
    /// * [`Error::Auth`] - No caller, or the credentials were rejected
    /// * [`Error::TokenNotRefreshed`] - The refresh handed back the rejected token
    /// * [`Error::Api`] - Any other non-success answer
    /// * [`Error::RateLimited`] / [`Error::Timeout`] - Retries were exhausted
    pub async fn send(&self, request: Request) -> Result<Value> {
        let token = self.valid_token().await?;
        let response = self.inner.transport.execute(&request, Some(&token)).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return response.into_value(&request.url);
        }

        let token = self.token_after_rejection(&token, &response).await?;
        self.inner
            .transport
            .execute(&request, Some(&token))
            .await?
            .into_value(&request.url)
    }

    pub async fn send_unauthorized(&self, request: Request) -> Result<Value> {
        self.inner
            .transport
            .execute(&request, None)
            .await?
            .into_value(&request.url)
    }

    pub async fn get(&self, path: &str, query: &Query) -> Result<Value> {
        let request = api_request(self.config(), Method::GET, path, query, None)?;
        self.send(request).await
    }

    pub async fn post(&self, path: &str, query: &Query, body: Option<Value>) -> Result<Value> {
        let request = api_request(self.config(), Method::POST, path, query, body)?;
        self.send(request).await
    }

    pub async fn put(&self, path: &str, query: &Query, body: Option<Value>) -> Result<Value> {
        let request = api_request(self.config(), Method::PUT, path, query, body)?;
        self.send(request).await
    }

    pub async fn delete(&self, path: &str, query: &Query, body: Option<Value>) -> Result<Value> {
        let request = api_request(self.config(), Method::DELETE, path, query, body)?;
        self.send(request).await
    }

    async fn valid_token(&self) -> Result<String> {
        let mut auth = self.inner.auth.lock().await;
        if auth.needs_refresh() && auth.can_refresh() {
            debug!("access token expired, refreshing before sending");
            self.refresh_locked(&mut auth).await?;
        }
        auth.access_token()
    }

    async fn token_after_rejection(&self, rejected: &str, response: &Response) -> Result<String> {
        let mut auth = self.inner.auth.lock().await;
        let current = auth.access_token()?;
        if current != rejected {
            // refreshed by a concurrent request while this one was in flight
            return Ok(current);
        }

        if !auth.can_refresh() {
            return Err(Error::Auth {
                status: Some(response.status.as_u16()),
                message: response.message(),
            });
        }

        warn!("Access token rejected ({}), refreshing", response.message());
        self.refresh_locked(&mut auth).await?;

        let refreshed = auth.access_token()?;
        if refreshed == rejected {
            return Err(Error::TokenNotRefreshed);
        }
        Ok(refreshed)
    }

    async fn refresh_locked(&self, auth: &mut AuthManager) -> Result<()> {
        let request = auth.refresh_request()?;
        let token = self.request_token(&request).await;
        let token = match auth.caller() {
            Some(Caller::Client) => token.map_err(client_auth_failure)?,
            _ => token?,
        };
        auth.apply_refresh(&token)
    }

    async fn request_token(&self, token_request: &TokenRequest) -> Result<TokenResponse> {
        let request = Request::try_from(token_request)?;
        self.inner
            .transport
            .execute(&request, None)
            .await?
            .into_token()
    }

    /// Renews the current caller's access token.
    pub async fn refresh_token(&self) -> Result<()> {
        let mut auth = self.inner.auth.lock().await;
        self.refresh_locked(&mut auth).await
    }

    /// Client credentials flow. The app becomes the caller.
    ///
    /// # Arguments
    ///
    /// * `client_creds` - Replaces the configured client credentials when given
    ///
    /// # Errors
    ///
    /// Every failure at the token endpoint, including rate limits and
    /// timeouts, is returned as [`Error::Auth`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// spotify.authorize_client_creds(None).await?;
    /// let found = spotify.search("daft punk", &["artist"], None, Some(5), None).await?;
    /// ```
    pub async fn authorize_client_creds(
        &self,
        client_creds: Option<ClientCredentials>,
    ) -> Result<()> {
        {
            let mut auth = self.inner.auth.lock().await;
            if let Some(creds) = client_creds {
                auth.set_client_creds(creds);
            }
            let request = auth.client_credentials_request()?;
            let token = self
                .request_token(&request)
                .await
                .map_err(client_auth_failure)?;
            auth.apply_client_token(&token);
        }

        self.check_authorization().await
    }

    /// Second half of the authorization code flow.
    ///
    /// # Arguments
    ///
    /// * `code` - The `code` query parameter of the redirect
    /// * `set_user_creds` - Make the new user the caller
    ///
    /// # Returns
    ///
    /// The user credentials built from the token answer, whether or not they
    /// were installed.
    pub async fn build_user_creds(
        &self,
        code: &str,
        set_user_creds: bool,
    ) -> Result<UserCredentials> {
        self.exchange_code(code, None, set_user_creds).await
    }

    /// Second half of the PKCE flow.
    pub async fn build_user_creds_pkce(
        &self,
        code: &str,
        verifier: &str,
        set_user_creds: bool,
    ) -> Result<UserCredentials> {
        self.exchange_code(code, Some(verifier), set_user_creds)
            .await
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
        set_user_creds: bool,
    ) -> Result<UserCredentials> {
        let request = self
            .inner
            .auth
            .lock()
            .await
            .authorization_code_request(code, verifier)?;
        let token = self.request_token(&request).await?;
        let creds = UserCredentials::from_token_response(&token);

        if set_user_creds {
            self.set_user_creds(creds.clone()).await?;
        }
        Ok(creds)
    }

    /// Makes `creds` the caller and drops cached answers of the previous one.
    pub async fn set_user_creds(&self, creds: UserCredentials) -> Result<()> {
        self.inner.auth.lock().await.set_user_creds(creds);
        self.inner.transport.clear_cache();
        self.after_user_change().await
    }

    pub(super) async fn after_user_change(&self) -> Result<()> {
        let has_token = self
            .inner
            .auth
            .lock()
            .await
            .user_creds()
            .is_some_and(|u| u.access_token.is_some() || u.refresh_token.is_some());
        if !has_token {
            return Ok(());
        }

        if self.config().ensure_user_auth {
            self.check_authorization().await?;
        }
        if self.config().populate_user_creds {
            self.populate_user_creds().await?;
        }
        Ok(())
    }

    /// Copies the `/me` profile into the user credentials.
    pub async fn populate_user_creds(&self) -> Result<()> {
        let me = self.me().await?;
        if let Some(user) = self.inner.auth.lock().await.user_creds_mut() {
            user.populate_from_profile(&me);
        }
        Ok(())
    }

    pub async fn check_authorization(&self) -> Result<()> {
        self.send(probe_request(self.config())?).await.map(|_| ())
    }

    /// Whether the current caller's credentials are accepted.
    pub async fn is_active(&self) -> Result<bool> {
        if self.caller().await.is_none() {
            return Ok(false);
        }
        match self.check_authorization().await {
            Ok(()) => Ok(true),
            Err(Error::Auth { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn is_premium(&self) -> Result<bool> {
        let known = self
            .user_creds()
            .await
            .and_then(|u| u.product);
        let product = match known {
            Some(product) => Some(product),
            None => {
                self.populate_user_creds().await?;
                self.user_creds().await.and_then(|u| u.product)
            }
        };
        Ok(product.as_deref() == Some("premium"))
    }

    pub async fn me(&self) -> Result<Value> {
        self.get("/me", &Query::new()).await
    }

    pub async fn user_profile(&self, user_id: &str) -> Result<Value> {
        self.get(&format!("/users/{user_id}"), &Query::new()).await
    }

    pub async fn search(
        &self,
        q: &str,
        types: &[&str],
        market: Option<&str>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Value> {
        let market = resolve_market(self.config(), self.caller().await, market);
        let request = search_request(self.config(), q, types, market, limit, offset)?;
        self.send(request).await
    }

    /// Following page of a paged answer, `None` on the last page.
    ///
    /// The `next` link may sit at the top level or under the first object
    /// that carries one, as in search answers.
    pub async fn next_page(&self, response: &Value) -> Result<Option<Value>> {
        match page_request(response, "next") {
            Some(request) => self.send(request).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn previous_page(&self, response: &Value) -> Result<Option<Value>> {
        match page_request(response, "previous") {
            Some(request) => self.send(request).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn clear_cache(&self) {
        self.inner.transport.clear_cache();
    }
}
