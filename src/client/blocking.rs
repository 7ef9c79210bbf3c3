use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::{Method, StatusCode};
use serde_json::Value;
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
    http::{Query, Request, Response, blocking::BlockingTransport},
    types::TokenResponse,
};

/// Blocking Spotify client.
pub struct Spotify {
    auth: Mutex<AuthManager>,
    transport: BlockingTransport,
    config: ClientConfig,
}

impl Spotify {
    pub fn builder() -> SpotifyBuilder {
        SpotifyBuilder::default()
    }

    pub(super) fn from_parts(auth: AuthManager, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            auth: Mutex::new(auth),
            transport: BlockingTransport::new(&config)?,
            config,
        })
    }

    fn auth(&self) -> MutexGuard<'_, AuthManager> {
        self.auth.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn caller(&self) -> Option<Caller> {
        self.auth().caller()
    }

    pub fn client_creds(&self) -> ClientCredentials {
        self.auth().client_creds().clone()
    }

    pub fn user_creds(&self) -> Option<UserCredentials> {
        self.auth().user_creds().cloned()
    }

    pub fn is_oauth_ready(&self) -> bool {
        self.auth().is_oauth_ready()
    }

    pub fn auth_uri(&self, options: AuthUriOptions) -> Result<String> {
        self.auth().auth_uri(options)
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
    pub fn send(&self, request: Request) -> Result<Value> {
        let token = self.valid_token()?;
        let response = self.transport.execute(&request, Some(&token))?;
        if response.status != StatusCode::UNAUTHORIZED {
            return response.into_value(&request.url);
        }

        let token = self.token_after_rejection(&token, &response)?;
        self.transport
            .execute(&request, Some(&token))?
            .into_value(&request.url)
    }

    pub fn send_unauthorized(&self, request: Request) -> Result<Value> {
        self.transport
            .execute(&request, None)?
            .into_value(&request.url)
    }

    pub fn get(&self, path: &str, query: &Query) -> Result<Value> {
        self.send(api_request(&self.config, Method::GET, path, query, None)?)
    }

    pub fn post(&self, path: &str, query: &Query, body: Option<Value>) -> Result<Value> {
        self.send(api_request(&self.config, Method::POST, path, query, body)?)
    }

    pub fn put(&self, path: &str, query: &Query, body: Option<Value>) -> Result<Value> {
        self.send(api_request(&self.config, Method::PUT, path, query, body)?)
    }

    pub fn delete(&self, path: &str, query: &Query, body: Option<Value>) -> Result<Value> {
        self.send(api_request(&self.config, Method::DELETE, path, query, body)?)
    }

    fn valid_token(&self) -> Result<String> {
        let mut auth = self.auth();
        if auth.needs_refresh() && auth.can_refresh() {
            debug!("access token expired, refreshing before sending");
            self.refresh_locked(&mut auth)?;
        }
        auth.access_token()
    }

    fn token_after_rejection(&self, rejected: &str, response: &Response) -> Result<String> {
        let mut auth = self.auth();
        let current = auth.access_token()?;
        if current != rejected {
            return Ok(current);
        }

        if !auth.can_refresh() {
            return Err(Error::Auth {
                status: Some(response.status.as_u16()),
                message: response.message(),
            });
        }

        warn!("Access token rejected ({}), refreshing", response.message());
        self.refresh_locked(&mut auth)?;

        let refreshed = auth.access_token()?;
        if refreshed == rejected {
            return Err(Error::TokenNotRefreshed);
        }
        Ok(refreshed)
    }

    fn refresh_locked(&self, auth: &mut AuthManager) -> Result<()> {
        let request = auth.refresh_request()?;
        let token = self.request_token(&request);
        let token = match auth.caller() {
            Some(Caller::Client) => token.map_err(client_auth_failure)?,
            _ => token?,
        };
        auth.apply_refresh(&token)
    }

    fn request_token(&self, token_request: &TokenRequest) -> Result<TokenResponse> {
        let request = Request::try_from(token_request)?;
        self.transport.execute(&request, None)?.into_token()
    }

    /// Renews the current caller's access token.
    pub fn refresh_token(&self) -> Result<()> {
        let mut auth = self.auth();
        self.refresh_locked(&mut auth)
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
    /// spotify.authorize_client_creds(None)?;
    /// let found = spotify.search("daft punk", &["artist"], None, Some(5), None)?;
    /// ```
    pub fn authorize_client_creds(&self, client_creds: Option<ClientCredentials>) -> Result<()> {
        {
            let mut auth = self.auth();
            if let Some(creds) = client_creds {
                auth.set_client_creds(creds);
            }
            let request = auth.client_credentials_request()?;
            let token = self
                .request_token(&request)
                .map_err(client_auth_failure)?;
            auth.apply_client_token(&token);
        }

        self.check_authorization()
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
    pub fn build_user_creds(&self, code: &str, set_user_creds: bool) -> Result<UserCredentials> {
        self.exchange_code(code, None, set_user_creds)
    }

    /// Second half of the PKCE flow; `verifier` is the one the challenge
    /// in the authorize URI was derived from.
    pub fn build_user_creds_pkce(
        &self,
        code: &str,
        verifier: &str,
        set_user_creds: bool,
    ) -> Result<UserCredentials> {
        self.exchange_code(code, Some(verifier), set_user_creds)
    }

    fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
        set_user_creds: bool,
    ) -> Result<UserCredentials> {
        let request = self.auth().authorization_code_request(code, verifier)?;
        let token = self.request_token(&request)?;
        let creds = UserCredentials::from_token_response(&token);

        if set_user_creds {
            self.set_user_creds(creds.clone())?;
        }
        Ok(creds)
    }

    /// Makes `creds` the caller and drops cached answers of the previous one.
    pub fn set_user_creds(&self, creds: UserCredentials) -> Result<()> {
        self.auth().set_user_creds(creds);
        self.transport.clear_cache();
        self.after_user_change()
    }

    pub(super) fn after_user_change(&self) -> Result<()> {
        let has_token = self
            .auth()
            .user_creds()
            .is_some_and(|u| u.access_token.is_some() || u.refresh_token.is_some());
        if !has_token {
            return Ok(());
        }

        if self.config.ensure_user_auth {
            self.check_authorization()?;
        }
        if self.config.populate_user_creds {
            self.populate_user_creds()?;
        }
        Ok(())
    }

    /// Copies the `/me` profile into the user credentials.
    pub fn populate_user_creds(&self) -> Result<()> {
        let me = self.me()?;
        if let Some(user) = self.auth().user_creds_mut() {
            user.populate_from_profile(&me);
        }
        Ok(())
    }

    pub fn check_authorization(&self) -> Result<()> {
        self.send(probe_request(&self.config)?).map(|_| ())
    }

    /// Whether the current caller's credentials are accepted.
    pub fn is_active(&self) -> Result<bool> {
        if self.caller().is_none() {
            return Ok(false);
        }
        match self.check_authorization() {
            Ok(()) => Ok(true),
            Err(Error::Auth { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_premium(&self) -> Result<bool> {
        let known = self.auth().user_creds().and_then(|u| u.product.clone());
        let product = match known {
            Some(product) => Some(product),
            None => {
                self.populate_user_creds()?;
                self.auth().user_creds().and_then(|u| u.product.clone())
            }
        };
        Ok(product.as_deref() == Some("premium"))
    }

    pub fn me(&self) -> Result<Value> {
        self.get("/me", &Query::new())
    }

    pub fn user_profile(&self, user_id: &str) -> Result<Value> {
        self.get(&format!("/users/{user_id}"), &Query::new())
    }

    pub fn search(
        &self,
        q: &str,
        types: &[&str],
        market: Option<&str>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Value> {
        let market = resolve_market(&self.config, self.caller(), market);
        self.send(search_request(&self.config, q, types, market, limit, offset)?)
    }

    /// Following page of a paged answer, `None` on the last page.
    ///
    /// The `next` link may sit at the top level or under the first object
    /// that carries one, as in search answers.
    pub fn next_page(&self, response: &Value) -> Result<Option<Value>> {
        page_request(response, "next")
            .map(|request| self.send(request))
            .transpose()
    }

    pub fn previous_page(&self, response: &Value) -> Result<Option<Value>> {
        page_request(response, "previous")
            .map(|request| self.send(request))
            .transpose()
    }

    pub fn clear_cache(&self) {
        self.transport.clear_cache();
    }
}
