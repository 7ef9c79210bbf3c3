//! OAuth2 credential lifecycle.
//!
//! [`AuthManager`] holds the application and user credentials, knows which of
//! them is currently making calls, and turns each OAuth2 flow into a
//! [`TokenRequest`]. It performs no IO; the clients send the requests it
//! builds and feed the answers back through the `apply_*` methods.
//!
//! Supported flows:
//! - **Authorization code**: [`AuthManager::auth_uri`] then
//!   [`AuthManager::authorization_code_request`]
//! - **Authorization code with PKCE**: same, with a code challenge in the URI
//!   and the verifier in the exchange
//! - **Client credentials**: [`AuthManager::client_credentials_request`]
//! - **Refresh**: [`AuthManager::refresh_request`] for whoever is the caller

use reqwest::Url;
use tracing::{debug, warn};

use crate::{
    config::Endpoints,
    creds::{ClientCredentials, UserCredentials},
    error::{Error, Result},
    types::TokenResponse,
    utils,
};

/// Which credentials sign the outgoing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Client,
    User,
}

/// A form POST against the token endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRequest {
    pub url: String,
    pub form: Vec<(String, String)>,
    /// `Basic ...` header value when the app authenticates with its secret.
    pub authorization: Option<String>,
}

impl TokenRequest {
    fn new(url: &str, grant_type: &str) -> Self {
        Self {
            url: url.to_string(),
            form: vec![("grant_type".to_string(), grant_type.to_string())],
            authorization: None,
        }
    }

    fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.form.push((key.to_string(), value.into()));
        self
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Overrides for [`AuthManager::auth_uri`]; unset fields fall back to the
/// client credentials (and to the user credentials' state).
#[derive(Debug, Clone, Default)]
pub struct AuthUriOptions {
    pub state: Option<String>,
    pub client_id: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub redirect_uri: Option<String>,
    pub show_dialog: Option<bool>,
    pub response_type: Option<String>,
    /// Adds `code_challenge` + `code_challenge_method=S256`.
    pub code_challenge: Option<String>,
}

impl AuthUriOptions {
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Derives the challenge from a PKCE verifier.
    pub fn with_pkce_verifier(mut self, verifier: &str) -> Self {
        self.code_challenge = Some(utils::generate_code_challenge(verifier));
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuthManager {
    client: ClientCredentials,
    user: Option<UserCredentials>,
    caller: Option<Caller>,
    endpoints: Endpoints,
}

impl AuthManager {
    /// Creates the manager and picks the initial caller.
    ///
    /// User credentials win when present. Otherwise the app is the caller if
    /// its credentials already carry an access token, and there is no caller
    /// until a flow completes.
    ///
    /// # Arguments
    ///
    /// * `client` - The app's credentials
    /// * `user` - Credentials of a user the app acts for, if any
    /// * `endpoints` - Token, authorize and API base URLs
    pub fn new(
        client: ClientCredentials,
        user: Option<UserCredentials>,
        endpoints: Endpoints,
    ) -> Self {
        let caller = if user.is_some() {
            Some(Caller::User)
        } else if client.access_token.is_some() {
            Some(Caller::Client)
        } else {
            None
        };

        Self {
            client,
            user,
            caller,
            endpoints,
        }
    }

    pub fn caller(&self) -> Option<Caller> {
        self.caller
    }

    pub fn client_creds(&self) -> &ClientCredentials {
        &self.client
    }

    pub fn user_creds(&self) -> Option<&UserCredentials> {
        self.user.as_ref()
    }

    pub fn user_creds_mut(&mut self) -> Option<&mut UserCredentials> {
        self.user.as_mut()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn set_user_creds(&mut self, user: UserCredentials) {
        self.user = Some(user);
        self.caller = Some(Caller::User);
    }

    pub fn set_client_creds(&mut self, client: ClientCredentials) {
        if self.client.client_id.is_some() {
            warn!("Overwriting existing client credentials");
        }
        self.client = client;
    }

    pub fn is_oauth_ready(&self) -> bool {
        self.client.is_oauth_ready()
    }

    /// Bearer token of the current caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when there is no caller or the caller holds no
    /// access token yet.
    pub fn access_token(&self) -> Result<String> {
        let token = match self.caller {
            Some(Caller::User) => self.user.as_ref().and_then(|u| u.access_token.clone()),
            Some(Caller::Client) => self.client.access_token.clone(),
            None => None,
        };

        token.ok_or_else(|| {
            Error::auth(
                "Call requires an authorized caller, either client or user. \
                 Call authorize_client_creds() or set user credentials.",
            )
        })
    }

    /// Whether the caller's token is known to be expired. A token without a
    /// known expiry never needs a refresh here; the server decides.
    pub fn needs_refresh(&self) -> bool {
        let expired = match self.caller {
            Some(Caller::User) => self.user.as_ref().and_then(|u| u.access_is_expired()),
            Some(Caller::Client) => self.client.access_is_expired(),
            None => None,
        };
        expired == Some(true)
    }

    /// Whether a refresh request can be built for the current caller.
    ///
    /// # Returns
    ///
    /// * `true` for a user with a refresh token when the app has a client id
    /// * `true` for the app when it has a secret
    /// * `false` otherwise, including when there is no caller
    pub fn can_refresh(&self) -> bool {
        match self.caller {
            Some(Caller::User) => self
                .user
                .as_ref()
                .is_some_and(|u| u.refresh_token.is_some())
                && self.client.client_id.is_some(),
            Some(Caller::Client) => self.client.has_secret(),
            None => false,
        }
    }

    pub fn client_credentials_request(&self) -> Result<TokenRequest> {
        if !self.client.has_secret() {
            return Err(Error::auth("No client credentials set"));
        }

        let mut request = TokenRequest::new(&self.endpoints.token_url, "client_credentials");
        request.authorization = Some(self.client.basic_authorization()?);
        Ok(request)
    }

    /// Request renewing the current caller's access token.
    ///
    /// A user is refreshed with its refresh token. The app repeats the client
    /// credentials flow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when there is no caller, the user has no
    /// refresh token or the app lacks the credentials to sign the request.
    pub fn refresh_request(&self) -> Result<TokenRequest> {
        match self.caller {
            Some(Caller::User) => self.user_refresh_request(),
            Some(Caller::Client) => self.client_credentials_request(),
            None => Err(Error::auth("No caller to refresh token for")),
        }
    }

    fn user_refresh_request(&self) -> Result<TokenRequest> {
        let refresh_token = self
            .user
            .as_ref()
            .and_then(|u| u.refresh_token.clone())
            .ok_or_else(|| {
                Error::auth("Access token expired and couldn't find a refresh token to refresh it")
            })?;

        let request = TokenRequest::new(&self.endpoints.token_url, "refresh_token")
            .param("refresh_token", refresh_token);
        self.sign(request)
    }

    /// Exchange of an authorization code. Pass the PKCE verifier when the
    /// authorize URI carried a code challenge.
    pub fn authorization_code_request(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<TokenRequest> {
        let mut request = TokenRequest::new(&self.endpoints.token_url, "authorization_code")
            .param("code", code)
            .param("redirect_uri", self.client.redirect_uri.clone());

        if let Some(verifier) = verifier {
            request = request.param("code_verifier", verifier);
        }
        self.sign(request)
    }

    /// Basic auth when the app has a secret, `client_id` in the form otherwise.
    fn sign(&self, mut request: TokenRequest) -> Result<TokenRequest> {
        if self.client.has_secret() {
            request.authorization = Some(self.client.basic_authorization()?);
            return Ok(request);
        }

        match &self.client.client_id {
            Some(id) => Ok(request.param("client_id", id.clone())),
            None => Err(Error::auth("No client id set")),
        }
    }

    pub fn apply_client_token(&mut self, token: &TokenResponse) {
        debug!("client credentials token valid for {}s", token.expires_in);
        self.client.apply_token(token);
        self.caller = Some(Caller::Client);
    }

    pub fn apply_user_refresh(&mut self, token: &TokenResponse) -> Result<()> {
        let user = self
            .user
            .as_mut()
            .ok_or_else(|| Error::auth("No user credentials to refresh"))?;
        user.update_with(UserCredentials::from_token_response(token));
        debug!("user token refreshed, valid for {}s", token.expires_in);
        Ok(())
    }

    /// Applies the answer of [`AuthManager::refresh_request`].
    pub fn apply_refresh(&mut self, token: &TokenResponse) -> Result<()> {
        match self.caller {
            Some(Caller::User) => self.apply_user_refresh(token),
            Some(Caller::Client) => {
                self.apply_client_token(token);
                Ok(())
            }
            None => Err(Error::auth("No caller to refresh token for")),
        }
    }

    /// Authorization URI the user is sent to.
    ///
    /// # Arguments
    ///
    /// * `options` - Per-call overrides; unset fields come from the client
    ///   credentials, and `state` from the user credentials
    ///
    /// # Example
    ///
    /// ```ignore
    /// let verifier = spotkit::utils::generate_code_verifier();
    /// let uri = manager.auth_uri(AuthUriOptions::default().with_pkce_verifier(&verifier))?;
    /// webbrowser::open(&uri)?;
    /// ```
    pub fn auth_uri(&self, options: AuthUriOptions) -> Result<String> {
        let client_id = options
            .client_id
            .or_else(|| self.client.client_id.clone())
            .ok_or_else(|| Error::auth("No client id set to build the authorization URI"))?;
        let scopes = options.scopes.unwrap_or_else(|| self.client.scopes.clone());
        let redirect_uri = options
            .redirect_uri
            .unwrap_or_else(|| self.client.redirect_uri.clone());
        let show_dialog = options.show_dialog.unwrap_or(self.client.show_dialog);
        let response_type = options.response_type.unwrap_or_else(|| "code".to_string());
        let state = options
            .state
            .or_else(|| self.user.as_ref().map(|u| u.state.clone()));

        let mut params = vec![
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
            ("response_type", response_type),
            ("scope", scopes.join(" ")),
            ("show_dialog", show_dialog.to_string()),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }
        if let Some(challenge) = options.code_challenge {
            params.push(("code_challenge", challenge));
            params.push(("code_challenge_method", "S256".to_string()));
        }

        let url = Url::parse_with_params(&self.endpoints.authorize_url, &params)
            .map_err(|e| Error::Config(format!("invalid authorize URL: {e}")))?;
        Ok(url.into())
    }
}
