//! Credential models for the application and for end users.
//!
//! Both models are plain values: the [`crate::auth::AuthManager`] mutates the
//! access token and expiry in place after each refresh. They derive serde
//! traits so embedders can persist them however they like.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config,
    error::{Error, Result},
    types::TokenResponse,
    utils,
};

/// Tokens this close to their expiry are treated as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

pub const ALL_SCOPES: &[&str] = &[
    "streaming",
    "app-remote-control",
    "user-follow-modify",
    "user-follow-read",
    "playlist-read-private",
    "playlist-modify-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "user-modify-playback-state",
    "user-read-playback-state",
    "user-read-currently-playing",
    "user-read-private",
    "user-read-email",
    "user-library-read",
    "user-library-modify",
    "user-top-read",
    "user-read-recently-played",
];

fn is_expired(expiry: Option<DateTime<Utc>>) -> Option<bool> {
    expiry.map(|at| at <= Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS))
}

/// Absolute expiry of a token valid for `expires_in` seconds. Lifetimes past
/// what a timestamp can hold saturate to the latest representable instant.
fn expiry_from(expires_in: u64) -> DateTime<Utc> {
    i64::try_from(expires_in)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub show_dialog: bool,

    // client credentials flow
    pub access_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl Default for ClientCredentials {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost".to_string(),
            scopes: ALL_SCOPES.iter().map(|s| s.to_string()).collect(),
            show_dialog: false,
            access_token: None,
            expiry: None,
        }
    }
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..Self::default()
        }
    }

    /// Credentials of an app that only uses the PKCE flow.
    pub fn public(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut creds = Self {
            client_id: Some(config::spotify_client_id()?),
            client_secret: config::spotify_client_secret(),
            ..Self::default()
        };
        if let Some(uri) = config::spotify_redirect_uri() {
            creds.redirect_uri = uri;
        }
        Ok(creds)
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_scopes<S: AsRef<str>>(mut self, scopes: &[S]) -> Self {
        self.scopes = scopes.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_show_dialog(mut self, show_dialog: bool) -> Self {
        self.show_dialog = show_dialog;
        self
    }

    /// Whether there is enough to start the authorization code flow.
    pub fn is_oauth_ready(&self) -> bool {
        self.client_id.as_deref().is_some_and(|id| !id.is_empty())
            && !self.redirect_uri.is_empty()
            && !self.scopes.is_empty()
    }

    pub fn has_secret(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// `None` when no expiry is known.
    pub fn access_is_expired(&self) -> Option<bool> {
        is_expired(self.expiry)
    }

    pub fn basic_authorization(&self) -> Result<String> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => {
                // the colon is part of the encoded value
                let encoded = STANDARD.encode(format!("{id}:{secret}"));
                Ok(format!("Basic {encoded}"))
            }
            _ => Err(Error::auth(
                "No client credentials found to make an authorization header",
            )),
        }
    }

    pub(crate) fn apply_token(&mut self, token: &TokenResponse) {
        self.access_token = Some(token.access_token.clone());
        self.expiry = Some(expiry_from(token.expires_in));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub scopes: Vec<String>,
    /// CSRF value to round-trip through the authorize URI.
    pub state: String,

    pub display_name: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub product: Option<String>,
}

impl Default for UserCredentials {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            expiry: None,
            user_id: None,
            scopes: Vec::new(),
            state: utils::create_secret(),
            display_name: None,
            country: None,
            email: None,
            product: None,
        }
    }
}

impl UserCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::default()
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            access_token: Some(config::spotify_access_token()?),
            refresh_token: config::spotify_refresh_token(),
            ..Self::default()
        })
    }

    pub fn from_token_response(token: &TokenResponse) -> Self {
        Self {
            access_token: Some(token.access_token.clone()),
            refresh_token: token.refresh_token.clone(),
            expiry: Some(expiry_from(token.expires_in)),
            scopes: token.scopes(),
            ..Self::default()
        }
    }

    /// Copies every field that is set on `other`. The state is kept.
    pub fn update_with(&mut self, other: UserCredentials) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.access_token, other.access_token);
        take(&mut self.refresh_token, other.refresh_token);
        take(&mut self.expiry, other.expiry);
        take(&mut self.user_id, other.user_id);
        take(&mut self.display_name, other.display_name);
        take(&mut self.country, other.country);
        take(&mut self.email, other.email);
        take(&mut self.product, other.product);
        if !other.scopes.is_empty() {
            self.scopes = other.scopes;
        }
    }

    pub fn access_is_expired(&self) -> Option<bool> {
        is_expired(self.expiry)
    }

    /// Copies the fields of a `/me` answer.
    pub fn populate_from_profile(&mut self, me: &Value) {
        let field = |key: &str| me.get(key).and_then(Value::as_str).map(str::to_string);

        if let Some(id) = field("id") {
            self.user_id = Some(id);
        }
        if let Some(name) = field("display_name") {
            self.display_name = Some(name);
        }
        if let Some(country) = field("country") {
            self.country = Some(country);
        }
        if let Some(email) = field("email") {
            self.email = Some(email);
        }
        if let Some(product) = field("product") {
            self.product = Some(product);
        }
    }
}
