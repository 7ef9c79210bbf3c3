//! Error types shared by the blocking and async clients.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Any non-success answer of the Web API other than 401.
    #[error("Spotify API error ({}): {message}", status_label(.status))]
    Api {
        status: Option<u16>,
        message: String,
        url: Option<String>,
    },

    /// 401 answers and every failure of an OAuth2 flow.
    #[error("Authentication error ({}): {message}", status_label(.status))]
    Auth {
        status: Option<u16>,
        message: String,
    },

    /// 429 answers that outlived the retry budget.
    #[error("Rate limit exceeded for {url} (retry after {retry_after:?})")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("Request to {0} timed out, try increasing the client's timeout")]
    Timeout(String),

    /// A refresh succeeded but handed back the token that was just rejected.
    #[error("Token refresh succeeded but the access token did not change; giving up to avoid looping")]
    TokenNotRefreshed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no status".to_string(),
    }
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth {
            status: None,
            message: message.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        Error::Api {
            status: None,
            message: message.into(),
            url: None,
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } | Error::Auth { status, .. } => *status,
            Error::RateLimited { .. } => Some(429),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_reported_for_api_and_rate_limit_errors() {
        let err = Error::Api {
            status: Some(404),
            message: "non existing id".into(),
            url: None,
        };
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_auth_error());

        let err = Error::RateLimited {
            url: "https://api.spotify.com/v1/me".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.status(), Some(429));
        assert!(err.is_rate_limit());
    }

    #[test]
    fn display_includes_status_label() {
        let err = Error::auth("No client credentials set");
        assert_eq!(
            err.to_string(),
            "Authentication error (no status): No client credentials set"
        );
    }
}
