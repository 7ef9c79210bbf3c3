use chrono::{Duration, Utc};
use serde_json::json;
use spotkit::{
    ALL_SCOPES, ClientCredentials, UserCredentials, creds::EXPIRY_MARGIN_SECS,
    types::TokenResponse,
};

fn token(access: &str, refresh: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        scope: Some("user-read-private user-read-email".to_string()),
        expires_in: 3600,
        refresh_token: refresh.map(str::to_string),
    }
}

#[test]
fn test_client_defaults() {
    let creds = ClientCredentials::default();
    assert_eq!(creds.redirect_uri, "http://localhost");
    assert_eq!(creds.scopes.len(), ALL_SCOPES.len());
    assert!(!creds.show_dialog);
    assert!(!creds.is_oauth_ready());
    assert!(!creds.has_secret());
}

#[test]
fn test_client_oauth_readiness() {
    let creds = ClientCredentials::public("id");
    assert!(creds.is_oauth_ready());
    assert!(!creds.has_secret());

    let no_scopes = ClientCredentials::public("id").with_scopes::<&str>(&[]);
    assert!(!no_scopes.is_oauth_ready());

    assert!(ClientCredentials::new("id", "secret").has_secret());
}

#[test]
fn test_basic_authorization() {
    let creds = ClientCredentials::new("id", "secret");
    // base64("id:secret")
    assert_eq!(creds.basic_authorization().unwrap(), "Basic aWQ6c2VjcmV0");

    assert!(
        ClientCredentials::public("id")
            .basic_authorization()
            .unwrap_err()
            .is_auth_error()
    );
}

#[test]
fn test_expiry_margin() {
    let mut user = UserCredentials::new("token");
    assert_eq!(user.access_is_expired(), None);

    user.expiry = Some(Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS / 2));
    assert_eq!(user.access_is_expired(), Some(true));

    user.expiry = Some(Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS * 10));
    assert_eq!(user.access_is_expired(), Some(false));
}

#[test]
fn test_user_from_token_response() {
    let user = UserCredentials::from_token_response(&token("access", Some("refresh")));
    assert_eq!(user.access_token.as_deref(), Some("access"));
    assert_eq!(user.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(user.scopes, vec!["user-read-private", "user-read-email"]);
    assert_eq!(user.access_is_expired(), Some(false));
    assert!(!user.state.is_empty());
}

#[test]
fn test_update_with_keeps_missing_fields() {
    let mut user = UserCredentials::new("old")
        .with_refresh_token("refresh")
        .with_expiry(Utc::now() - Duration::seconds(10));
    let state = user.state.clone();

    // refresh answers usually omit the refresh token
    user.update_with(UserCredentials::from_token_response(&token("new", None)));

    assert_eq!(user.access_token.as_deref(), Some("new"));
    assert_eq!(user.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(user.access_is_expired(), Some(false));
    assert_eq!(user.state, state);
}

#[test]
fn test_populate_from_profile() {
    let mut user = UserCredentials::new("token");
    user.populate_from_profile(&json!({
        "id": "wizzler",
        "display_name": "Wizzler",
        "country": "SE",
        "product": "premium",
        "followers": {"total": 3}
    }));

    assert_eq!(user.user_id.as_deref(), Some("wizzler"));
    assert_eq!(user.display_name.as_deref(), Some("Wizzler"));
    assert_eq!(user.country.as_deref(), Some("SE"));
    assert_eq!(user.product.as_deref(), Some("premium"));
    assert_eq!(user.email, None);
}

#[test]
fn test_credentials_serde() {
    let user = UserCredentials::new("token").with_refresh_token("refresh");
    let text = serde_json::to_string(&user).unwrap();
    let back: UserCredentials = serde_json::from_str(&text).unwrap();
    assert_eq!(back, user);
}

#[test]
fn test_huge_token_lifetime_saturates() {
    for expires_in in [u64::MAX, i64::MAX as u64, 100_000_000_000_000_000] {
        let mut answer = token("access", None);
        answer.expires_in = expires_in;

        let user = UserCredentials::from_token_response(&answer);
        assert_eq!(user.expiry, Some(chrono::DateTime::<Utc>::MAX_UTC));
        assert_eq!(user.access_is_expired(), Some(false));

        let mut auth = spotkit::auth::AuthManager::new(
            ClientCredentials::new("id", "secret"),
            None,
            spotkit::Endpoints::default(),
        );
        auth.apply_client_token(&answer);
        assert_eq!(auth.client_creds().access_is_expired(), Some(false));
    }
}
