use chrono::{Duration, Utc};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use spotkit::{Caller, ClientCredentials, Endpoints, Error, Proxies, Spotify, UserCredentials};

fn builder(server: &ServerGuard) -> spotkit::SpotifyBuilder {
    Spotify::builder()
        .client_creds(ClientCredentials::new("id", "secret"))
        .endpoints(Endpoints::with_base(&server.url()))
        .backoff_factor(0.0)
}

fn user_client(server: &ServerGuard, user: UserCredentials) -> Spotify {
    builder(server).user_creds(user).build().unwrap()
}

fn token_body(access: &str) -> String {
    json!({"access_token": access, "token_type": "Bearer", "expires_in": 3600}).to_string()
}

fn expired_401() -> String {
    json!({"error": {"status": 401, "message": "The access token expired"}}).to_string()
}

// headers go out at once, the body only after every client timeout used here
fn stalled_body(w: &mut dyn std::io::Write) -> std::io::Result<()> {
    std::thread::sleep(std::time::Duration::from_millis(1500));
    w.write_all(b"{}")
}

fn impatient_client(server: &ServerGuard) -> Spotify {
    builder(server)
        .user_creds(UserCredentials::new("token"))
        .timeout(std::time::Duration::from_millis(200))
        .max_retries(2)
        .build()
        .unwrap()
}

#[test]
fn test_client_credentials_flow() {
    let mut server = Server::new();
    let token = server
        .mock("POST", "/api/token")
        .match_header("authorization", "Basic aWQ6c2VjcmV0")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "client_credentials".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("app"))
        .create();
    let probe = server
        .mock("GET", "/v1/search")
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer app")
        .with_status(200)
        .with_body("{}")
        .expect(2)
        .create();

    let spotify = builder(&server).build().unwrap();
    assert_eq!(spotify.caller(), None);

    spotify.authorize_client_creds(None).unwrap();

    assert_eq!(spotify.caller(), Some(Caller::Client));
    assert_eq!(spotify.client_creds().access_token.as_deref(), Some("app"));
    assert!(spotify.is_active().unwrap());
    token.assert();
    probe.assert();
}

#[test]
fn test_client_credentials_rejected() {
    let mut server = Server::new();
    server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(json!({"error": "invalid_client"}).to_string())
        .create();

    let spotify = builder(&server).build().unwrap();
    let err = spotify.authorize_client_creds(None).unwrap_err();

    assert!(err.is_auth_error());
    assert_eq!(err.status(), Some(400));
    assert_eq!(spotify.caller(), None);
}

#[test]
fn test_refreshes_and_retries_once_on_401() {
    let mut server = Server::new();
    let rejected = server
        .mock("GET", "/v1/me")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .with_body(expired_401())
        .create();
    let refresh = server
        .mock("POST", "/api/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh".into()),
        ]))
        .with_status(200)
        .with_body(token_body("new"))
        .create();
    let accepted = server
        .mock("GET", "/v1/me")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(json!({"id": "wizzler"}).to_string())
        .create();

    let spotify = user_client(&server, UserCredentials::new("old").with_refresh_token("refresh"));
    let me = spotify.me().unwrap();

    assert_eq!(me["id"], "wizzler");
    let user = spotify.user_creds().unwrap();
    assert_eq!(user.access_token.as_deref(), Some("new"));
    assert_eq!(user.refresh_token.as_deref(), Some("refresh"));
    rejected.assert();
    refresh.assert();
    accepted.assert();
}

#[test]
fn test_expired_token_refreshed_before_sending() {
    let mut server = Server::new();
    let stale = server
        .mock("GET", "/v1/me")
        .match_header("authorization", "Bearer old")
        .expect(0)
        .create();
    let refresh = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_body(token_body("new"))
        .create();
    let fresh = server
        .mock("GET", "/v1/me")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(json!({"id": "wizzler"}).to_string())
        .create();

    let user = UserCredentials::new("old")
        .with_refresh_token("refresh")
        .with_expiry(Utc::now() - Duration::seconds(30));
    let spotify = user_client(&server, user);
    spotify.me().unwrap();

    stale.assert();
    refresh.assert();
    fresh.assert();
}

#[test]
fn test_401_without_refresh_token_is_auth_error() {
    let mut server = Server::new();
    server
        .mock("GET", "/v1/me")
        .with_status(401)
        .with_body(expired_401())
        .create();
    let refresh = server.mock("POST", "/api/token").expect(0).create();

    let spotify = user_client(&server, UserCredentials::new("old"));
    let err = spotify.me().unwrap_err();

    match err {
        Error::Auth { status, message } => {
            assert_eq!(status, Some(401));
            assert_eq!(message, "The access token expired");
        }
        other => panic!("expected auth error, got {other:?}"),
    }
    refresh.assert();
}

#[test]
fn test_second_401_is_not_retried_again() {
    let mut server = Server::new();
    let me = server
        .mock("GET", "/v1/me")
        .with_status(401)
        .with_body(expired_401())
        .expect(2)
        .create();
    let refresh = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_body(token_body("new"))
        .expect(1)
        .create();

    let spotify = user_client(&server, UserCredentials::new("old").with_refresh_token("refresh"));
    assert!(spotify.me().unwrap_err().is_auth_error());

    me.assert();
    refresh.assert();
}

#[test]
fn test_refresh_returning_same_token_gives_up() {
    let mut server = Server::new();
    server
        .mock("GET", "/v1/me")
        .with_status(401)
        .with_body(expired_401())
        .create();
    server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_body(token_body("old"))
        .create();

    let spotify = user_client(&server, UserCredentials::new("old").with_refresh_token("refresh"));
    assert!(matches!(spotify.me(), Err(Error::TokenNotRefreshed)));
}

#[test]
fn test_backs_off_on_429() {
    let mut server = Server::new();
    let limited = server
        .mock("GET", "/v1/users/wizzler")
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(1)
        .create();
    let ok = server
        .mock("GET", "/v1/users/wizzler")
        .with_status(200)
        .with_body(json!({"id": "wizzler"}).to_string())
        .create();

    let spotify = user_client(&server, UserCredentials::new("token"));
    let profile = spotify.user_profile("wizzler").unwrap();

    assert_eq!(profile["id"], "wizzler");
    limited.assert();
    ok.assert();
}

#[test]
fn test_rate_limit_budget_exhausted() {
    let mut server = Server::new();
    server
        .mock("GET", "/v1/me")
        .with_status(429)
        .with_header("retry-after", "1")
        .create();

    let spotify = builder(&server)
        .user_creds(UserCredentials::new("token"))
        .max_retries(0)
        .build()
        .unwrap();

    match spotify.me().unwrap_err() {
        Error::RateLimited { retry_after, .. } => {
            assert_eq!(retry_after, Some(std::time::Duration::from_secs(1)));
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[test]
fn test_api_errors_carry_status_and_message() {
    let mut server = Server::new();
    server
        .mock("GET", "/v1/users/nobody")
        .with_status(404)
        .with_body(json!({"error": {"status": 404, "message": "Non existing id"}}).to_string())
        .create();

    let spotify = user_client(&server, UserCredentials::new("token"));
    match spotify.user_profile("nobody").unwrap_err() {
        Error::Api {
            status,
            message,
            url,
        } => {
            assert_eq!(status, Some(404));
            assert_eq!(message, "Non existing id");
            assert!(url.unwrap().ends_with("/v1/users/nobody"));
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[test]
fn test_etag_revalidation_serves_cached_body() {
    let mut server = Server::new();
    let first = server
        .mock("GET", "/v1/me")
        .with_status(200)
        .with_header("etag", "\"v1\"")
        .with_body(json!({"id": "wizzler"}).to_string())
        .expect(1)
        .create();
    let revalidated = server
        .mock("GET", "/v1/me")
        .match_header("if-none-match", "\"v1\"")
        .with_status(304)
        .expect(1)
        .create();

    let spotify = user_client(&server, UserCredentials::new("token"));
    let fetched = spotify.me().unwrap();
    let cached = spotify.me().unwrap();

    assert_eq!(fetched, cached);
    first.assert();
    revalidated.assert();
}

#[test]
fn test_fresh_cache_entry_skips_network() {
    let mut server = Server::new();
    let me = server
        .mock("GET", "/v1/me")
        .with_status(200)
        .with_header("cache-control", "private, max-age=60")
        .with_body(json!({"id": "wizzler"}).to_string())
        .expect(1)
        .create();

    let spotify = user_client(&server, UserCredentials::new("token"));
    spotify.me().unwrap();
    assert_eq!(spotify.me().unwrap()["id"], "wizzler");
    me.assert();
}

#[test]
fn test_disabled_cache_always_hits_network() {
    let mut server = Server::new();
    let me = server
        .mock("GET", "/v1/me")
        .with_status(200)
        .with_header("cache-control", "max-age=60")
        .with_body(json!({"id": "wizzler"}).to_string())
        .expect(2)
        .create();

    let spotify = builder(&server)
        .user_creds(UserCredentials::new("token"))
        .cache(false)
        .build()
        .unwrap();
    spotify.me().unwrap();
    spotify.me().unwrap();
    me.assert();
}

#[test]
fn test_search_defaults_market_for_users() {
    let mut server = Server::new();
    let search = server
        .mock("GET", "/v1/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "daft punk".into()),
            Matcher::UrlEncoded("type".into(), "artist,track".into()),
            Matcher::UrlEncoded("market".into(), "from_token".into()),
            Matcher::UrlEncoded("limit".into(), "5".into()),
        ]))
        .with_status(200)
        .with_body(json!({"artists": {"items": []}}).to_string())
        .create();

    let spotify = user_client(&server, UserCredentials::new("token"));
    spotify
        .search("daft punk", &["artist", "track"], None, Some(5), None)
        .unwrap();
    search.assert();
}

#[test]
fn test_pagination_follows_next_links() {
    let mut server = Server::new();
    let page = server
        .mock("GET", "/v1/search")
        .match_query(Matcher::UrlEncoded("offset".into(), "20".into()))
        .with_status(200)
        .with_body(json!({"tracks": {"items": [], "next": null, "previous": null}}).to_string())
        .create();

    let spotify = user_client(&server, UserCredentials::new("token"));
    let first = json!({
        "tracks": {
            "items": [],
            "next": format!("{}/v1/search?q=x&type=track&offset=20", server.url()),
            "previous": null
        }
    });

    let second = spotify.next_page(&first).unwrap().expect("second page");
    assert!(spotify.previous_page(&first).unwrap().is_none());
    assert!(spotify.next_page(&second).unwrap().is_none());
    page.assert();
}

#[test]
fn test_populate_user_creds_on_build() {
    let mut server = Server::new();
    let me = server
        .mock("GET", "/v1/me")
        .with_status(200)
        .with_body(
            json!({"id": "wizzler", "display_name": "Wizzler", "product": "premium"}).to_string(),
        )
        .expect(1)
        .create();

    let spotify = builder(&server)
        .user_creds(UserCredentials::new("token"))
        .populate_user_creds(true)
        .build()
        .unwrap();

    let user = spotify.user_creds().unwrap();
    assert_eq!(user.user_id.as_deref(), Some("wizzler"));
    assert!(spotify.is_premium().unwrap());
    me.assert();
}

#[test]
fn test_ensure_user_auth_rejects_bad_token() {
    let mut server = Server::new();
    server
        .mock("GET", "/v1/search")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(expired_401())
        .create();

    let result = builder(&server)
        .user_creds(UserCredentials::new("bad"))
        .ensure_user_auth(true)
        .build();
    assert!(matches!(result, Err(Error::Auth { .. })));
}

#[test]
fn test_builder_rejects_token_and_user_creds() {
    let result = Spotify::builder()
        .access_token("a")
        .user_creds(UserCredentials::new("b"))
        .build();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_no_caller_fails_without_network() {
    let spotify = Spotify::builder()
        .endpoints(Endpoints::with_base("http://127.0.0.1:9"))
        .build()
        .unwrap();
    assert!(spotify.me().unwrap_err().is_auth_error());
    assert!(!spotify.is_active().unwrap());
}

#[test]
fn test_malformed_token_answer_is_auth_error() {
    let mut server = Server::new();
    server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_body("{}")
        .create();

    let spotify = builder(&server).build().unwrap();
    let err = spotify.authorize_client_creds(None).unwrap_err();

    assert!(err.is_auth_error());
    assert_eq!(err.status(), Some(200));
}

#[test]
fn test_rate_limited_token_endpoint_is_auth_error() {
    let mut server = Server::new();
    server
        .mock("POST", "/api/token")
        .with_status(429)
        .with_header("retry-after", "1")
        .create();

    let spotify = builder(&server).max_retries(0).build().unwrap();
    match spotify.authorize_client_creds(None).unwrap_err() {
        Error::Auth { status, message } => {
            assert_eq!(status, Some(429));
            assert_eq!(message, "Failed to authenticate with client credentials");
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[test]
fn test_timed_out_get_is_retried() {
    let mut server = Server::new();
    let me = server
        .mock("GET", "/v1/me")
        .with_chunked_body(stalled_body)
        .expect(3)
        .create();

    let spotify = impatient_client(&server);
    assert!(matches!(spotify.me(), Err(Error::Timeout(_))));
    me.assert();
}

#[test]
fn test_timed_out_post_is_not_retried() {
    let mut server = Server::new();
    let playlists = server
        .mock("POST", "/v1/users/wizzler/playlists")
        .with_chunked_body(stalled_body)
        .expect(1)
        .create();

    let spotify = impatient_client(&server);
    let result = spotify.post(
        "/users/wizzler/playlists",
        &spotkit::Query::new(),
        Some(json!({"name": "New Playlist"})),
    );

    assert!(matches!(result, Err(Error::Timeout(_))));
    playlists.assert();
}

#[test]
fn test_scheme_proxy_wins_over_catch_all() {
    let mut server = Server::new();
    let proxied = server
        .mock("GET", "/v1/me")
        .match_header("host", "spotify.test")
        .with_status(200)
        .with_body(json!({"id": "wizzler"}).to_string())
        .create();

    // the catch-all proxy points at a closed port
    let spotify = Spotify::builder()
        .endpoints(Endpoints::with_base("http://spotify.test"))
        .user_creds(UserCredentials::new("token"))
        .proxies(Proxies {
            http: Some(server.url()),
            all: Some("http://127.0.0.1:9".to_string()),
            ..Proxies::default()
        })
        .build()
        .unwrap();

    assert_eq!(spotify.me().unwrap()["id"], "wizzler");
    proxied.assert();
}

#[test]
fn test_concurrent_rejections_refresh_once() {
    let mut server = Server::new();
    server
        .mock("GET", "/v1/me")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .with_body(expired_401())
        .create();
    let refresh = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_body(token_body("new"))
        .expect(1)
        .create();
    server
        .mock("GET", "/v1/me")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(json!({"id": "wizzler"}).to_string())
        .create();

    let spotify = builder(&server)
        .user_creds(UserCredentials::new("old").with_refresh_token("refresh"))
        .cache(false)
        .build()
        .unwrap();

    let (a, b) = std::thread::scope(|s| {
        let a = s.spawn(|| spotify.me());
        let b = s.spawn(|| spotify.me());
        (a.join().unwrap(), b.join().unwrap())
    });

    assert_eq!(a.unwrap()["id"], "wizzler");
    assert_eq!(b.unwrap()["id"], "wizzler");
    refresh.assert();
}
