use std::io::{self, BufRead, Write};

use tabled::Table;

use super::{client_creds_from_env, client_from_env, redact, spinner};
use crate::{
    AsyncSpotify, AuthUriOptions, Endpoints, Res, config, error, info, success,
    types::CredentialTableRow, utils, warning,
};

async fn oauth_client() -> AsyncSpotify {
    let creds = client_creds_from_env();
    if !creds.is_oauth_ready() {
        error!("SPOTIFY_CLIENT_ID and SPOTIFY_REDIRECT_URI must be set to authorize a user");
    }

    match AsyncSpotify::builder()
        .client_creds(creds)
        .endpoints(Endpoints::from_env())
        .build_async()
        .await
    {
        Ok(spotify) => spotify,
        Err(e) => error!("Cannot create client. Err: {}", e),
    }
}

fn options(state: Option<String>, verifier: Option<&str>) -> AuthUriOptions {
    let mut options = AuthUriOptions::default();
    if let Some(state) = state {
        options = options.with_state(state);
    }
    if let Some(verifier) = verifier {
        options = options.with_pkce_verifier(verifier);
    }
    options
}

fn read_line() -> Res<String> {
    print!("> ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input)
}

fn open_or_print(url: &str) {
    if webbrowser::open(url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            url
        );
    }
}

pub async fn auth_url(state: Option<String>, pkce: bool, open: bool) {
    let spotify = oauth_client().await;

    let verifier = pkce.then(utils::generate_code_verifier);
    let url = match spotify
        .auth_uri(options(state, verifier.as_deref()))
        .await
    {
        Ok(url) => url,
        Err(e) => error!("Cannot build authorize URL. Err: {}", e),
    };

    println!("{url}");
    if let Some(verifier) = verifier {
        info!("PKCE code verifier: {}", verifier);
    }
    if open {
        open_or_print(&url);
    }
}

pub async fn login(pkce: bool) {
    let spotify = oauth_client().await;
    let client = spotify.client_creds().await;
    if !pkce && !client.has_secret() {
        error!("SPOTIFY_CLIENT_SECRET is not set. Use --pkce for apps without a secret");
    }

    let verifier = pkce.then(utils::generate_code_verifier);
    let url = match spotify.auth_uri(options(None, verifier.as_deref())).await {
        Ok(url) => url,
        Err(e) => error!("Cannot build authorize URL. Err: {}", e),
    };

    info!("Authorize the app in your browser, then paste the URL you were redirected to.");
    open_or_print(&url);

    let input = match read_line() {
        Ok(input) => input,
        Err(e) => error!("Cannot read redirect URL. Err: {}", e),
    };

    let Some(code) = utils::extract_code(&input) else {
        error!("No authorization code found in the input.");
    };

    let pb = spinner("Exchanging authorization code...");
    let result = match &verifier {
        Some(verifier) => spotify.build_user_creds_pkce(&code, verifier, false).await,
        None => spotify.build_user_creds(&code, false).await,
    };
    pb.finish_and_clear();

    let user = match result {
        Ok(user) => user,
        Err(e) => error!("Authorization failed. Err: {}", e),
    };

    let rows = vec![
        CredentialTableRow {
            field: "SPOTIFY_ACCESS_TOKEN".to_string(),
            value: user.access_token.clone().unwrap_or_default(),
        },
        CredentialTableRow {
            field: "SPOTIFY_REFRESH_TOKEN".to_string(),
            value: user.refresh_token.clone().unwrap_or_default(),
        },
        CredentialTableRow {
            field: "expires".to_string(),
            value: user.expiry.map(|e| e.to_rfc3339()).unwrap_or_default(),
        },
        CredentialTableRow {
            field: "scopes".to_string(),
            value: user.scopes.join(" "),
        },
    ];

    success!("Authentication successful!");
    println!("{}", Table::new(rows));
    info!(
        "Add the tokens to {} to use them with other commands.",
        config::env_file_path().display()
    );
}

pub async fn client_token() {
    let spotify = client_from_env().await;
    let creds = spotify.client_creds().await;

    let rows = vec![
        CredentialTableRow {
            field: "access_token".to_string(),
            value: redact(creds.access_token.as_deref().unwrap_or_default()),
        },
        CredentialTableRow {
            field: "expires".to_string(),
            value: creds.expiry.map(|e| e.to_rfc3339()).unwrap_or_default(),
        },
    ];

    success!("Client credentials accepted.");
    println!("{}", Table::new(rows));
}
