//! # CLI Module
//!
//! Command implementations for the `spotkit` binary. Every command builds an
//! [`AsyncSpotify`](crate::AsyncSpotify) from the environment, runs one or
//! two library calls and renders the answer for a terminal.
//!
//! ## Commands
//!
//! - [`auth_url`] - Prints (and optionally opens) the authorize URI
//! - [`login`] - Authorization code flow, with or without PKCE
//! - [`client_token`] - Client credentials flow
//! - [`me`] - Profile of the user behind `SPOTIFY_ACCESS_TOKEN`
//! - [`search`] - Catalog search as a user or as the app
//!
//! ## Credentials
//!
//! Values are read from the process environment and from the `.env` file in
//! the local data directory (see [`crate::config::load_env`]). Nothing is
//! written back; `login` prints the tokens so they can be stored by hand.
//!
//! ## Usage
//!
//! ```bash
//! spotkit client-token
//! spotkit search "daft punk" --type artist --limit 5
//! spotkit login --pkce
//! spotkit me
//! ```
//!
//! Fatal problems are reported through the `error!` macro, which exits the
//! process.

mod auth;
mod profile;
mod search;

pub use auth::{auth_url, client_token, login};
pub use profile::me;
pub use search::search;

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::{AsyncSpotify, ClientCredentials, Endpoints, UserCredentials, config, error};

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}

fn client_creds_from_env() -> ClientCredentials {
    match ClientCredentials::from_env() {
        Ok(creds) => creds,
        Err(e) => error!("Cannot read client credentials. Err: {}", e),
    }
}

/// Client acting as the user of `SPOTIFY_ACCESS_TOKEN` when it is set, as the
/// app otherwise.
async fn client_from_env() -> AsyncSpotify {
    let mut builder = AsyncSpotify::builder()
        .endpoints(Endpoints::from_env())
        .populate_user_creds(false);

    if let Ok(creds) = ClientCredentials::from_env() {
        builder = builder.client_creds(creds);
    }

    let has_user = config::spotify_access_token().is_ok();
    if has_user {
        match UserCredentials::from_env() {
            Ok(user) => builder = builder.user_creds(user),
            Err(e) => error!("Cannot read user credentials. Err: {}", e),
        }
    }

    let spotify = match builder.build_async().await {
        Ok(spotify) => spotify,
        Err(e) => error!("Cannot create client. Err: {}", e),
    };

    if !has_user {
        let pb = spinner("Authorizing with client credentials...");
        let result = spotify.authorize_client_creds(None).await;
        pb.finish_and_clear();
        if let Err(e) = result {
            error!(
                "No user token and client credentials failed. Please run spotkit login\n Error: {}",
                e
            );
        }
    }
    spotify
}

/// Shortens a secret for display, keeping the first characters.
fn redact(secret: &str) -> String {
    if secret.chars().count() <= 12 {
        return secret.to_string();
    }
    let head: String = secret.chars().take(12).collect();
    format!("{head}...")
}
