//! Spotify Web API client library
//!
//! spotkit wraps the Spotify Web API behind a blocking client ([`Spotify`])
//! and an async client ([`AsyncSpotify`]) that share credential handling,
//! OAuth2 flows and transport behavior. It also ships a small CLI built on
//! the same library.
//!
//! # Modules
//!
//! - `auth` - Credential state machine and OAuth2 token requests
//! - `cli` - Command-line interface implementations
//! - `client` - The blocking and async clients and their builder
//! - `config` - Environment variables, endpoints and client settings
//! - `creds` - Client and user credentials
//! - `error` - Error type shared by the whole crate
//! - `http` - Requests, responses, transports and the response cache
//! - `types` - Wire types and table rows
//! - `utils` - PKCE helpers and small utilities
//!
//! # Example
//!
//! ```ignore
//! use spotkit::{ClientCredentials, Spotify};
//!
//! fn main() -> spotkit::Result<()> {
//!     let spotify = Spotify::builder()
//!         .client_creds(ClientCredentials::from_env()?)
//!         .build()?;
//!     spotify.authorize_client_creds(None)?;
//!     let found = spotify.search("daft punk", &["artist"], None, Some(5), None)?;
//!     println!("{found}");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod creds;
pub mod error;
pub mod http;
pub mod types;
pub mod utils;

pub use auth::{AuthUriOptions, Caller};
pub use client::{AsyncSpotify, Spotify, SpotifyBuilder};
pub use config::{ClientConfig, Endpoints, Proxies, RetryPolicy};
pub use creds::{ALL_SCOPES, ClientCredentials, UserCredentials};
pub use error::{Error, Result};
pub use http::{Query, Request};

/// Result alias used by the CLI, where errors of any kind end up printed.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits with code 1.
///
/// Only for the CLI; library code returns [`Error`] instead.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
