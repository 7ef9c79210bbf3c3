use clap::{
    ArgAction, CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use spotkit::{cli, config, error};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the URL a user authorizes the app at
    AuthUrl(AuthUrlOptions),

    /// Authorize a user and print their tokens
    Login(LoginOptions),

    /// Get an app token through the client credentials flow
    ClientToken,

    /// Show the profile of the current user
    Me,

    /// Search the catalog
    Search(SearchOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct AuthUrlOptions {
    /// State to round-trip through the redirect
    #[clap(long)]
    pub state: Option<String>,

    /// Add a PKCE code challenge and print its verifier
    #[clap(long)]
    pub pkce: bool,

    /// Open the URL in the default browser
    #[clap(long)]
    pub open: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct LoginOptions {
    /// Use PKCE instead of the client secret
    #[clap(long)]
    pub pkce: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// Search query
    pub query: String,

    /// Item type(s) to search for; can be repeated
    #[clap(long = "type", action = ArgAction::Append, num_args = 1)]
    pub types: Vec<String>,

    /// Maximum number of results per type
    #[clap(long)]
    pub limit: Option<u32>,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::AuthUrl(opt) => cli::auth_url(opt.state, opt.pkce, opt.open).await,
        Command::Login(opt) => cli::login(opt.pkce).await,
        Command::ClientToken => cli::client_token().await,
        Command::Me => cli::me().await,
        Command::Search(opt) => cli::search(opt.query, opt.types, opt.limit).await,
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
