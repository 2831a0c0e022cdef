//! Starwatch CLI - command-line interface for GitHub account analytics.

mod commands;
mod config;
mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use console::Term;
use starwatch::FollowSource;
use tracing_subscriber::EnvFilter;

use crate::commands::shared::OutputFormat;

#[derive(Parser)]
#[command(name = "starwatch")]
#[command(version)]
#[command(about = "GitHub account analytics: stargazers and follow-back asymmetry")]
#[command(
    long_about = "Starwatch lists a GitHub user's repositories, collects every repository's \
stargazers concurrently, and compares the user's followers with the accounts they follow. \
All requests share one rate-limit tracker, so an exhausted quota is waited out instead of \
failing the run."
)]
#[command(after_long_help = r#"EXAMPLES
    Audit a user:
        $ starwatch audit octocat

    Audit with more parallelism and a 20 minute budget, as JSON:
        $ starwatch audit octocat -c 10 -t 1200 -o json > octocat.json

    Read follower lists from profile pages, comparing case-insensitively:
        $ starwatch audit octocat --follow-source html --ignore-case

    Show the current API quota:
        $ starwatch limits

    Generate shell completions:
        $ starwatch completions bash > ~/.local/share/bash-completion/completions/starwatch

CONFIGURATION
    Starwatch reads configuration from:
      1. ~/.config/starwatch/config.toml (or $XDG_CONFIG_HOME/starwatch/config.toml)
      2. ./starwatch.toml
      3. Environment variables (STARWATCH_* prefix, sections joined by "__")
      4. .env file in current directory

ENVIRONMENT VARIABLES
    STARWATCH_GITHUB__TOKEN              GitHub personal access token
    GITHUB_TOKEN                         Used when no token is configured otherwise
    STARWATCH_GITHUB__API_URL            REST API base URL (default: https://api.github.com)
    STARWATCH_AUDIT__CONCURRENCY         Repositories collected in parallel (default: 5)
    STARWATCH_AUDIT__TIMEOUT_SECS        Overall run timeout, 0 disables (default: 600)
    STARWATCH_AUDIT__REQUESTS_PER_SECOND Proactive pacing, 0 disables (default: 10)
    STARWATCH_RETRY__MAX_ATTEMPTS        Attempts per request for transient errors (default: 5)
    RUST_LOG                             Log filter when output is not a terminal
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a user's stargazers and follow graph
    Audit(AuditArgs),
    /// Show current rate limit status
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Where follower lists are read from.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FollowSourceArg {
    /// REST API endpoints
    Api,
    /// Profile pages (?tab=followers / ?tab=following)
    Html,
}

impl From<FollowSourceArg> for FollowSource {
    fn from(arg: FollowSourceArg) -> Self {
        match arg {
            FollowSourceArg::Api => FollowSource::Api,
            FollowSourceArg::Html => FollowSource::Html,
        }
    }
}

/// Options for the audit command.
#[derive(Debug, Clone, clap::Args)]
struct AuditArgs {
    /// GitHub username to audit
    username: String,

    /// Repositories collected in parallel (default from config or 5)
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Overall timeout in seconds, 0 disables (default from config or 600)
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Where follower and following lists are read from (default from config or api)
    #[arg(long, value_enum)]
    follow_source: Option<FollowSourceArg>,

    /// Compare usernames case-insensitively
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// List every repository's stargazers (table output only)
    #[arg(short = 's', long)]
    show_stargazers: bool,

    /// Skip the initial rate limit query
    #[arg(long)]
    no_preflight: bool,

    /// Disable proactive rate limiting (may cause API throttling)
    #[arg(short = 'R', long)]
    no_rate_limit: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging only when progress bars are not drawn
    if !Term::stderr().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("starwatch=info,starwatch_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    let cli = Cli::parse();

    match cli.command {
        Commands::Audit(args) => {
            commands::audit::handle_audit(args, &config).await?;
        }
        Commands::Limits { output } => {
            commands::limits::handle_limits(output, &config).await?;
        }
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output)?;
        }
    }

    Ok(())
}
