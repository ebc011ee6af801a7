//! getr CLI - Command-line download manager
//!
//! Downloads one or more URLs concurrently with live progress bars.

mod commands;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// getr - concurrent, resumable downloads
#[derive(Parser)]
#[command(name = "getr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, env = "GETR_SETTINGS")]
    settings: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one or more URLs
    Get {
        /// URLs to download
        #[arg(required = true)]
        urls: Vec<String>,

        /// Directory to save into (defaults to the system temp folder)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// File name to save as (single URL only)
        #[arg(short, long)]
        name: Option<String>,

        /// Extra request header, as `Name: value`
        #[arg(short = 'H', long = "header", value_parser = commands::parse_header)]
        headers: Vec<(String, String)>,

        /// Query parameter, as `key=value`
        #[arg(short, long = "query", value_parser = commands::parse_query)]
        query: Vec<(String, String)>,

        /// Transport timeout in seconds; overrides the settings file
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Get {
            urls,
            dir,
            name,
            headers,
            query,
            timeout,
        } => {
            let settings = commands::load_settings(cli.settings.as_deref())?;
            let args = commands::GetArgs {
                urls,
                dir,
                name,
                headers,
                query,
                timeout,
            };
            commands::get(args, settings, cli.output).await?
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "getr", &mut std::io::stdout());
        }
    }

    Ok(())
}
