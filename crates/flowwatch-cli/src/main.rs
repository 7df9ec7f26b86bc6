//! flowwatch CLI - run the flow anomaly detectors over capture text
//!
//! This CLI lets operators:
//! - Stream a directory of capture files through the configured detectors
//! - Write per-window events as JSON lines
//! - Inspect the effective detector configuration

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;

use commands::run::RunArgs;
use error::CliResult;

/// flowwatch CLI application
#[derive(Parser)]
#[command(name = "flowwatch")]
#[command(about = "flowwatch - streaming network flow anomaly detection", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FLOWWATCH_CONFIG", global = true)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the detectors over a capture directory
    Run(RunArgs),

    /// Show the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the events.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            commands::run::execute(args, &config).await?;
            Ok(())
        }
        Commands::Config => commands::config::execute(&config),
    }
}
