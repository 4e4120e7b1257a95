//! Binary entry point for `slack-agent-bot`.
//!
//! This module provides the command-line interface with options for the
//! configuration file path and logging verbosity. It initializes telemetry
//! and starts the service.

use clap::Parser;
use slack_agent_bot::base::{config::Config, telemetry, types::Void};

/// Slack agent bot: answers Slack messages with a Gemini-powered agent.
///
/// Configuration comes from environment variables (a `.env` file is loaded
/// first, when present) and, optionally, a TOML config file.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, the bot will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Main entry point for the binary.
///
/// Loads `.env` and configuration, sets up logging and trace export, and starts the bot.
#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    // A missing `.env` is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    let config = Config::load(args.config.as_deref())?;

    // Keep the guard alive so pending traces are flushed on exit.
    let _telemetry = telemetry::init(&config, args.verbose)?;

    slack_agent_bot::start(config).await
}
