//! Library root for `slack-agent-bot`.
//!
//! A Slack bot answering direct messages, mentions, owned threads, and the
//! `/weather` and `/time` slash commands with a Gemini-powered agent:
//! - A root agent with weather and time tools
//! - A search agent, exposed to the root agent as a tool, backed by web search
//! - Agent instructions managed in Langfuse, with built-in fallbacks
//! - Per-user conversation sessions kept in memory
//!
//! The architecture is built around extensible traits that allow for different
//! implementations of each service.

pub mod agent;
pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with LLM, prompt, and chat clients
/// - Starts the Slack listener that dispatches events
pub async fn start(config: Config) -> Void {
    info!("Starting {} ...", config.app_name);

    // Start the crypto provider.
    crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install the default crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
