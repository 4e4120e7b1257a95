//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;
use serde_with::{NoneAsEmptyString, serde_as};

use super::types::Res;

/// Default Langfuse host.
fn default_langfuse_host() -> String {
    "http://localhost:3000".to_string()
}

/// Default Google Cloud location.
fn default_google_cloud_location() -> String {
    "global".to_string()
}

/// Vertex AI is the default generative AI backend.
fn default_google_genai_use_vertexai() -> bool {
    true
}

/// Default model for both agents.
fn default_agent_model() -> String {
    "gemini-2.5-flash".to_string()
}

/// Default application name used when registering sessions.
fn default_app_name() -> String {
    "adk-slack-bot".to_string()
}

/// Default prompt deployment label.
fn default_prompt_label() -> String {
    "production".to_string()
}

/// Default prompt name for the root agent.
fn default_root_agent_prompt_name() -> String {
    "root_agent".to_string()
}

/// Default prompt name for the search agent.
fn default_search_agent_prompt_name() -> String {
    "search_agent".to_string()
}

/// Location used by slash commands invoked without an argument.
fn default_location() -> String {
    "サンフランシスコ".to_string()
}

/// Default tool-calling rounds per agent run.
fn default_max_tool_iterations() -> u32 {
    8
}

/// Default number of conversation turns kept per session.
fn default_max_history_messages() -> usize {
    40
}

/// Default capacity of the thread-ownership set.
fn default_max_tracked_threads() -> usize {
    50_000
}

/// Configuration for the bot.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    #[serde(default)]
    pub slack_bot_token: String,
    /// Slack app token for socket mode (`SLACK_APP_TOKEN`).
    #[serde(default)]
    pub slack_app_token: String,
    /// Langfuse public key (`LANGFUSE_PUBLIC_KEY`).
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub langfuse_public_key: Option<String>,
    /// Langfuse secret key (`LANGFUSE_SECRET_KEY`).
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub langfuse_secret_key: Option<String>,
    /// Langfuse host (`LANGFUSE_HOST`).
    #[serde(default = "default_langfuse_host")]
    pub langfuse_host: String,
    /// Google Cloud project, required for Vertex AI (`GOOGLE_CLOUD_PROJECT`).
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub google_cloud_project: Option<String>,
    /// Google Cloud location (`GOOGLE_CLOUD_LOCATION`).
    #[serde(default = "default_google_cloud_location")]
    pub google_cloud_location: String,
    /// Use Vertex AI instead of the Gemini API (`GOOGLE_GENAI_USE_VERTEXAI`).
    #[serde(default = "default_google_genai_use_vertexai")]
    pub google_genai_use_vertexai: bool,
    /// Gemini API key, required when Vertex AI is disabled (`GOOGLE_API_KEY`).
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub google_api_key: Option<String>,
    /// Static Vertex AI bearer token (`GOOGLE_CLOUD_ACCESS_TOKEN`).
    /// When absent, tokens are requested from the GCE metadata server.
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub google_cloud_access_token: Option<String>,
    /// Brave Search API key for the search agent (`BRAVE_API_KEY`).
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub brave_api_key: Option<String>,
    /// Model used by both agents (`AGENT_MODEL`).
    #[serde(default = "default_agent_model")]
    pub agent_model: String,
    /// Application name used when registering sessions (`APP_NAME`).
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Prompt deployment label (`PROMPT_LABEL`).
    #[serde(default = "default_prompt_label")]
    pub prompt_label: String,
    /// Prompt name for the root agent (`ROOT_AGENT_PROMPT_NAME`).
    #[serde(default = "default_root_agent_prompt_name")]
    pub root_agent_prompt_name: String,
    /// Prompt name for the search agent (`SEARCH_AGENT_PROMPT_NAME`).
    #[serde(default = "default_search_agent_prompt_name")]
    pub search_agent_prompt_name: String,
    /// Location used by slash commands without an argument (`DEFAULT_LOCATION`).
    #[serde(default = "default_location")]
    pub default_location: String,
    /// Maximum tool-calling rounds per agent run (`MAX_TOOL_ITERATIONS`).
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    /// Conversation turns kept per session (`MAX_HISTORY_MESSAGES`).
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    /// Capacity of the thread-ownership set (`MAX_TRACKED_THREADS`).
    #[serde(default = "default_max_tracked_threads")]
    pub max_tracked_threads: usize,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            slack_bot_token: String::new(),
            slack_app_token: String::new(),
            langfuse_public_key: None,
            langfuse_secret_key: None,
            langfuse_host: default_langfuse_host(),
            google_cloud_project: None,
            google_cloud_location: default_google_cloud_location(),
            google_genai_use_vertexai: default_google_genai_use_vertexai(),
            google_api_key: None,
            google_cloud_access_token: None,
            brave_api_key: None,
            agent_model: default_agent_model(),
            app_name: default_app_name(),
            prompt_label: default_prompt_label(),
            root_agent_prompt_name: default_root_agent_prompt_name(),
            search_agent_prompt_name: default_search_agent_prompt_name(),
            default_location: default_location(),
            max_tool_iterations: default_max_tool_iterations(),
            max_history_messages: default_max_history_messages(),
            max_tracked_threads: default_max_tracked_threads(),
        }
    }
}

impl ConfigInner {
    /// Langfuse credentials, when both keys are present.
    pub fn langfuse_credentials(&self) -> Option<(&str, &str)> {
        match (&self.langfuse_public_key, &self.langfuse_secret_key) {
            (Some(public), Some(secret)) => Some((public.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default());

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the invariants that cannot be expressed through serde defaults.
    pub fn validate(&self) -> Res<()> {
        if self.slack_bot_token.is_empty() || self.slack_app_token.is_empty() {
            return Err(anyhow::anyhow!("SLACK_BOT_TOKEN and SLACK_APP_TOKEN must be set in the environment."));
        }

        if self.max_tool_iterations < 1 {
            return Err(anyhow::anyhow!("MAX_TOOL_ITERATIONS must be at least 1."));
        }

        if self.max_tracked_threads < 1 {
            return Err(anyhow::anyhow!("MAX_TRACKED_THREADS must be at least 1."));
        }

        Ok(())
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

// Tests.
