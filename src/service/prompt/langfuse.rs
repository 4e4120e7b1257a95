//! Langfuse prompt management.
//!
//! Prompts are fetched through Langfuse's public REST API on every call.  Text
//! prompts compile to their text; chat prompts compile to the contents of their
//! messages separated by blank lines.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Url, header::CACHE_CONTROL};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::base::{config::Config, types::Res};

use super::{GenericPromptClient, Prompt, PromptClient, PromptHandle};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// Extra methods on `PromptClient` applied by the langfuse implementation.

impl PromptClient {
    /// Create a Langfuse prompt client, or a disabled one when credentials are missing.
    pub fn langfuse(config: &Config) -> Res<Self> {
        let Some((public_key, secret_key)) = config.langfuse_credentials() else {
            warn!("[langfuse] Credentials are missing; fallback prompts will be used.");
            return Ok(Self::disabled());
        };

        let client = LangfusePromptClient::new(&config.langfuse_host, public_key, secret_key)?;
        info!("[langfuse] Prompt client initialized: {}", config.langfuse_host);

        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// Langfuse prompt client implementation.
pub struct LangfusePromptClient {
    http: reqwest::Client,
    host: String,
    public_key: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct LangfusePromptResponse {
    name: String,
    version: u32,
    #[serde(flatten)]
    body: LangfusePromptBody,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LangfusePromptBody {
    Text { prompt: String },
    Chat { prompt: Vec<LangfuseChatMessage> },
}

#[derive(Debug, Deserialize)]
struct LangfuseChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LangfusePromptBody {
    fn compile(&self) -> String {
        match self {
            LangfusePromptBody::Text { prompt } => prompt.clone(),
            LangfusePromptBody::Chat { prompt } => prompt
                .iter()
                .filter_map(|m| m.content.as_deref())
                .filter(|c| !c.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

impl LangfusePromptClient {
    pub fn new(host: &str, public_key: &str, secret_key: &str) -> Res<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http,
            host: host.to_string(),
            public_key: public_key.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    /// Build the prompt URL, percent-encoding the prompt name.
    fn prompt_url(&self, name: &str, label: &str) -> Res<Url> {
        let mut url = Url::parse(&self.host)?;

        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Langfuse host `{}` cannot be a base URL.", self.host))?
            .pop_if_empty()
            .extend(["api", "public", "v2", "prompts", name]);
        url.query_pairs_mut().append_pair("label", label);

        Ok(url)
    }
}

#[async_trait]
impl GenericPromptClient for LangfusePromptClient {
    #[instrument(name = "LangfusePromptClient::fetch_prompt", skip(self))]
    async fn fetch_prompt(&self, name: &str, label: &str) -> Res<Prompt> {
        let url = self.prompt_url(name, label)?;

        let response = self
            .http
            .get(url)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Langfuse returned {status} for prompt `{name}`: {}", detail.trim()));
        }

        let payload: LangfusePromptResponse = response.json().await?;

        Ok(Prompt {
            text: payload.body.compile(),
            handle: PromptHandle {
                name: payload.name,
                version: payload.version,
                label: label.to_string(),
            },
        })
    }
}

// Tests.
