pub mod langfuse;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::base::types::Res;

// Types.

/// Metadata identifying the exact prompt version an agent was built from.
///
/// Carried alongside agents so traces can be linked to the prompt that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptHandle {
    pub name: String,
    pub version: u32,
    pub label: String,
}

/// A prompt fetched from the prompt service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// The compiled, plain-text prompt.
    pub text: String,
    pub handle: PromptHandle,
}

// Traits.

/// Generic prompt-service trait that clients must implement.
///
/// Implementations fetch the current version of a named prompt; they are never
/// expected to cache.
#[async_trait]
pub trait GenericPromptClient: Send + Sync + 'static {
    /// Fetch and compile the prompt `name` deployed under `label`.
    async fn fetch_prompt(&self, name: &str, label: &str) -> Res<Prompt>;
}

// Structs.

/// Prompt client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct PromptClient {
    inner: Arc<dyn GenericPromptClient>,
}

impl Deref for PromptClient {
    type Target = dyn GenericPromptClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl PromptClient {
    pub fn new(inner: Arc<dyn GenericPromptClient>) -> Self {
        Self { inner }
    }

    /// Get the latest text of a prompt, or `fallback` when it cannot be fetched.
    ///
    /// Every call goes to the prompt service.  Failures of any kind are logged and
    /// yield `(fallback, None)`; this never returns an error.
    #[instrument(skip(self, fallback))]
    pub async fn get_prompt(&self, name: &str, fallback: &str, label: &str) -> (String, Option<PromptHandle>) {
        debug!("[langfuse] Fetching prompt `{name}` ...");

        match self.fetch_prompt(name, label).await {
            Ok(prompt) if !prompt.text.trim().is_empty() => {
                debug!("[langfuse] Fetched prompt `{name}` (version {}).", prompt.handle.version);
                (prompt.text, Some(prompt.handle))
            }
            Ok(_) => {
                debug!("[langfuse] Prompt `{name}` is empty; using fallback.");
                (fallback.to_string(), None)
            }
            Err(err) => {
                debug!("[langfuse] Failed to fetch prompt `{name}`; using fallback: {err}");
                (fallback.to_string(), None)
            }
        }
    }
}

/// Prompt client used when no prompt-service credentials are configured.
pub struct DisabledPromptClient;

#[async_trait]
impl GenericPromptClient for DisabledPromptClient {
    async fn fetch_prompt(&self, name: &str, _label: &str) -> Res<Prompt> {
        Err(anyhow::anyhow!("Prompt service credentials are missing; cannot fetch `{name}`."))
    }
}

impl PromptClient {
    /// A prompt client that always falls back.
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledPromptClient))
    }
}

// Tests.
