//! Runtime services and shared state for the bot.

use tracing::instrument;

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    interaction::pipeline::Pipeline,
    service::{chat::ChatClient, llm::LlmClient, prompt::PromptClient, session::SessionStore},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the service clients, the message pipeline, and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The prompt client instance.
    pub prompts: PromptClient,
    /// The message pipeline.
    pub pipeline: Pipeline,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the LLM client.
        let llm = LlmClient::gemini(&config)?;

        // Initialize the prompt client.
        let prompts = PromptClient::langfuse(&config)?;

        // Initialize the session store and the pipeline.
        let store = SessionStore::memory(config.max_history_messages);
        let pipeline = Pipeline::new(&config, llm.clone(), prompts.clone(), store)?;

        // Initialize the chat client.
        let chat = ChatClient::slack(&config, pipeline.clone()).await?;

        Ok(Self {
            config,
            llm,
            prompts,
            pipeline,
            chat,
        })
    }

    pub async fn start(&self) -> Void {
        self.chat.start().await
    }
}
