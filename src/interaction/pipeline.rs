//! The per-message agent pipeline.
//!
//! Every chat branch ends up here: resolve the user's session, build a fresh
//! agent graph, run it with the session's history, and return the final text.

use std::sync::Arc;

use tracing::{Instrument, Span, error, field::Empty, info, info_span, instrument};

use crate::{
    agent::{factory::AgentFactory, final_text, runner::Runner},
    base::{
        config::Config,
        prompts::{EMPTY_RESPONSE, error_response},
        types::Res,
    },
    service::{llm::LlmClient, prompt::PromptClient, session::SessionStore},
};

use super::session::SessionManager;

/// The message pipeline.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    llm: LlmClient,
    factory: AgentFactory,
    sessions: SessionManager,
    store: SessionStore,
}

impl Pipeline {
    pub fn new(config: &Config, llm: LlmClient, prompts: PromptClient, store: SessionStore) -> Res<Self> {
        let factory = AgentFactory::new(config, prompts, llm.clone())?;
        let sessions = SessionManager::new(&config.app_name, store.clone());

        Ok(Self {
            inner: Arc::new(PipelineInner {
                llm,
                factory,
                sessions,
                store,
            }),
        })
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// Answer `text` from `user_id`.
    ///
    /// Never fails: errors are logged and turned into a user-visible reply.
    pub async fn process_message(&self, user_id: &str, text: &str) -> String {
        match self.run(user_id, text).await {
            Ok(reply) => reply,
            Err(err) => {
                error!("Failed to process message from `{user_id}`: {err:#}");
                error_response(&err)
            }
        }
    }

    #[instrument(
        name = "process_message",
        skip_all,
        fields(langfuse.user.id = %user_id, langfuse.session.id = Empty)
    )]
    async fn run(&self, user_id: &str, text: &str) -> Res<String> {
        let session_id = self.inner.sessions.get_or_create_session(user_id).await?;
        Span::current().record("langfuse.session.id", session_id.as_str());

        let agents = self.inner.factory.create_agents().await;

        let generation = info_span!(
            "generation",
            "langfuse.observation.type" = "generation",
            langfuse.observation.input = %text,
            langfuse.observation.output = Empty,
            langfuse.observation.prompt.name = Empty,
            langfuse.observation.prompt.version = Empty,
            gen_ai.request.model = %agents.root.model,
        );

        if let Some(handle) = &agents.root_prompt {
            generation.record("langfuse.observation.prompt.name", handle.name.as_str());
            generation.record("langfuse.observation.prompt.version", i64::from(handle.version));
        }

        let runner = Runner::new(&agents.root, &self.inner.llm, &self.inner.store);
        let events = runner.run(&session_id, text).instrument(generation.clone()).await?;

        let reply = final_text(&events);
        generation.record("langfuse.observation.output", reply.as_str());

        info!("Agent produced {} events for session `{session_id}`.", events.len());

        if reply.is_empty() {
            return Ok(EMPTY_RESPONSE.to_string());
        }

        Ok(reply)
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, fmt, sync::Mutex};

    use async_trait::async_trait;
    use tracing::{
        Subscriber,
        field::{Field, Visit},
        span::{Attributes, Id, Record},
    };
    use tracing_subscriber::{Layer, layer::Context, prelude::*, registry::LookupSpan};

    use super::*;
    use crate::service::{
        llm::{ChatRequest, ChatResponse, GenericLlmClient},
        prompt::{GenericPromptClient, Prompt, PromptHandle},
    };

    struct FixedLlm(Option<ChatResponse>);

    #[async_trait]
    impl GenericLlmClient for FixedLlm {
        async fn chat(&self, _request: &ChatRequest) -> Res<ChatResponse> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("model unavailable"))
        }
    }

    fn pipeline(response: Option<ChatResponse>) -> Pipeline {
        Pipeline::new(
            &Config::default(),
            LlmClient::new(Arc::new(FixedLlm(response))),
            PromptClient::disabled(),
            SessionStore::memory(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_process_message_returns_reply() {
        let pipeline = pipeline(Some(ChatResponse::text("こんにちは")));

        assert_eq!(pipeline.process_message("U1", "hello").await, "こんにちは");
        assert_eq!(pipeline.sessions().len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_reply_becomes_placeholder() {
        let pipeline = pipeline(Some(ChatResponse::default()));

        assert_eq!(pipeline.process_message("U1", "hello").await, EMPTY_RESPONSE);
    }

    /// Collects every span's fields by span name, including later `record` calls.
    #[derive(Clone, Default)]
    struct SpanFields(Arc<Mutex<HashMap<String, HashMap<String, String>>>>);

    impl SpanFields {
        fn get(&self, span: &str, field: &str) -> Option<String> {
            self.0.lock().unwrap().get(span).and_then(|fields| fields.get(field)).cloned()
        }
    }

    struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

    impl Visit for FieldVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }

        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_i64(&mut self, field: &Field, value: i64) {
            self.0.insert(field.name().to_string(), value.to_string());
        }
    }

    impl<S> Layer<S> for SpanFields
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            let mut spans = self.0.lock().unwrap();
            let fields = spans.entry(attrs.metadata().name().to_string()).or_default();
            attrs.record(&mut FieldVisitor(fields));
        }

        fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
            let Some(span) = ctx.span(id) else { return };
            let mut spans = self.0.lock().unwrap();
            let fields = spans.entry(span.name().to_string()).or_default();
            values.record(&mut FieldVisitor(fields));
        }
    }

    struct RootPromptOnly;

    #[async_trait]
    impl GenericPromptClient for RootPromptOnly {
        async fn fetch_prompt(&self, name: &str, label: &str) -> Res<Prompt> {
            if name != "root_agent" {
                return Err(anyhow::anyhow!("prompt `{name}` not found"));
            }

            Ok(Prompt {
                text: "You are a helpful assistant.".to_string(),
                handle: PromptHandle {
                    name: name.to_string(),
                    version: 7,
                    label: label.to_string(),
                },
            })
        }
    }

    #[tokio::test]
    async fn test_spans_carry_trace_attributes() {
        let fields = SpanFields::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(fields.clone()));

        let pipeline = Pipeline::new(
            &Config::default(),
            LlmClient::new(Arc::new(FixedLlm(Some(ChatResponse::text("こんにちは"))))),
            PromptClient::new(Arc::new(RootPromptOnly)),
            SessionStore::memory(10),
        )
        .unwrap();

        assert_eq!(pipeline.process_message("U1", "hello").await, "こんにちは");

        assert_eq!(fields.get("process_message", "langfuse.user.id").as_deref(), Some("U1"));
        assert_eq!(fields.get("process_message", "langfuse.session.id").as_deref(), Some("slack_U1"));

        assert_eq!(fields.get("generation", "langfuse.observation.type").as_deref(), Some("generation"));
        assert_eq!(fields.get("generation", "langfuse.observation.input").as_deref(), Some("hello"));
        assert_eq!(fields.get("generation", "langfuse.observation.output").as_deref(), Some("こんにちは"));
        assert_eq!(fields.get("generation", "langfuse.observation.prompt.name").as_deref(), Some("root_agent"));
        assert_eq!(fields.get("generation", "langfuse.observation.prompt.version").as_deref(), Some("7"));
        assert_eq!(fields.get("generation", "gen_ai.request.model").as_deref(), Some("gemini-2.5-flash"));
    }

    #[tokio::test]
    async fn test_errors_become_reply() {
        let pipeline = pipeline(None);

        assert_eq!(pipeline.process_message("U1", "hello").await, "エラーが発生しました: model unavailable");
    }
}
