use tracing::instrument;

use crate::{
    base::types::Res,
    service::{
        llm::{ChatMessage, LlmClient},
        session::SessionStore,
    },
};

use super::{Agent, AgentEvent, final_text};

/// Runs an agent against a stored session.
///
/// The session's history is sent along with the new message, and the exchange
/// (the user's message and the agent's final text) is appended afterwards.
pub struct Runner<'a> {
    agent: &'a Agent,
    llm: &'a LlmClient,
    store: &'a SessionStore,
}

impl<'a> Runner<'a> {
    pub fn new(agent: &'a Agent, llm: &'a LlmClient, store: &'a SessionStore) -> Self {
        Self { agent, llm, store }
    }

    #[instrument(name = "Runner::run", skip(self, message))]
    pub async fn run(&self, session_id: &str, message: &str) -> Res<Vec<AgentEvent>> {
        let mut messages = self.store.history(session_id).await?;
        messages.push(ChatMessage::user(message));

        let events = self.agent.run(self.llm, messages).await?;

        let reply = final_text(&events);
        let mut turns = vec![ChatMessage::user(message)];
        if !reply.is_empty() {
            turns.push(ChatMessage::assistant(reply));
        }

        self.store.append(session_id, turns).await?;

        Ok(events)
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::service::llm::{ChatRequest, ChatResponse, GenericLlmClient};

    struct RecordingLlm {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl GenericLlmClient for RecordingLlm {
        async fn chat(&self, request: &ChatRequest) -> Res<ChatResponse> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(request.messages.clone());

            Ok(ChatResponse::text(format!("reply {}", seen.len())))
        }
    }

    #[tokio::test]
    async fn test_history_carries_across_runs() {
        let llm = Arc::new(RecordingLlm { seen: Mutex::new(Vec::new()) });
        let client = LlmClient::new(llm.clone());
        let store = SessionStore::memory(10);
        store.create_session("app", "U1", "slack_U1").await.unwrap();

        let agent = Agent {
            name: "root_agent".to_string(),
            description: String::new(),
            model: "gemini-2.5-flash".to_string(),
            instruction: "Be helpful.".to_string(),
            tools: Vec::new(),
            max_tool_iterations: 2,
        };
        let runner = Runner::new(&agent, &client, &store);

        runner.run("slack_U1", "first").await.unwrap();
        let events = runner.run("slack_U1", "second").await.unwrap();

        assert_eq!(final_text(&events), "reply 2");
        assert_eq!(
            llm.seen.lock().unwrap()[1],
            vec![ChatMessage::user("first"), ChatMessage::assistant("reply 1"), ChatMessage::user("second")]
        );
        assert_eq!(store.history("slack_U1").await.unwrap().len(), 4);
    }

    /// Answers with the given replies in order; an empty reply yields no text.
    struct ScriptedLlm {
        replies: Vec<&'static str>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl GenericLlmClient for ScriptedLlm {
        async fn chat(&self, request: &ChatRequest) -> Res<ChatResponse> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(request.messages.clone());

            Ok(match self.replies[seen.len() - 1] {
                "" => ChatResponse::default(),
                reply => ChatResponse::text(reply),
            })
        }
    }

    #[tokio::test]
    async fn test_capped_history_after_empty_reply_starts_with_user() {
        let llm = Arc::new(ScriptedLlm {
            replies: vec!["r1", "r2", "", "r4"],
            seen: Mutex::new(Vec::new()),
        });
        let client = LlmClient::new(llm.clone());
        let store = SessionStore::memory(4);
        store.create_session("app", "U1", "slack_U1").await.unwrap();

        let agent = Agent {
            name: "root_agent".to_string(),
            description: String::new(),
            model: "gemini-2.5-flash".to_string(),
            instruction: String::new(),
            tools: Vec::new(),
            max_tool_iterations: 2,
        };
        let runner = Runner::new(&agent, &client, &store);

        for message in ["m1", "m2", "m3", "m4"] {
            runner.run("slack_U1", message).await.unwrap();
        }

        let seen = llm.seen.lock().unwrap();
        assert_eq!(
            seen[3],
            vec![ChatMessage::user("m2"), ChatMessage::assistant("r2"), ChatMessage::user("m3"), ChatMessage::user("m4")]
        );
    }

    #[tokio::test]
    async fn test_unknown_session_fails() {
        let client = LlmClient::new(Arc::new(RecordingLlm { seen: Mutex::new(Vec::new()) }));
        let store = SessionStore::memory(10);
        let agent = Agent {
            name: "root_agent".to_string(),
            description: String::new(),
            model: "gemini-2.5-flash".to_string(),
            instruction: String::new(),
            tools: Vec::new(),
            max_tool_iterations: 2,
        };

        assert!(Runner::new(&agent, &client, &store).run("missing", "hi").await.is_err());
    }
}
