//! A small LLM agent runtime.
//!
//! An [`Agent`] is an instruction plus a set of [`Tool`]s.  Running an agent sends
//! the conversation to the model, executes whatever tools the model asks for,
//! feeds the results back, and repeats until the model answers with text.  Every
//! round is reported as an [`AgentEvent`]; the last event is the final response.
//!
//! Agents are cheap values: the factory builds a fresh graph for every message so
//! the latest prompt text is always used.

pub mod factory;
pub mod runner;
pub mod tools;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::{
    base::types::Res,
    service::llm::{ChatMessage, ChatRequest, LlmClient, ToolCall, ToolSpec},
};

// Traits.

/// A capability the model can call.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// The function name exposed to the model.
    fn name(&self) -> &str;

    /// What the tool does, for the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Execute the tool.
    async fn call(&self, args: Value) -> Res<String>;

    /// The declaration sent to the model.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

// Events.

/// One piece of an agent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPart {
    Text(String),
    ToolCall(ToolCall),
    ToolResult { id: String, name: String, content: String },
}

/// Something that happened while an agent ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEvent {
    /// The name of the agent that produced the event.
    pub author: String,
    pub parts: Vec<EventPart>,
    is_final: bool,
}

impl AgentEvent {
    fn new(author: &str, parts: Vec<EventPart>, is_final: bool) -> Self {
        Self {
            author: author.to_string(),
            parts,
            is_final,
        }
    }

    /// Whether this event is the agent's final response.
    pub fn is_final_response(&self) -> bool {
        self.is_final
    }

    /// The concatenated text parts of this event.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| if let EventPart::Text(text) = part { Some(text.as_str()) } else { None })
            .collect()
    }
}

/// Concatenate the text of every final event.
pub fn final_text(events: &[AgentEvent]) -> String {
    events.iter().filter(|e| e.is_final_response()).map(AgentEvent::text).collect()
}

// Agents.

/// An LLM-driven agent.
#[derive(Clone)]
pub struct Agent {
    pub name: String,
    /// Shown to a parent agent when this agent is wrapped as a tool.
    pub description: String,
    pub model: String,
    pub instruction: String,
    pub tools: Vec<Arc<dyn Tool>>,
    /// Maximum tool-calling rounds per run.
    pub max_tool_iterations: u32,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.iter().map(|t| t.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

impl Agent {
    /// Run the agent over a conversation whose last message is the new user input.
    #[instrument(name = "Agent::run", skip_all, fields(agent = %self.name))]
    pub async fn run(&self, llm: &LlmClient, messages: Vec<ChatMessage>) -> Res<Vec<AgentEvent>> {
        let tools = self.tools.iter().map(|t| t.spec()).collect::<Vec<_>>();

        let mut request = ChatRequest {
            model: self.model.clone(),
            instruction: self.instruction.clone(),
            messages,
            tools,
        };

        let mut events = Vec::new();
        let mut rounds = 0;

        loop {
            let response = llm.chat(&request).await?;
            let text_parts = response.text.iter().cloned().map(EventPart::Text);

            if !response.has_tool_calls() {
                events.push(AgentEvent::new(&self.name, text_parts.collect(), true));
                return Ok(events);
            }

            if rounds >= self.max_tool_iterations {
                warn!("Agent `{}` reached {} tool rounds; returning partial response.", self.name, rounds);
                events.push(AgentEvent::new(&self.name, text_parts.collect(), true));
                return Ok(events);
            }

            rounds += 1;

            // Report the requested calls.

            let parts = text_parts.chain(response.tool_calls.iter().cloned().map(EventPart::ToolCall)).collect();
            events.push(AgentEvent::new(&self.name, parts, false));

            let content = if response.text.is_empty() { None } else { Some(response.text.concat()) };
            request.messages.push(ChatMessage::Assistant {
                content,
                tool_calls: response.tool_calls.clone(),
            });

            // Execute the calls, and feed the results back.

            let mut results = Vec::with_capacity(response.tool_calls.len());

            for call in &response.tool_calls {
                let content = self.call_tool(call).await;

                request.messages.push(ChatMessage::tool_result(&call.id, &content));
                results.push(EventPart::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    content,
                });
            }

            events.push(AgentEvent::new(&self.name, results, false));
        }
    }

    /// Execute one tool call; failures become the tool result.
    async fn call_tool(&self, call: &ToolCall) -> String {
        info!("Agent `{}` calling tool `{}` ...", self.name, call.name);

        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            warn!("Unknown tool requested: {}", call.name);
            return format!("Error: unknown tool `{}`.", call.name);
        };

        let args = if call.arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(&call.arguments) {
                Ok(args) => args,
                Err(err) => {
                    warn!("Invalid arguments for tool `{}`: {err}", call.name);
                    return format!("Error: invalid arguments JSON: {err}");
                }
            }
        };

        match tool.call(args).await {
            Ok(result) => result,
            Err(err) => {
                warn!("Tool `{}` failed: {err}", call.name);
                format!("Error: {err}")
            }
        }
    }
}

/// An agent exposed to another agent as a tool.
///
/// The wrapped agent runs one-shot on the `request` argument, without history.
pub struct AgentTool {
    agent: Agent,
    llm: LlmClient,
}

impl AgentTool {
    pub fn new(agent: Agent, llm: LlmClient) -> Self {
        Self { agent, llm }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn description(&self) -> &str {
        &self.agent.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "The task or question for the agent."
                }
            },
            "required": ["request"]
        })
    }

    async fn call(&self, args: Value) -> Res<String> {
        let request = tools::string_arg(&args, "request")?;
        let events = self.agent.run(&self.llm, vec![ChatMessage::user(request)]).await?;

        Ok(final_text(&events))
    }
}

// Tests.
