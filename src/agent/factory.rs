//! Builds the agent graph: a root agent with weather and time tools, and a
//! search agent exposed to it as the `search_agent` tool.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    base::{config::Config, prompts, types::Res},
    service::{
        llm::LlmClient,
        prompt::{PromptClient, PromptHandle},
    },
};

use super::{
    Agent, AgentTool, Tool,
    tools::{TimeTool, WeatherTool, WebSearchTool},
};

const ROOT_AGENT_NAME: &str = "root_agent";
const SEARCH_AGENT_NAME: &str = "search_agent";
const SEARCH_AGENT_DESCRIPTION: &str = "Performs web searches and returns a detailed summary of the findings.";

/// A freshly built agent graph, with the prompt versions it was built from.
#[derive(Debug)]
pub struct AgentSet {
    pub root: Agent,
    pub root_prompt: Option<PromptHandle>,
    pub search_prompt: Option<PromptHandle>,
}

/// Creates agent graphs from the latest prompts.
#[derive(Clone)]
pub struct AgentFactory {
    config: Config,
    prompts: PromptClient,
    llm: LlmClient,
    web_search: Arc<dyn Tool>,
}

impl AgentFactory {
    pub fn new(config: &Config, prompts: PromptClient, llm: LlmClient) -> Res<Self> {
        let web_search = Arc::new(WebSearchTool::new(config.brave_api_key.clone())?);

        Ok(Self {
            config: config.clone(),
            prompts,
            llm,
            web_search,
        })
    }

    /// Build the root agent, fetching both instructions from the prompt service.
    ///
    /// Prompts that cannot be fetched fall back to the built-in instructions, so
    /// this always succeeds.
    #[instrument(skip(self))]
    pub async fn create_agents(&self) -> AgentSet {
        let label = &self.config.prompt_label;

        let ((search_instruction, search_prompt), (root_instruction, root_prompt)) = tokio::join!(
            self.prompts.get_prompt(&self.config.search_agent_prompt_name, prompts::SEARCH_AGENT_INSTRUCTION, label),
            self.prompts.get_prompt(&self.config.root_agent_prompt_name, prompts::ROOT_AGENT_INSTRUCTION, label),
        );

        debug!(
            "Building agents (root prompt {:?}, search prompt {:?}).",
            root_prompt.as_ref().map(|h| h.version),
            search_prompt.as_ref().map(|h| h.version)
        );

        let search = Agent {
            name: SEARCH_AGENT_NAME.to_string(),
            description: SEARCH_AGENT_DESCRIPTION.to_string(),
            model: self.config.agent_model.clone(),
            instruction: search_instruction,
            tools: vec![self.web_search.clone()],
            max_tool_iterations: self.config.max_tool_iterations,
        };

        let root = Agent {
            name: ROOT_AGENT_NAME.to_string(),
            description: String::new(),
            model: self.config.agent_model.clone(),
            instruction: root_instruction,
            tools: vec![
                Arc::new(WeatherTool),
                Arc::new(TimeTool),
                Arc::new(AgentTool::new(search, self.llm.clone())),
            ],
            max_tool_iterations: self.config.max_tool_iterations,
        };

        AgentSet {
            root,
            root_prompt,
            search_prompt,
        }
    }
}

// Tests.
