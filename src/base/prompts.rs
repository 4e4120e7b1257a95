//! Fallback agent instructions and slash-command query templates.
//!
//! The instructions below are only used when the prompt service is unavailable
//! or has no prompt under the configured name and label.

/// Fallback instruction for the search agent.
pub const SEARCH_AGENT_INSTRUCTION: &str = r#####"
You are a diligent and exhaustive researcher. Your task is to perform comprehensive web searches and synthesize the results.
Use the `web_search` tool to find relevant information and provide a detailed, well-organized summary of your findings.
Always search for the most current and relevant information available.
"#####;

/// Fallback instruction for the root agent.
pub const ROOT_AGENT_INSTRUCTION: &str = r#####"
You are a helpful AI assistant designed to provide accurate and useful information.
You can provide weather information and current time for cities using your built-in tools.

For research tasks or when you need to search for information online, use the `search_agent` tool.
This tool will perform web searches and provide you with comprehensive information on any topic.
"#####;

/// Reply used when the agent produced no text at all.
pub const EMPTY_RESPONSE: &str = "申し訳ございませんが、応答を生成できませんでした。";

/// Prefix for agent failures posted back to the chat.
pub const ERROR_RESPONSE_PREFIX: &str = "エラーが発生しました";

/// Build the agent query for `/weather`.
pub fn weather_query(location: &str) -> String {
    format!("{location}の天気を教えて")
}

/// Build the agent query for `/time`.
pub fn time_query(location: &str) -> String {
    format!("{location}の現在時刻を教えて")
}

/// Build the user-visible reply for a failed agent run.
pub fn error_response(err: &impl std::fmt::Display) -> String {
    format!("{ERROR_RESPONSE_PREFIX}: {err}")
}

// Tests.
