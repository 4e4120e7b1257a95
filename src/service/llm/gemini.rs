//! Gemini through its OpenAI-compatible chat-completions endpoint.
//!
//! Two backends are supported, selected by `GOOGLE_GENAI_USE_VERTEXAI`:
//! - Vertex AI, authenticated with a bearer token (static, or from the GCE metadata server).
//! - The Gemini API, authenticated with an API key.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FunctionCall, FunctionObjectArgs,
    },
};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info, instrument};

use crate::base::{config::Config, types::Res};

use super::{ChatMessage, ChatRequest, ChatResponse, GenericLlmClient, LlmClient, ToolCall, ToolSpec};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const METADATA_TOKEN_URL: &str = "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120); // Tool-heavy turns can be slow.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// Extra methods on `LlmClient` applied by the gemini implementation.

impl LlmClient {
    pub fn gemini(config: &Config) -> Res<Self> {
        let client = GeminiLlmClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Types.

/// How requests are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeminiAuth {
    /// Gemini API key.
    ApiKey(String),
    /// A fixed Vertex AI bearer token.
    StaticToken(String),
    /// Vertex AI bearer tokens requested from the GCE metadata server.
    MetadataServer,
}

/// Where requests go, and as which model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiEndpoint {
    pub api_base: String,
    pub auth: GeminiAuth,
}

impl GeminiEndpoint {
    /// Resolve the endpoint from configuration.
    pub fn from_config(config: &Config) -> Res<Self> {
        if config.google_genai_use_vertexai {
            let project = config
                .google_cloud_project
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("GOOGLE_CLOUD_PROJECT must be set when GOOGLE_GENAI_USE_VERTEXAI is true."))?;
            let location = config.google_cloud_location.as_str();

            let host = if location == "global" {
                "aiplatform.googleapis.com".to_string()
            } else {
                format!("{location}-aiplatform.googleapis.com")
            };

            let auth = match &config.google_cloud_access_token {
                Some(token) => GeminiAuth::StaticToken(token.clone()),
                None => GeminiAuth::MetadataServer,
            };

            Ok(Self {
                api_base: format!("https://{host}/v1/projects/{project}/locations/{location}/endpoints/openapi"),
                auth,
            })
        } else {
            let api_key = config
                .google_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("GOOGLE_API_KEY must be set when GOOGLE_GENAI_USE_VERTEXAI is false."))?;

            Ok(Self {
                api_base: GEMINI_API_BASE.to_string(),
                auth: GeminiAuth::ApiKey(api_key),
            })
        }
    }

    /// The model name as the endpoint expects it.
    ///
    /// Vertex AI's OpenAI-compatible endpoint wants publisher-qualified names.
    pub fn model_name(&self, model: &str) -> String {
        match self.auth {
            GeminiAuth::ApiKey(_) => model.to_string(),
            _ if model.contains('/') => model.to_string(),
            _ => format!("google/{model}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

// Structs.

/// Gemini LLM client implementation.
pub struct GeminiLlmClient {
    endpoint: GeminiEndpoint,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GeminiLlmClient {
    /// Create a new Gemini LLM client.
    #[instrument(name = "GeminiLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let endpoint = GeminiEndpoint::from_config(config)?;

        info!("Gemini endpoint: {}", endpoint.api_base);

        Ok(Self {
            endpoint,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        })
    }

    /// The credential to send with the next request.
    async fn credential(&self) -> Res<String> {
        match &self.endpoint.auth {
            GeminiAuth::ApiKey(key) | GeminiAuth::StaticToken(key) => Ok(key.clone()),
            GeminiAuth::MetadataServer => {
                let mut cached = self.token.lock().await;

                if let Some(token) = cached.as_ref()
                    && token.expires_at > Instant::now()
                {
                    return Ok(token.token.clone());
                }

                debug!("Requesting a Vertex AI access token from the metadata server ...");

                let response: MetadataTokenResponse = self
                    .http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;

                // Tokens whose expiry cannot be represented are not cached.
                *cached = token_expiry(Instant::now(), response.expires_in).map(|expires_at| CachedToken {
                    token: response.access_token.clone(),
                    expires_at,
                });

                Ok(response.access_token)
            }
        }
    }
}

/// When a token issued at `now` with `expires_in` seconds of lifetime should be refreshed.
fn token_expiry(now: Instant, expires_in: u64) -> Option<Instant> {
    now.checked_add(Duration::from_secs(expires_in).saturating_sub(TOKEN_REFRESH_MARGIN))
}

#[async_trait]
impl GenericLlmClient for GeminiLlmClient {
    #[instrument(name = "GeminiLlmClient::chat", skip_all, fields(model = %request.model))]
    async fn chat(&self, request: &ChatRequest) -> Res<ChatResponse> {
        let credential = self.credential().await?;
        let cfg = OpenAIConfig::new().with_api_base(&self.endpoint.api_base).with_api_key(credential);
        let client = Client::with_config(cfg).with_http_client(self.http.clone());

        // Create the request.

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(self.endpoint.model_name(&request.model)).messages(to_openai_messages(request)?);

        if !request.tools.is_empty() {
            builder.tools(to_openai_tools(&request.tools)?);
        }

        let response = timeout(REQUEST_TIMEOUT, client.chat().create(builder.build()?))
            .await
            .map_err(|_| anyhow::anyhow!("Gemini call timed out after {} seconds.", REQUEST_TIMEOUT.as_secs()))??;

        from_openai_response(response)
    }
}

/// Convert the request to chat-completion messages, instruction first.
fn to_openai_messages(request: &ChatRequest) -> Res<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(request.messages.len() + 1);

    messages.push(ChatCompletionRequestSystemMessageArgs::default().content(request.instruction.clone()).build()?.into());

    for message in &request.messages {
        let message = match message {
            ChatMessage::User { content } => ChatCompletionRequestUserMessageArgs::default().content(content.clone()).build()?.into(),
            ChatMessage::Assistant { content, tool_calls } => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();

                if let Some(content) = content {
                    builder.content(content.clone());
                }

                if !tool_calls.is_empty() {
                    builder.tool_calls(
                        tool_calls
                            .iter()
                            .map(|call| ChatCompletionMessageToolCall {
                                id: call.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.clone(),
                                },
                            })
                            .collect::<Vec<_>>(),
                    );
                }

                builder.build()?.into()
            }
            ChatMessage::Tool { tool_call_id, content } => ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(tool_call_id.clone())
                .content(content.clone())
                .build()?
                .into(),
        };

        messages.push(message);
    }

    Ok(messages)
}

/// Convert tool specs to function tool definitions.
fn to_openai_tools(tools: &[ToolSpec]) -> Res<Vec<ChatCompletionTool>> {
    tools
        .iter()
        .map(|tool| -> Res<ChatCompletionTool> {
            let function = FunctionObjectArgs::default()
                .name(tool.name.clone())
                .description(tool.description.clone())
                .parameters(tool.parameters.clone())
                .build()?;

            Ok(ChatCompletionToolArgs::default().r#type(ChatCompletionToolType::Function).function(function).build()?)
        })
        .collect()
}

/// Parse the first choice of a chat-completion response.
fn from_openai_response(response: CreateChatCompletionResponse) -> Res<ChatResponse> {
    let choice = response.choices.into_iter().next().ok_or_else(|| anyhow::anyhow!("The model returned no choices."))?;

    if let Some(refusal) = choice.message.refusal {
        return Err(anyhow::anyhow!("Request refused: {refusal}"));
    }

    let text = choice.message.content.into_iter().filter(|t| !t.is_empty()).collect();

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCall {
            id: if call.id.is_empty() { format!("call_{index}") } else { call.id },
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Ok(ChatResponse { text, tool_calls })
}

// Tests.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::base::config::ConfigInner;

    #[test]
    fn test_vertex_endpoint_global() {
        let config = Config::from(ConfigInner {
            google_cloud_project: Some("my-project".to_string()),
            ..Default::default()
        });

        let endpoint = GeminiEndpoint::from_config(&config).unwrap();

        assert_eq!(endpoint.api_base, "https://aiplatform.googleapis.com/v1/projects/my-project/locations/global/endpoints/openapi");
        assert_eq!(endpoint.auth, GeminiAuth::MetadataServer);
        assert_eq!(endpoint.model_name("gemini-2.5-flash"), "google/gemini-2.5-flash");
        assert_eq!(endpoint.model_name("google/gemini-2.5-pro"), "google/gemini-2.5-pro");
    }

    #[test]
    fn test_vertex_endpoint_regional_with_token() {
        let config = Config::from(ConfigInner {
            google_cloud_project: Some("my-project".to_string()),
            google_cloud_location: "us-central1".to_string(),
            google_cloud_access_token: Some("ya29.token".to_string()),
            ..Default::default()
        });

        let endpoint = GeminiEndpoint::from_config(&config).unwrap();

        assert_eq!(
            endpoint.api_base,
            "https://us-central1-aiplatform.googleapis.com/v1/projects/my-project/locations/us-central1/endpoints/openapi"
        );
        assert_eq!(endpoint.auth, GeminiAuth::StaticToken("ya29.token".to_string()));
    }

    #[test]
    fn test_vertex_endpoint_requires_project() {
        let config = Config::from(ConfigInner::default());

        assert!(GeminiEndpoint::from_config(&config).is_err());
    }

    #[test]
    fn test_gemini_api_endpoint() {
        let config = Config::from(ConfigInner {
            google_genai_use_vertexai: false,
            google_api_key: Some("AIza-test".to_string()),
            ..Default::default()
        });

        let endpoint = GeminiEndpoint::from_config(&config).unwrap();

        assert_eq!(endpoint.api_base, GEMINI_API_BASE);
        assert_eq!(endpoint.auth, GeminiAuth::ApiKey("AIza-test".to_string()));
        assert_eq!(endpoint.model_name("gemini-2.5-flash"), "gemini-2.5-flash");

        let config = Config::from(ConfigInner {
            google_genai_use_vertexai: false,
            ..Default::default()
        });
        assert!(GeminiEndpoint::from_config(&config).is_err());
    }

    #[test]
    fn test_token_expiry() {
        let now = Instant::now();

        assert_eq!(token_expiry(now, 3600), Some(now + Duration::from_secs(3540)));
        assert_eq!(token_expiry(now, 30), Some(now));
        assert_eq!(token_expiry(now, u64::MAX), None);
    }

    #[test]
    fn test_to_openai_messages_puts_instruction_first() {
        let request = ChatRequest {
            model: "gemini-2.5-flash".to_string(),
            instruction: "Be helpful.".to_string(),
            messages: vec![
                ChatMessage::user("What's the weather in SF?"),
                ChatMessage::Assistant {
                    content: None,
                    tool_calls: vec![ToolCall {
                        id: "call_0".to_string(),
                        name: "get_weather".to_string(),
                        arguments: r#"{"query":"SF"}"#.to_string(),
                    }],
                },
                ChatMessage::tool_result("call_0", "It's 60 degrees and foggy."),
            ],
            tools: Vec::new(),
        };

        let messages = serde_json::to_value(to_openai_messages(&request).unwrap()).unwrap();

        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be helpful.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "get_weather");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_0");
    }

    #[test]
    fn test_to_openai_tools() {
        let tools = to_openai_tools(&[ToolSpec {
            name: "get_weather".to_string(),
            description: "Weather lookup.".to_string(),
            parameters: json!({ "type": "object", "properties": { "query": { "type": "string" } }, "required": ["query"] }),
        }])
        .unwrap();

        let tools = serde_json::to_value(tools).unwrap();

        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "get_weather");
    }

    #[test]
    fn test_from_openai_response_text() {
        let response: CreateChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gemini-2.5-flash",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello!" },
                "finish_reason": "stop"
            }]
        }))
        .unwrap();

        let response = from_openai_response(response).unwrap();

        assert_eq!(response.text, vec!["Hello!".to_string()]);
        assert!(!response.has_tool_calls());
    }

    #[test]
    fn test_from_openai_response_tool_calls() {
        let response: CreateChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 0,
            "model": "gemini-2.5-flash",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "",
                        "type": "function",
                        "function": { "name": "get_current_time", "arguments": "{\"query\":\"SF\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        let response = from_openai_response(response).unwrap();

        assert!(response.text.is_empty());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "call_0");
        assert_eq!(response.tool_calls[0].name, "get_current_time");
    }
}
