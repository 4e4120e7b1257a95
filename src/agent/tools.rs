//! Built-in tools: simulated weather, current time, and Brave web search.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::{America::Los_Angeles, Tz};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::base::types::Res;

use super::Tool;

const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const DEFAULT_WEB_SEARCH_COUNT: usize = 5;
const MAX_WEB_SEARCH_COUNT: usize = 10;
const WEB_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Read a required, non-empty string argument.
pub fn string_arg<'a>(args: &'a Value, name: &str) -> Res<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing '{name}' parameter"))
}

fn query_parameters(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": description
            }
        },
        "required": ["query"]
    })
}

fn is_san_francisco(query: &str) -> bool {
    let query = query.to_lowercase();

    query.contains("sf") || query.contains("san francisco")
}

/// San Francisco is the only place we know the time zone of.
fn timezone_for(query: &str) -> Option<Tz> {
    is_san_francisco(query).then_some(Los_Angeles)
}

/// Simulated weather for `query`.
pub fn weather_report(query: &str) -> String {
    if is_san_francisco(query) {
        "It's 60 degrees and foggy.".to_string()
    } else {
        "It's 90 degrees and sunny.".to_string()
    }
}

/// The time at `now` for `query`, or an apology when its time zone is unknown.
pub fn current_time_report(query: &str, now: DateTime<Utc>) -> String {
    match timezone_for(query) {
        Some(tz) => format!(
            "The current time for query {query} is {}",
            now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z%z")
        ),
        None => format!("Sorry, I don't have timezone information for query: {query}."),
    }
}

// Weather.

pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the weather for a location."
    }

    fn parameters(&self) -> Value {
        query_parameters("The location to get weather information for.")
    }

    async fn call(&self, args: Value) -> Res<String> {
        Ok(weather_report(string_arg(&args, "query")?))
    }
}

// Time.

pub struct TimeTool;

#[async_trait]
impl Tool for TimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current time for a city."
    }

    fn parameters(&self) -> Value {
        query_parameters("The city to get the current time for.")
    }

    async fn call(&self, args: Value) -> Res<String> {
        Ok(current_time_report(string_arg(&args, "query")?, Utc::now()))
    }
}

// Web search.

/// Web search backed by the Brave Search API.
pub struct WebSearchTool {
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>) -> Res<Self> {
        let client = Client::builder().timeout(WEB_SEARCH_TIMEOUT).build()?;

        Ok(Self { api_key, client })
    }
}

fn format_results(query: &str, results: &[BraveResult]) -> String {
    if results.is_empty() {
        return format!("No web search results found for '{query}'.");
    }

    let mut output = format!("Web search results for '{query}':\n\n");

    for (index, item) in results.iter().enumerate() {
        output.push_str(&format!("{}. {}\n   {}\n", index + 1, item.title, item.url));

        if let Some(description) = item.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            output.push_str(&format!("   {description}\n"));
        }

        output.push('\n');
    }

    output.trim_end().to_string()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return result titles, URLs, and snippets."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query."
                },
                "count": {
                    "type": "integer",
                    "description": "Number of results (1-10).",
                    "minimum": 1,
                    "maximum": MAX_WEB_SEARCH_COUNT
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Value) -> Res<String> {
        let query = string_arg(&args, "query")?;
        let count = args
            .get("count")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_WEB_SEARCH_COUNT, |c| c as usize)
            .clamp(1, MAX_WEB_SEARCH_COUNT);
        let count_param = count.to_string();

        let Some(api_key) = self.api_key.as_deref() else {
            return Err(anyhow::anyhow!("Brave Search API key is not configured"));
        };

        let response = self
            .client
            .get(BRAVE_API_URL)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[("q", query), ("count", count_param.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Brave Search API error: {status} ({})", detail.trim()));
        }

        let payload: BraveResponse = response.json().await?;
        let results = payload.web.map(|w| w.results).unwrap_or_default();

        Ok(format_results(query, &results[..results.len().min(count)]))
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_weather_report() {
        assert_eq!(weather_report("San Francisco"), "It's 60 degrees and foggy.");
        assert_eq!(weather_report("SF downtown"), "It's 60 degrees and foggy.");
        assert_eq!(weather_report("Tokyo"), "It's 90 degrees and sunny.");
    }

    #[test]
    fn test_current_time_report() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 20, 30, 0).unwrap();

        assert_eq!(
            current_time_report("San Francisco", now),
            "The current time for query San Francisco is 2025-01-15 12:30:00 PST-0800"
        );
        assert_eq!(
            current_time_report("Tokyo", now),
            "Sorry, I don't have timezone information for query: Tokyo."
        );
    }

    #[tokio::test]
    async fn test_tools_require_query() {
        assert!(WeatherTool.call(json!({})).await.is_err());
        assert!(TimeTool.call(json!({ "query": "  " })).await.is_err());
        assert_eq!(WeatherTool.call(json!({ "query": "sf" })).await.unwrap(), "It's 60 degrees and foggy.");
    }

    #[tokio::test]
    async fn test_web_search_requires_api_key() {
        let tool = WebSearchTool::new(None).unwrap();
        let err = tool.call(json!({ "query": "rust" })).await.unwrap_err();

        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_format_results() {
        let results = vec![
            BraveResult {
                title: "Rust".to_string(),
                url: "https://www.rust-lang.org".to_string(),
                description: Some("A language empowering everyone.".to_string()),
            },
            BraveResult {
                title: "Docs".to_string(),
                url: "https://doc.rust-lang.org".to_string(),
                description: None,
            },
        ];

        assert_eq!(
            format_results("rust", &results),
            "Web search results for 'rust':\n\n1. Rust\n   https://www.rust-lang.org\n   A language empowering everyone.\n\n2. Docs\n   https://doc.rust-lang.org"
        );
        assert_eq!(format_results("nothing", &[]), "No web search results found for 'nothing'.");
    }
}
