//! Anthropic Messages API provider.
//!
//! - `POST {base}/v1/messages` via `reqwest`
//! - System messages lifted into the top-level `system` field
//! - Retry with exponential backoff on transport errors, 429, 529 and 5xx
//! - Token usage tracking

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::llms::base_llm::{BaseLLM, BaseLLMState, LLMMessage, Role, UsageMetrics};
use crate::utilities::errors::LlmError;

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Status Anthropic returns when it is overloaded.
const STATUS_OVERLOADED: u16 = 529;

/// Anthropic native completion implementation.
///
/// ```ignore
/// let provider = AnthropicCompletion::new("claude-3-sonnet-20240229", None, None)
///     .with_temperature(0.8);
/// let text = provider.acall(vec![LLMMessage::user("Hello")]).await?;
/// ```
#[derive(Debug)]
pub struct AnthropicCompletion {
    /// Shared base LLM state.
    pub state: BaseLLMState,
    /// Request timeout in seconds.
    pub timeout: Option<f64>,
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Maximum tokens in response (required for Anthropic).
    pub max_tokens: u32,
    /// Anthropic API version header.
    pub anthropic_version: String,
    /// Nucleus sampling parameter.
    pub top_p: Option<f64>,
    /// Delay before the first retry; doubled on each further attempt.
    pub initial_retry_delay: Duration,
    client: reqwest::Client,
}

impl AnthropicCompletion {
    /// Create a new Anthropic completion provider.
    ///
    /// `api_key` falls back to the `ANTHROPIC_API_KEY` environment variable.
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        let api_key = api_key.or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());

        let mut state = BaseLLMState::new(model);
        state.api_key = api_key;
        state.base_url = base_url;

        Self {
            state,
            timeout: None,
            max_retries: 2,
            max_tokens: 4096,
            anthropic_version: ANTHROPIC_VERSION.to_string(),
            top_p: None,
            initial_retry_delay: Duration::from_secs(1),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.state.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Get the API base URL.
    pub fn api_base_url(&self) -> &str {
        self.state
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    /// Split system messages from the conversation.
    ///
    /// Anthropic takes system text as a separate `system` parameter. Multiple
    /// system messages are joined with blank lines.
    fn extract_system_and_messages(messages: &[LLMMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut formatted: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                role => formatted.push(serde_json::json!({
                    "role": role.as_str(),
                    "content": msg.content,
                })),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, formatted)
    }

    /// Build the request body for the Messages API.
    pub fn build_request_body(&self, messages: &[LLMMessage]) -> Value {
        let (system, formatted_messages) = Self::extract_system_and_messages(messages);

        let mut body = serde_json::json!({
            "model": self.state.model,
            "max_tokens": self.max_tokens,
            "messages": formatted_messages,
        });

        if let Some(system_text) = system {
            body["system"] = Value::String(system_text);
        }
        if let Some(temp) = self.state.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(top_p) = self.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if !self.state.stop.is_empty() {
            body["stop_sequences"] = serde_json::json!(self.state.stop);
        }

        body
    }

    /// Concatenate the `text` blocks of a Messages API response.
    fn parse_response(&self, response: &Value) -> Result<String, LlmError> {
        if response.get("type").and_then(|t| t.as_str()) == Some("error") {
            let message = response
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown Anthropic API error");
            return Err(LlmError::Api {
                status: 200,
                body: message.to_string(),
            });
        }

        let content = response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LlmError::Decode("No content array in Anthropic response".into()))?;

        let mut text = String::new();
        for block in content {
            match block.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                "text" => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
                other => log::debug!("Ignoring Anthropic content block type: {}", other),
            }
        }

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(self.state.apply_stop_words(&text))
    }

    /// Read `usage` from a response into the running totals.
    fn track_usage(&self, response: &Value) {
        let Some(usage) = response.get("usage") else {
            return;
        };
        let field = |name: &str| usage.get(name).and_then(|v| v.as_i64()).unwrap_or(0);
        let input = field("input_tokens");
        let output = field("output_tokens");
        let cached = field("cache_read_input_tokens");

        self.state.track_token_usage(input, output, cached);
        log::debug!(
            "Anthropic token usage: input={}, output={}, total={}, cached={}",
            input,
            output,
            input + output,
            cached,
        );
    }
}

/// Whether a status is worth retrying.
fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == STATUS_OVERLOADED
        || status.is_server_error()
}

#[async_trait]
impl BaseLLM for AnthropicCompletion {
    fn model(&self) -> &str {
        &self.state.model
    }

    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn acall(&self, messages: Vec<LLMMessage>) -> Result<String, LlmError> {
        log::debug!(
            "AnthropicCompletion.acall: model={}, messages={}",
            self.state.model,
            messages.len(),
        );

        let api_key = self.state.api_key.as_ref().ok_or(LlmError::MissingApiKey)?;
        let body = self.build_request_body(&messages);
        let endpoint = format!("{}/v1/messages", self.api_base_url());
        let timeout = Duration::from_secs_f64(self.timeout.unwrap_or(120.0));

        let mut last_error = String::new();
        let mut retry_delay = self.initial_retry_delay;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!(
                    "Anthropic API retry attempt {} after {:?}: {}",
                    attempt,
                    retry_delay,
                    last_error
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let response = match self
                .client
                .post(&endpoint)
                .timeout(timeout)
                .header("content-type", "application/json")
                .header("x-api-key", api_key.as_str())
                .header("anthropic-version", &self.anthropic_version)
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if is_retryable(status) {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    retry_delay = Duration::from_secs(retry_after);
                }
                last_error = format!("Anthropic API returned {}", status);
                continue;
            }

            let response_text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            if status.is_client_error() {
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body: response_text,
                });
            }

            let response_json: Value = serde_json::from_str(&response_text).map_err(|e| {
                let preview: String = response_text.chars().take(500).collect();
                LlmError::Decode(format!("{} - Body: {}", e, preview))
            })?;

            self.track_usage(&response_json);
            return self.parse_response(&response_json);
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: last_error,
        })
    }

    fn get_token_usage_summary(&self) -> UsageMetrics {
        self.state.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicCompletion {
        AnthropicCompletion::new("claude-3-sonnet-20240229", Some("key".into()), None)
    }

    #[test]
    fn test_anthropic_new() {
        let p = provider();
        assert_eq!(p.model(), "claude-3-sonnet-20240229");
        assert_eq!(p.provider(), "anthropic");
        assert_eq!(p.max_tokens, 4096);
        assert_eq!(p.anthropic_version, "2023-06-01");
        assert_eq!(p.max_retries, 2);
    }

    #[test]
    fn test_api_base_url() {
        assert_eq!(provider().api_base_url(), "https://api.anthropic.com");

        let custom = AnthropicCompletion::new("m", None, Some("http://localhost:9000/".into()));
        assert_eq!(custom.api_base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_extract_system_multiple() {
        let messages = vec![
            LLMMessage::system("System 1."),
            LLMMessage::system("System 2."),
            LLMMessage::user("Hi"),
        ];
        let (system, formatted) = AnthropicCompletion::extract_system_and_messages(&messages);
        assert_eq!(system, Some("System 1.\n\nSystem 2.".to_string()));
        assert_eq!(formatted.len(), 1);
        assert_eq!(formatted[0]["role"], "user");
    }

    #[test]
    fn test_build_request_body() {
        let p = provider().with_temperature(0.8).with_max_tokens(1024);
        let body = p.build_request_body(&[
            LLMMessage::system("You analyse dreams."),
            LLMMessage::user("I was flying"),
            LLMMessage::assistant("Flying often means..."),
            LLMMessage::user("And falling?"),
        ]);

        assert_eq!(body["model"], "claude-3-sonnet-20240229");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["temperature"], 0.8);
        assert_eq!(body["system"], "You analyse dreams.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert!(body.get("stop_sequences").is_none());
    }

    #[test]
    fn test_parse_response_concatenates_text_blocks() {
        let response = serde_json::json!({
            "content": [
                {"type": "text", "text": "[joy:1 (high), "},
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "fear:0 (none)]"}
            ]
        });
        assert_eq!(
            provider().parse_response(&response).unwrap(),
            "[joy:1 (high), fear:0 (none)]"
        );
    }

    #[test]
    fn test_parse_response_errors() {
        let p = provider();
        let err = p
            .parse_response(&serde_json::json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            }))
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { ref body, .. } if body == "Overloaded"));

        assert!(matches!(
            p.parse_response(&serde_json::json!({"id": "x"})),
            Err(LlmError::Decode(_))
        ));
        assert!(matches!(
            p.parse_response(&serde_json::json!({"content": []})),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn test_track_usage() {
        let p = provider();
        p.track_usage(&serde_json::json!({
            "usage": {"input_tokens": 100, "output_tokens": 40}
        }));
        let usage = p.get_token_usage_summary();
        assert_eq!(usage.total_tokens, 140);
        assert_eq!(usage.successful_requests, 1);
    }

    #[test]
    fn test_is_retryable() {
        use reqwest::StatusCode;
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::from_u16(529).unwrap()));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let mut p = provider();
        p.state.api_key = None;
        let err = p.acall(vec![LLMMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }
}
