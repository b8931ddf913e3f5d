//! Base LLM trait and shared state.
//!
//! Every model call in the crate goes through [`BaseLLM::acall`]: a list of
//! role-tagged messages in, the model's text out. Providers embed
//! [`BaseLLMState`] for the settings and bookkeeping they have in common.

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::utilities::errors::LlmError;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: Role,
    pub content: String,
}

impl LLMMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

/// Token counts accumulated over an LLM instance's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub total_tokens: i64,
    pub prompt_tokens: i64,
    pub cached_prompt_tokens: i64,
    pub completion_tokens: i64,
    pub successful_requests: i64,
}

impl UsageMetrics {
    pub fn add_usage_metrics(&mut self, other: &UsageMetrics) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.cached_prompt_tokens += other.cached_prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.successful_requests += other.successful_requests;
    }
}

// ---------------------------------------------------------------------------
// BaseLLM trait
// ---------------------------------------------------------------------------

/// Interface every model provider implements.
///
/// Implementations handle their own retries and timeouts; callers only see
/// the final text or an [`LlmError`].
#[async_trait]
pub trait BaseLLM: Send + Sync + fmt::Debug {
    /// Get the model identifier/name.
    fn model(&self) -> &str;

    /// Get the provider name.
    fn provider(&self) -> &str;

    /// Send messages and return the text of the reply.
    async fn acall(&self, messages: Vec<LLMMessage>) -> Result<String, LlmError>;

    /// Cumulative token usage for this instance.
    fn get_token_usage_summary(&self) -> UsageMetrics {
        UsageMetrics::default()
    }
}

// ---------------------------------------------------------------------------
// BaseLLMState
// ---------------------------------------------------------------------------

/// Settings and counters shared by provider implementations.
#[derive(Debug)]
pub struct BaseLLMState {
    /// The model identifier/name.
    pub model: String,
    /// Optional temperature setting for response generation.
    pub temperature: Option<f64>,
    /// Optional API key.
    pub api_key: Option<String>,
    /// Optional base URL for the API.
    pub base_url: Option<String>,
    /// Stop sequences that the LLM should use to stop generation.
    pub stop: Vec<String>,
    token_usage: Mutex<UsageMetrics>,
}

impl BaseLLMState {
    /// Create a new `BaseLLMState` with the given model name.
    ///
    /// # Panics
    ///
    /// Panics if `model` is empty.
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        assert!(!model.is_empty(), "Model name is required and cannot be empty");

        Self {
            model,
            temperature: None,
            api_key: None,
            base_url: None,
            stop: Vec::new(),
            token_usage: Mutex::new(UsageMetrics::default()),
        }
    }

    /// Truncate content at the earliest configured stop word.
    pub fn apply_stop_words(&self, content: &str) -> String {
        if self.stop.is_empty() || content.is_empty() {
            return content.to_string();
        }

        let earliest = self
            .stop
            .iter()
            .filter_map(|word| content.find(word.as_str()).map(|pos| (pos, word)))
            .min_by_key(|(pos, _)| *pos);

        match earliest {
            Some((pos, word)) => {
                log::debug!("Applied stop word '{}' at position {}", word, pos);
                content[..pos].trim().to_string()
            }
            None => content.to_string(),
        }
    }

    /// Add one successful request's token counts to the running totals.
    pub fn track_token_usage(&self, prompt_tokens: i64, completion_tokens: i64, cached: i64) {
        let mut usage = self.token_usage.lock();
        usage.add_usage_metrics(&UsageMetrics {
            total_tokens: prompt_tokens + completion_tokens,
            prompt_tokens,
            cached_prompt_tokens: cached,
            completion_tokens,
            successful_requests: 1,
        });
    }

    pub fn token_usage(&self) -> UsageMetrics {
        self.token_usage.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(LLMMessage::system("s").role, Role::System);
        assert_eq!(LLMMessage::user("u").role.as_str(), "user");
        assert_eq!(LLMMessage::assistant("a").content, "a");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(LLMMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn test_apply_stop_words() {
        let mut state = BaseLLMState::new("m");
        assert_eq!(state.apply_stop_words("keep all"), "keep all");

        state.stop = vec!["END".into(), "STOP".into()];
        assert_eq!(state.apply_stop_words("text STOP more END"), "text");
    }

    #[test]
    fn test_track_token_usage_accumulates() {
        let state = BaseLLMState::new("m");
        state.track_token_usage(10, 5, 0);
        state.track_token_usage(3, 2, 1);
        let usage = state.token_usage();
        assert_eq!(usage.prompt_tokens, 13);
        assert_eq!(usage.completion_tokens, 7);
        assert_eq!(usage.total_tokens, 20);
        assert_eq!(usage.cached_prompt_tokens, 1);
        assert_eq!(usage.successful_requests, 2);
    }

    #[test]
    #[should_panic]
    fn test_empty_model_panics() {
        BaseLLMState::new("");
    }
}
