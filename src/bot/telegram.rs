//! Minimal Telegram Bot API client (long polling).

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utilities::errors::TelegramError;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Longest text `sendMessage` accepts, in characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TelegramError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (_, _) => Err(TelegramError::Api {
                description: self
                    .description
                    .unwrap_or_else(|| "no result in response".to_string()),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    base: String,
    http: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_api_url(token, DEFAULT_API_URL)
    }

    pub fn with_api_url(token: &str, api_url: &str) -> Self {
        Self {
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            http: reqwest::Client::new(),
        }
    }

    /// Long-poll for updates with id `>= offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        // The HTTP timeout has to outlast the server-side poll.
        let request = self
            .http
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs + 10))
            .json(&body);
        self.execute(request).await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let request = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id, text });
        self.execute::<Value>(request).await?;
        Ok(())
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TelegramError> {
        // Telegram reports failures in the body with a non-2xx status, so the
        // body is decoded regardless of status.
        let response = request.send().await?;
        let parsed: ApiResponse<T> = response.json().await?;
        parsed.into_result()
    }
}

/// Split `text` into chunks of at most `limit` characters.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 || text.is_empty() {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_deserializes() {
        let raw = r#"{
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 42, "type": "private"},
                 "from": {"id": 7, "is_bot": false, "first_name": "A", "username": "sleeper"},
                 "text": "I dreamt of trains"}},
                {"update_id": 11, "edited_message": {}}
            ]
        }"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = parsed.into_result().unwrap();
        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.chat.id, 42);
        assert_eq!(msg.from.as_ref().unwrap().username.as_deref(), Some("sleeper"));
        assert_eq!(msg.text.as_deref(), Some("I dreamt of trains"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_envelope_without_result_decodes_generic_payload() {
        // Payload types need not implement Default.
        #[derive(Debug, Deserialize)]
        struct NoDefault {
            value: i64,
        }

        let parsed: ApiResponse<NoDefault> =
            serde_json::from_str(r#"{"ok": true, "result": {"value": 3}}"#).unwrap();
        assert_eq!(parsed.into_result().unwrap().value, 3);

        let parsed: ApiResponse<NoDefault> = serde_json::from_str(r#"{"ok": true}"#).unwrap();
        assert!(matches!(
            parsed.into_result(),
            Err(TelegramError::Api { .. })
        ));
    }

    #[test]
    fn test_api_error_surfaces_description() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        match parsed.into_result() {
            Err(TelegramError::Api { description }) => assert_eq!(description, "Unauthorized"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_method_url() {
        let client = TelegramClient::with_api_url("123:abc", "http://localhost:9000/");
        assert_eq!(
            client.method_url("getUpdates"),
            "http://localhost:9000/bot123:abc/getUpdates"
        );
    }

    #[test]
    fn test_split_message_on_char_boundaries() {
        assert_eq!(split_message("short", MAX_MESSAGE_LEN), vec!["short"]);
        assert_eq!(split_message("", MAX_MESSAGE_LEN), vec![""]);

        let text = "é".repeat(5);
        let parts = split_message(&text, 2);
        assert_eq!(parts, vec!["éé", "éé", "é"]);

        let long = "a".repeat(MAX_MESSAGE_LEN + 1);
        let parts = split_message(&long, MAX_MESSAGE_LEN);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].chars().count(), MAX_MESSAGE_LEN);
        assert_eq!(parts[1], "a");
    }
}
