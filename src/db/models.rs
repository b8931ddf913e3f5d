//! Row types for the four tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Language code stored when none is known.
pub const DEFAULT_LANGUAGE: &str = "en";

/// A bot user, keyed by Telegram id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    /// Two-letter code, `en` or `ru`.
    pub language: String,
    pub created_at: DateTime<Utc>,
    /// Free-form per-user settings.
    pub settings: Value,
}

/// One submitted dream and its analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dream {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub analysis: Option<String>,
    pub language: String,
    /// Set once the emotion classifications have been written.
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

/// One extracted emotion for a dream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub id: i64,
    pub dream_id: i64,
    pub emotion: String,
    pub intensity: i64,
    pub note: Option<String>,
    pub symbol: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A message and the bot's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Clamp a parsed intensity into a signed column.
pub fn intensity_to_column(intensity: u64) -> i64 {
    i64::try_from(intensity).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_to_column() {
        assert_eq!(intensity_to_column(1), 1);
        assert_eq!(intensity_to_column(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_dream_serializes() {
        let dream = Dream {
            id: 3,
            user_id: 1,
            text: "flying".into(),
            analysis: None,
            language: DEFAULT_LANGUAGE.into(),
            processed: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&dream).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["analysis"], Value::Null);
        assert!(json["created_at"].is_string());
    }
}
