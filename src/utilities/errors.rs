//! Error types shared across the crate.

use thiserror::Error;

/// Errors related to database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A generic database operation error.
    #[error("Database operation error: {message}")]
    OperationError { message: String },

    /// Connection error.
    #[error("Database connection error: {message}")]
    ConnectionError { message: String },

    /// Query error.
    #[error("Database query error: {message}")]
    QueryError { message: String },

    /// Backend requested but not compiled in.
    #[error("Storage backend '{backend}' is not available in this build")]
    BackendUnavailable { backend: String },
}

impl DatabaseError {
    pub fn operation(message: impl Into<String>) -> Self {
        Self::OperationError {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        let cannot_open = matches!(
            &e,
            rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::CannotOpen
        );
        if cannot_open || matches!(e, rusqlite::Error::InvalidPath(_)) {
            Self::ConnectionError {
                message: e.to_string(),
            }
        } else {
            Self::QueryError {
                message: e.to_string(),
            }
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::ConnectionError {
                    message: e.to_string(),
                }
            }
            other => Self::QueryError {
                message: other.to_string(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for DatabaseError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::OperationError {
            message: format!("blocking task failed: {}", e),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(e: serde_json::Error) -> Self {
        Self::OperationError {
            message: format!("serialization failed: {}", e),
        }
    }
}

/// Errors from the language model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Anthropic API key not set. Set ANTHROPIC_API_KEY or pass api_key to the constructor.")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-retryable error status, or an error object in the body.
    #[error("Anthropic API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse Anthropic response: {0}")]
    Decode(String),

    #[error("Model returned no text content")]
    EmptyResponse,

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Errors from the Telegram Bot API.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with `ok: false`.
    #[error("Telegram API error: {description}")]
    Api { description: String },
}
