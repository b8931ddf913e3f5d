//! Relational persistence for users, dreams, classifications and chat turns.
//!
//! [`DreamStore`] is the gateway the orchestrator writes through. Two
//! backends implement it: [`SqliteStore`] (default) and, behind the
//! `postgres` feature, `PgStore`.

pub mod models;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StoreBackend;
use crate::utilities::errors::DatabaseError;

pub use models::{ChatHistoryEntry, Classification, Dream, User};
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use sqlite::SqliteStore;

/// Number of chat turns returned when no limit is given.
pub const DEFAULT_CHAT_HISTORY_LIMIT: usize = 20;

/// Durable storage for the bot's data.
///
/// Each call is independent; there is no cross-call transaction.
#[async_trait]
pub trait DreamStore: Send + Sync {
    /// Create the tables if they do not exist.
    async fn migrate(&self) -> Result<(), DatabaseError>;

    /// Fetch the user with this Telegram id, creating it if needed.
    ///
    /// `username` is only used on creation.
    async fn get_or_create_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<User, DatabaseError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_telegram_id(&self, telegram_id: i64)
        -> Result<Option<User>, DatabaseError>;

    /// Insert a dream with its analysis; returns the dream id.
    async fn record_dream(
        &self,
        user_id: i64,
        text: &str,
        analysis: &str,
    ) -> Result<i64, DatabaseError>;

    async fn mark_dream_processed(&self, dream_id: i64) -> Result<(), DatabaseError>;

    async fn get_dream(&self, id: i64) -> Result<Option<Dream>, DatabaseError>;

    /// Dreams of a user, oldest first.
    async fn dreams_for_user(&self, user_id: i64) -> Result<Vec<Dream>, DatabaseError>;

    /// Insert one emotion row; returns the classification id.
    async fn record_classification(
        &self,
        dream_id: i64,
        emotion: &str,
        intensity: u64,
        note: Option<&str>,
    ) -> Result<i64, DatabaseError>;

    /// Classifications of a dream in insertion order.
    async fn classifications_for_dream(
        &self,
        dream_id: i64,
    ) -> Result<Vec<Classification>, DatabaseError>;

    async fn add_chat_message(
        &self,
        user_id: i64,
        message: &str,
        response: &str,
    ) -> Result<ChatHistoryEntry, DatabaseError>;

    /// Most recent chat turns of a user, newest first.
    async fn chat_history_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatHistoryEntry>, DatabaseError>;

    /// [`chat_history_for_user`](Self::chat_history_for_user) with
    /// [`DEFAULT_CHAT_HISTORY_LIMIT`].
    async fn recent_chat_history(
        &self,
        user_id: i64,
    ) -> Result<Vec<ChatHistoryEntry>, DatabaseError> {
        self.chat_history_for_user(user_id, DEFAULT_CHAT_HISTORY_LIMIT)
            .await
    }
}

/// Open the configured backend and run its migrations.
pub async fn open_store(backend: &StoreBackend) -> Result<Arc<dyn DreamStore>, DatabaseError> {
    let store: Arc<dyn DreamStore> = match backend {
        StoreBackend::Sqlite { path } => {
            log::info!("Opening SQLite store at {}", path.display());
            Arc::new(SqliteStore::new(path.clone())?)
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres { url } => {
            log::info!("Connecting to PostgreSQL...");
            Arc::new(PgStore::connect(url).await?)
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres { .. } => {
            return Err(DatabaseError::BackendUnavailable {
                backend: "postgres".to_string(),
            })
        }
    };

    store.migrate().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_store_sqlite_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StoreBackend::Sqlite {
            path: dir.path().join("nested").join("dreams.db"),
        };
        let store = open_store(&backend).await.unwrap();
        let user = store.get_or_create_user(7, Some("user_7")).await.unwrap();
        assert_eq!(user.telegram_id, 7);
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_open_store_postgres_unavailable() {
        let backend = StoreBackend::Postgres {
            url: "postgresql://localhost/dreams".into(),
        };
        assert!(matches!(
            open_store(&backend).await,
            Err(DatabaseError::BackendUnavailable { .. })
        ));
    }
}
