//! PostgreSQL backend.
//!
//! Requires the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! dreamdiary = { features = ["postgres"] }
//! ```

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::models::{
    intensity_to_column, ChatHistoryEntry, Classification, Dream, User, DEFAULT_LANGUAGE,
};
use super::DreamStore;
use crate::utilities::errors::DatabaseError;

const USER_COLUMNS: &str = "id, telegram_id, username, language, created_at, settings";
const DREAM_COLUMNS: &str = "id, user_id, text, analysis, language, processed, created_at";

/// PostgreSQL implementation of [`DreamStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| DatabaseError::connection(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        telegram_id: row.try_get("telegram_id")?,
        username: row.try_get("username")?,
        language: row.try_get("language")?,
        created_at: row.try_get("created_at")?,
        settings: row.try_get("settings")?,
    })
}

fn dream_from_row(row: &PgRow) -> Result<Dream, sqlx::Error> {
    Ok(Dream {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        text: row.try_get("text")?,
        analysis: row.try_get("analysis")?,
        language: row.try_get("language")?,
        processed: row.try_get("processed")?,
        created_at: row.try_get("created_at")?,
    })
}

fn classification_from_row(row: &PgRow) -> Result<Classification, sqlx::Error> {
    Ok(Classification {
        id: row.try_get("id")?,
        dream_id: row.try_get("dream_id")?,
        emotion: row.try_get("emotion")?,
        intensity: row.try_get("intensity")?,
        note: row.try_get("note")?,
        symbol: row.try_get("symbol")?,
        created_at: row.try_get("created_at")?,
    })
}

fn chat_from_row(row: &PgRow) -> Result<ChatHistoryEntry, sqlx::Error> {
    Ok(ChatHistoryEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        message: row.try_get("message")?,
        response: row.try_get("response")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl DreamStore for PgStore {
    async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                telegram_id BIGINT NOT NULL UNIQUE,
                username VARCHAR(255),
                language VARCHAR(2) NOT NULL DEFAULT 'en',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                settings JSONB NOT NULL DEFAULT '{}'::jsonb
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dreams (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                text TEXT NOT NULL,
                analysis TEXT,
                language VARCHAR(2) NOT NULL DEFAULT 'en',
                processed BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS classifications (
                id BIGSERIAL PRIMARY KEY,
                dream_id BIGINT NOT NULL REFERENCES dreams(id),
                emotion TEXT NOT NULL,
                intensity BIGINT NOT NULL,
                note TEXT,
                symbol TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                message TEXT NOT NULL,
                response TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        log::debug!("PostgreSQL tables migrated");
        Ok(())
    }

    async fn get_or_create_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<User, DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO users (telegram_id, username, language)
            VALUES ($1, $2, $3)
            ON CONFLICT (telegram_id) DO NOTHING
            "#,
        )
        .bind(telegram_id)
        .bind(username)
        .bind(DEFAULT_LANGUAGE)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE telegram_id = $1",
            USER_COLUMNS
        ))
        .bind(telegram_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user_from_row(&row)?)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn get_user_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE telegram_id = $1",
            USER_COLUMNS
        ))
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn record_dream(
        &self,
        user_id: i64,
        text: &str,
        analysis: &str,
    ) -> Result<i64, DatabaseError> {
        let row = sqlx::query(
            r#"
            INSERT INTO dreams (user_id, text, analysis, language)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(text)
        .bind(analysis)
        .bind(DEFAULT_LANGUAGE)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn mark_dream_processed(&self, dream_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE dreams SET processed = TRUE WHERE id = $1")
            .bind(dream_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::operation(format!(
                "dream {} does not exist",
                dream_id
            )));
        }
        Ok(())
    }

    async fn get_dream(&self, id: i64) -> Result<Option<Dream>, DatabaseError> {
        let row = sqlx::query(&format!("SELECT {} FROM dreams WHERE id = $1", DREAM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(dream_from_row).transpose()?)
    }

    async fn dreams_for_user(&self, user_id: i64) -> Result<Vec<Dream>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM dreams WHERE user_id = $1 ORDER BY id ASC",
            DREAM_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(dream_from_row).collect::<Result<_, _>>()?)
    }

    async fn record_classification(
        &self,
        dream_id: i64,
        emotion: &str,
        intensity: u64,
        note: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let row = sqlx::query(
            r#"
            INSERT INTO classifications (dream_id, emotion, intensity, note)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(dream_id)
        .bind(emotion)
        .bind(intensity_to_column(intensity))
        .bind(note)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn classifications_for_dream(
        &self,
        dream_id: i64,
    ) -> Result<Vec<Classification>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, dream_id, emotion, intensity, note, symbol, created_at
            FROM classifications WHERE dream_id = $1 ORDER BY id ASC
            "#,
        )
        .bind(dream_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(classification_from_row)
            .collect::<Result<_, _>>()?)
    }

    async fn add_chat_message(
        &self,
        user_id: i64,
        message: &str,
        response: &str,
    ) -> Result<ChatHistoryEntry, DatabaseError> {
        let row = sqlx::query(
            r#"
            INSERT INTO chat_history (user_id, message, response)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, message, response, timestamp
            "#,
        )
        .bind(user_id)
        .bind(message)
        .bind(response)
        .fetch_one(&self.pool)
        .await?;
        Ok(chat_from_row(&row)?)
    }

    async fn chat_history_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatHistoryEntry>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, message, response, timestamp
            FROM chat_history WHERE user_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(chat_from_row).collect::<Result<_, _>>()?)
    }
}
