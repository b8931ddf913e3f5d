//! SQLite backend.
//!
//! rusqlite is synchronous, so every operation opens its own connection
//! inside `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{
    intensity_to_column, ChatHistoryEntry, Classification, Dream, User, DEFAULT_LANGUAGE,
};
use super::DreamStore;
use crate::utilities::errors::DatabaseError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        telegram_id INTEGER NOT NULL UNIQUE,
        username TEXT,
        language TEXT NOT NULL DEFAULT 'en',
        created_at TEXT NOT NULL,
        settings TEXT NOT NULL DEFAULT '{}'
    );
    CREATE TABLE IF NOT EXISTS dreams (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        text TEXT NOT NULL,
        analysis TEXT,
        language TEXT NOT NULL DEFAULT 'en',
        processed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS classifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dream_id INTEGER NOT NULL REFERENCES dreams(id),
        emotion TEXT NOT NULL,
        intensity INTEGER NOT NULL,
        note TEXT,
        symbol TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS chat_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        message TEXT NOT NULL,
        response TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_dreams_user ON dreams(user_id);
    CREATE INDEX IF NOT EXISTS idx_classifications_dream ON classifications(dream_id);
    CREATE INDEX IF NOT EXISTS idx_chat_history_user ON chat_history(user_id, timestamp);
";

const USER_COLUMNS: &str = "id, telegram_id, username, language, created_at, settings";
const DREAM_COLUMNS: &str = "id, user_id, text, analysis, language, processed, created_at";

/// SQLite implementation of [`DreamStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
}

impl SqliteStore {
    /// Point the store at `db_path`, creating its parent directory.
    ///
    /// Tables are created by [`DreamStore::migrate`].
    pub fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::connection(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        Ok(Self { db_path })
    }

    fn open(path: &Path) -> Result<Connection, DatabaseError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&path)?;
            f(&conn)
        })
        .await?
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    format_ts(Utc::now())
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let settings: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        username: row.get(2)?,
        language: row.get(3)?,
        created_at: parse_ts(4, row.get(4)?)?,
        settings: serde_json::from_str(&settings).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
    })
}

fn dream_from_row(row: &Row<'_>) -> rusqlite::Result<Dream> {
    Ok(Dream {
        id: row.get(0)?,
        user_id: row.get(1)?,
        text: row.get(2)?,
        analysis: row.get(3)?,
        language: row.get(4)?,
        processed: row.get(5)?,
        created_at: parse_ts(6, row.get(6)?)?,
    })
}

fn classification_from_row(row: &Row<'_>) -> rusqlite::Result<Classification> {
    Ok(Classification {
        id: row.get(0)?,
        dream_id: row.get(1)?,
        emotion: row.get(2)?,
        intensity: row.get(3)?,
        note: row.get(4)?,
        symbol: row.get(5)?,
        created_at: parse_ts(6, row.get(6)?)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatHistoryEntry> {
    Ok(ChatHistoryEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message: row.get(2)?,
        response: row.get(3)?,
        timestamp: parse_ts(4, row.get(4)?)?,
    })
}

#[async_trait]
impl DreamStore for SqliteStore {
    async fn migrate(&self) -> Result<(), DatabaseError> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            log::debug!("SQLite tables migrated");
            Ok(())
        })
        .await
    }

    async fn get_or_create_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<User, DatabaseError> {
        let username = username.map(str::to_string);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (telegram_id, username, language, created_at, settings)
                 VALUES (?1, ?2, ?3, ?4, '{}')
                 ON CONFLICT(telegram_id) DO NOTHING",
                params![telegram_id, username, DEFAULT_LANGUAGE, now()],
            )?;
            let user = conn.query_row(
                &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS),
                params![telegram_id],
                user_from_row,
            )?;
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    params![id],
                    user_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn get_user_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<User>, DatabaseError> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS),
                    params![telegram_id],
                    user_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn record_dream(
        &self,
        user_id: i64,
        text: &str,
        analysis: &str,
    ) -> Result<i64, DatabaseError> {
        let text = text.to_string();
        let analysis = analysis.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO dreams (user_id, text, analysis, language, processed, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![user_id, text, analysis, DEFAULT_LANGUAGE, now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn mark_dream_processed(&self, dream_id: i64) -> Result<(), DatabaseError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE dreams SET processed = 1 WHERE id = ?1",
                params![dream_id],
            )?;
            if updated == 0 {
                return Err(DatabaseError::operation(format!(
                    "dream {} does not exist",
                    dream_id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn get_dream(&self, id: i64) -> Result<Option<Dream>, DatabaseError> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM dreams WHERE id = ?1", DREAM_COLUMNS),
                    params![id],
                    dream_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn dreams_for_user(&self, user_id: i64) -> Result<Vec<Dream>, DatabaseError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM dreams WHERE user_id = ?1 ORDER BY id ASC",
                DREAM_COLUMNS
            ))?;
            let rows = stmt.query_map(params![user_id], dream_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn record_classification(
        &self,
        dream_id: i64,
        emotion: &str,
        intensity: u64,
        note: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let emotion = emotion.to_string();
        let note = note.map(str::to_string);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO classifications (dream_id, emotion, intensity, note, symbol, created_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
                params![dream_id, emotion, intensity_to_column(intensity), note, now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn classifications_for_dream(
        &self,
        dream_id: i64,
    ) -> Result<Vec<Classification>, DatabaseError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, dream_id, emotion, intensity, note, symbol, created_at
                 FROM classifications WHERE dream_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![dream_id], classification_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn add_chat_message(
        &self,
        user_id: i64,
        message: &str,
        response: &str,
    ) -> Result<ChatHistoryEntry, DatabaseError> {
        let message = message.to_string();
        let response = response.to_string();
        self.with_conn(move |conn| {
            let timestamp = Utc::now();
            conn.execute(
                "INSERT INTO chat_history (user_id, message, response, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, message, response, format_ts(timestamp)],
            )?;
            Ok(ChatHistoryEntry {
                id: conn.last_insert_rowid(),
                user_id,
                message,
                response,
                timestamp,
            })
        })
        .await
    }

    async fn chat_history_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatHistoryEntry>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, message, response, timestamp
                 FROM chat_history WHERE user_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user_id, limit], chat_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}
