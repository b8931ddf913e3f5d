//! In-process fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::db::{ChatHistoryEntry, Classification, Dream, DreamStore, SqliteStore, User};
use crate::llms::base_llm::{BaseLLM, LLMMessage};
use crate::utilities::errors::{DatabaseError, LlmError};

/// LLM that replays queued replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    pub calls: Mutex<Vec<Vec<LLMMessage>>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let llm = Self::default();
        llm.replies.lock().push_back(Err(LlmError::EmptyResponse));
        llm
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl BaseLLM for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    fn provider(&self) -> &str {
        "test"
    }

    async fn acall(&self, messages: Vec<LLMMessage>) -> Result<String, LlmError> {
        self.calls.lock().push(messages);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

fn down<T>() -> Result<T, DatabaseError> {
    Err(DatabaseError::connection("database is down"))
}

#[async_trait]
impl DreamStore for FailingStore {
    async fn migrate(&self) -> Result<(), DatabaseError> {
        down()
    }
    async fn get_or_create_user(&self, _: i64, _: Option<&str>) -> Result<User, DatabaseError> {
        down()
    }
    async fn get_user(&self, _: i64) -> Result<Option<User>, DatabaseError> {
        down()
    }
    async fn get_user_by_telegram_id(&self, _: i64) -> Result<Option<User>, DatabaseError> {
        down()
    }
    async fn record_dream(&self, _: i64, _: &str, _: &str) -> Result<i64, DatabaseError> {
        down()
    }
    async fn mark_dream_processed(&self, _: i64) -> Result<(), DatabaseError> {
        down()
    }
    async fn get_dream(&self, _: i64) -> Result<Option<Dream>, DatabaseError> {
        down()
    }
    async fn dreams_for_user(&self, _: i64) -> Result<Vec<Dream>, DatabaseError> {
        down()
    }
    async fn record_classification(
        &self,
        _: i64,
        _: &str,
        _: u64,
        _: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        down()
    }
    async fn classifications_for_dream(&self, _: i64) -> Result<Vec<Classification>, DatabaseError> {
        down()
    }
    async fn add_chat_message(
        &self,
        _: i64,
        _: &str,
        _: &str,
    ) -> Result<ChatHistoryEntry, DatabaseError> {
        down()
    }
    async fn chat_history_for_user(
        &self,
        _: i64,
        _: usize,
    ) -> Result<Vec<ChatHistoryEntry>, DatabaseError> {
        down()
    }
}

/// SQLite store that rejects classifications with one label.
#[derive(Debug)]
pub struct RejectingLabelStore {
    pub inner: Arc<SqliteStore>,
    pub rejected_label: &'static str,
}

#[async_trait]
impl DreamStore for RejectingLabelStore {
    async fn migrate(&self) -> Result<(), DatabaseError> {
        self.inner.migrate().await
    }
    async fn get_or_create_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> Result<User, DatabaseError> {
        self.inner.get_or_create_user(telegram_id, username).await
    }
    async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        self.inner.get_user(id).await
    }
    async fn get_user_by_telegram_id(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        self.inner.get_user_by_telegram_id(id).await
    }
    async fn record_dream(
        &self,
        user_id: i64,
        text: &str,
        analysis: &str,
    ) -> Result<i64, DatabaseError> {
        self.inner.record_dream(user_id, text, analysis).await
    }
    async fn mark_dream_processed(&self, dream_id: i64) -> Result<(), DatabaseError> {
        self.inner.mark_dream_processed(dream_id).await
    }
    async fn get_dream(&self, id: i64) -> Result<Option<Dream>, DatabaseError> {
        self.inner.get_dream(id).await
    }
    async fn dreams_for_user(&self, user_id: i64) -> Result<Vec<Dream>, DatabaseError> {
        self.inner.dreams_for_user(user_id).await
    }
    async fn record_classification(
        &self,
        dream_id: i64,
        emotion: &str,
        intensity: u64,
        note: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        if emotion == self.rejected_label {
            return Err(DatabaseError::operation(format!("rejected label {}", emotion)));
        }
        self.inner
            .record_classification(dream_id, emotion, intensity, note)
            .await
    }
    async fn classifications_for_dream(
        &self,
        dream_id: i64,
    ) -> Result<Vec<Classification>, DatabaseError> {
        self.inner.classifications_for_dream(dream_id).await
    }
    async fn add_chat_message(
        &self,
        user_id: i64,
        message: &str,
        response: &str,
    ) -> Result<ChatHistoryEntry, DatabaseError> {
        self.inner.add_chat_message(user_id, message, response).await
    }
    async fn chat_history_for_user(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatHistoryEntry>, DatabaseError> {
        self.inner.chat_history_for_user(user_id, limit).await
    }
}

/// A migrated SQLite store in a temporary directory.
pub async fn temp_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("test.db")).unwrap();
    store.migrate().await.unwrap();
    (dir, Arc::new(store))
}
