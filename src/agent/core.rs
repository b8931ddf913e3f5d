//! The dream analyst: two model calls per turn plus best-effort persistence.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::history::ConversationLog;
use super::prompts;
use crate::db::DreamStore;
use crate::emotions::{extract_emotions_report, EmotionRecord, ExtractionReport};
use crate::llms::base_llm::{BaseLLM, LLMMessage};
use crate::utilities::errors::{DatabaseError, LlmError};

/// Telegram id used when a turn arrives without a user.
pub const FALLBACK_TELEGRAM_ID: i64 = 1;

/// Errors that end a turn. Persistence problems never appear here.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),
}

/// Result of one processed dream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DreamReply {
    /// Narrative analysis, shown to the user verbatim.
    pub analysis: String,
    /// Emotions parsed from the extraction call, in model order.
    pub emotions: Vec<EmotionRecord>,
    /// Id of the stored dream; `None` when persistence failed.
    pub dream_id: Option<i64>,
}

/// Dream analysis agent.
///
/// Holds no conversation state: callers pass the [`ConversationLog`] for the
/// conversation being served, so one agent can be shared across users.
pub struct DreamDiaryAgent {
    llm: Arc<dyn BaseLLM>,
    store: Arc<dyn DreamStore>,
    system_prompt: String,
}

impl std::fmt::Debug for DreamDiaryAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DreamDiaryAgent")
            .field("llm", &self.llm)
            .finish_non_exhaustive()
    }
}

impl DreamDiaryAgent {
    pub fn new(llm: Arc<dyn BaseLLM>, store: Arc<dyn DreamStore>) -> Self {
        Self {
            llm,
            store,
            system_prompt: prompts::DREAM_ANALYST_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn store(&self) -> &Arc<dyn DreamStore> {
        &self.store
    }

    /// Analyse a dream, extract its emotions and record the turn.
    ///
    /// Runs the analysis call (with `log` as prior context), then the
    /// extraction call, then appends the turn to `log`. Storage errors are
    /// logged and reflected only as `dream_id: None`.
    pub async fn process_dream(
        &self,
        log: &mut ConversationLog,
        dream_text: &str,
        user_id: Option<i64>,
    ) -> Result<DreamReply, AgentError> {
        let mut messages = Vec::with_capacity(log.len() + 2);
        messages.push(LLMMessage::system(self.system_prompt.as_str()));
        messages.extend(log.iter().cloned());
        messages.push(LLMMessage::user(prompts::dream_analysis_prompt(dream_text)));

        let analysis = self.llm.acall(messages).await?;

        let raw_emotions = self
            .llm
            .acall(vec![
                LLMMessage::system(prompts::EMOTION_EXTRACTOR_SYSTEM_PROMPT),
                LLMMessage::user(prompts::emotion_extraction_prompt(dream_text)),
            ])
            .await?;

        log.push_turn(dream_text, &analysis);

        let report = extract_emotions_report(Some(&raw_emotions));
        log_extraction(&report, &raw_emotions);
        let emotions = report.into_records();

        let telegram_id = user_id.unwrap_or(FALLBACK_TELEGRAM_ID);
        let dream_id = match self
            .persist_turn(telegram_id, dream_text, &analysis, &emotions)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("DB save error: {}", e);
                None
            }
        };

        Ok(DreamReply {
            analysis,
            emotions,
            dream_id,
        })
    }

    /// Free-form emotional commentary on a dream. Nothing is stored.
    pub async fn analyze_emotions(&self, dream_text: &str) -> Result<String, AgentError> {
        self.ask(prompts::emotion_commentary_prompt(dream_text)).await
    }

    /// Explain a dream symbol from the psychological literature.
    pub async fn explain_symbol(&self, symbol: &str) -> Result<String, AgentError> {
        self.ask(prompts::symbol_explanation_prompt(symbol)).await
    }

    async fn ask(&self, prompt: String) -> Result<String, AgentError> {
        let messages = vec![
            LLMMessage::system(self.system_prompt.as_str()),
            LLMMessage::user(prompt),
        ];
        Ok(self.llm.acall(messages).await?)
    }

    /// Write user, dream, classifications and chat turn.
    ///
    /// Fails only if the dream row itself cannot be written; later failures
    /// are logged and skipped.
    async fn persist_turn(
        &self,
        telegram_id: i64,
        dream_text: &str,
        analysis: &str,
        emotions: &[EmotionRecord],
    ) -> Result<i64, DatabaseError> {
        let username = format!("user_{}", telegram_id);
        let user = self
            .store
            .get_or_create_user(telegram_id, Some(&username))
            .await?;
        let dream_id = self.store.record_dream(user.id, dream_text, analysis).await?;

        let mut all_saved = true;
        for record in emotions {
            if let Err(e) = self
                .store
                .record_classification(dream_id, &record.emotion, record.intensity, record.note())
                .await
            {
                log::error!(
                    "Failed to save classification '{}' for dream {}: {}",
                    record.emotion,
                    dream_id,
                    e
                );
                all_saved = false;
            }
        }
        if all_saved {
            if let Err(e) = self.store.mark_dream_processed(dream_id).await {
                log::error!("Failed to mark dream {} processed: {}", dream_id, e);
            }
        }

        if let Err(e) = self
            .store
            .add_chat_message(user.id, dream_text, analysis)
            .await
        {
            log::error!("Failed to save chat history for user {}: {}", user.id, e);
        }

        log::debug!(
            "Stored dream {} for user {} with {} emotions",
            dream_id,
            user.id,
            emotions.len()
        );
        Ok(dream_id)
    }
}

fn log_extraction(report: &ExtractionReport, raw: &str) {
    if report.is_clean() {
        return;
    }
    for discarded in &report.discarded {
        log::debug!(
            "Dropped emotion fragment {:?} ({:?})",
            discarded.fragment,
            discarded.reason
        );
    }
    for parsed in report.non_conforming() {
        log::debug!(
            "Emotion fragment read loosely: {:?} ({:?})",
            parsed.record,
            parsed.intensity_policy
        );
    }
    log::warn!(
        "Emotion list did not match the expected format ({} kept, {} dropped): {:.200}",
        report.parsed.len(),
        report.discarded.len(),
        raw
    );
}
