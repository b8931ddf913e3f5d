//! Conversation orchestration for dream analysis.

pub mod core;
pub mod history;
pub mod prompts;

pub use self::core::{AgentError, DreamDiaryAgent, DreamReply, FALLBACK_TELEGRAM_ID};
pub use history::{ConversationLog, ConversationRegistry, DEFAULT_HISTORY_LIMIT};
