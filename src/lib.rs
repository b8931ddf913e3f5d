//! # DreamDiary
//!
//! Dream analysis assistant: a Telegram bot and HTTP API that send dream
//! descriptions to an LLM for psychological analysis, extract a structured
//! emotion list from a second model call, and keep a per-user dream diary in
//! SQLite or PostgreSQL.
//!
//! - [`emotions`] parses the bracketed emotion list the model returns.
//! - [`agent`] orchestrates one conversation turn.
//! - [`db`] persists users, dreams, classifications and chat history.

pub mod agent;
pub mod bot;
pub mod config;
pub mod db;
pub mod emotions;
pub mod llms;
pub mod server;
pub mod utilities;

#[cfg(test)]
mod test_support;

pub use agent::{DreamDiaryAgent, DreamReply};
pub use emotions::{extract_emotions, EmotionRecord};
pub use llms::base_llm::BaseLLM;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
