//! DreamDiary Telegram bot binary.
//!
//! # Environment Variables
//!
//! - `TELEGRAM_BOT_TOKEN` - required
//! - `ANTHROPIC_API_KEY` - required
//! - `ANTHROPIC_MODEL`, `DREAMDIARY_TEMPERATURE` - model settings
//! - `DREAMDIARY_STORE`, `DREAMDIARY_DB_PATH`, `DATABASE_URL` - storage
//! - `DREAMDIARY_HISTORY_LIMIT` - messages kept per conversation (default: 20)
//! - `RUST_LOG` - Tracing filter (default: "info,dreamdiary=debug")

use std::sync::Arc;

use anyhow::Context;
use dreamdiary::agent::{ConversationRegistry, DreamDiaryAgent};
use dreamdiary::bot::{BotHandler, TelegramClient};
use dreamdiary::config::Config;
use dreamdiary::db::open_store;
use dreamdiary::llms::providers::anthropic::AnthropicCompletion;
use dreamdiary::utilities::errors::ConfigError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dreamdiary=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let token = config.require_telegram_token()?;
    let api_key = config
        .anthropic_api_key
        .clone()
        .ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))?;

    let store = open_store(&config.store)
        .await
        .context("Failed to open dream store")?;
    let llm = AnthropicCompletion::new(
        config.anthropic_model.clone(),
        Some(api_key),
        config.anthropic_base_url.clone(),
    )
    .with_temperature(config.temperature);
    tracing::info!("Using model {}", config.anthropic_model);

    let agent = Arc::new(DreamDiaryAgent::new(Arc::new(llm), store));
    let handler = BotHandler::new(agent, ConversationRegistry::new(config.history_limit));

    handler.run(TelegramClient::new(token)).await;
    Ok(())
}
