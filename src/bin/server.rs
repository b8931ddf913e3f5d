//! DreamDiary HTTP server binary.
//!
//! # Environment Variables
//!
//! - `PORT` - HTTP port (default: 8080)
//! - `ANTHROPIC_API_KEY` - required
//! - `DREAMDIARY_STORE` - "sqlite" (default) or "postgres"
//! - `DATABASE_URL` - PostgreSQL connection string (required if DREAMDIARY_STORE=postgres)
//! - `RUST_LOG` - Tracing filter (default: "info,dreamdiary=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dreamdiary-server
//! # or with postgres:
//! cargo run --bin dreamdiary-server --features postgres
//! ```

use std::sync::Arc;

use anyhow::Context;
use dreamdiary::agent::{ConversationRegistry, DreamDiaryAgent};
use dreamdiary::config::Config;
use dreamdiary::db::open_store;
use dreamdiary::llms::providers::anthropic::AnthropicCompletion;
use dreamdiary::server::{app_router, AppState};
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

    let agent = Arc::new(DreamDiaryAgent::new(Arc::new(llm), store));
    let state = AppState::new(agent, ConversationRegistry::new(config.history_limit));
    let app = app_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("dreamdiary server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                     - liveness check");
    tracing::info!("  POST /emotions/parse             - emotion list parser");
    tracing::info!("  POST /dreams                     - analyse a dream");
    tracing::info!("  GET  /users/:telegram_id/dreams  - stored dreams");
    tracing::info!("  GET  /dreams/:id/classifications - stored emotions");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
