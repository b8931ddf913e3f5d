//! Create the DreamDiary schema in the configured store.

use anyhow::Context;
use dreamdiary::config::Config;
use dreamdiary::db::open_store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    open_store(&config.store)
        .await
        .context("Failed to initialise dream store")?;

    tracing::info!("Database initialized");
    Ok(())
}
