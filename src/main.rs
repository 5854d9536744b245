mod bot;
mod config;
mod metrics;
mod middleware;
mod router;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Settings;
use crate::metrics::Metrics;

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG from it applies to the subscriber below
    config::load_dotenv()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    let settings = Settings::from_env().context("Failed to load settings")?;
    info!("Settings loaded");

    let metrics = Metrics::new().context("Failed to create metrics registry")?;
    info!("Bot is starting...");
    bot::run(&settings, metrics).await?;

    Ok(())
}
