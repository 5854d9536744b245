use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tracing::{error, info};

use crate::config::Settings;
use crate::metrics::{start_metrics_server, Metrics};
use crate::middleware::{HandlerResult, Pipeline, UpdatesDumper};
use crate::router::{CommandRouter, Responder};

/// Per-chat session state. Kept in memory only.
#[derive(Clone, Debug, Default)]
#[allow(dead_code)]
pub enum Session {
    #[default]
    Idle,
}

#[async_trait]
impl Responder for Bot {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        Requester::send_message(self, chat_id, text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        Ok(())
    }
}

/// Every update goes through the dumper before it reaches the router.
pub fn build_pipeline(
    responder: Arc<dyn Responder>,
    bot_username: &str,
    metrics: Metrics,
) -> Pipeline {
    let router = CommandRouter::new(responder, bot_username);
    Pipeline::new(Arc::new(router)).add_middleware(Arc::new(UpdatesDumper::new(metrics)))
}

async fn handle_update(update: Update, pipeline: Arc<Pipeline>) -> HandlerResult {
    pipeline.dispatch(&update).await
}

/// Build the client and pipeline, expose metrics, then long-poll until the
/// process is stopped.
pub async fn run(settings: &Settings, metrics: Metrics) -> Result<()> {
    let bot = Bot::new(settings.bot_token.expose());

    let me = bot.get_me().await.context("Failed to fetch bot identity")?;
    let username = me.user.username.clone().unwrap_or_default();
    info!("Authorized as @{}", username);

    let sessions = InMemStorage::<Session>::new();
    let pipeline = Arc::new(build_pipeline(
        Arc::new(bot.clone()),
        &username,
        metrics.clone(),
    ));

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], settings.metrics_port));
    if let Err(e) = start_metrics_server(metrics, metrics_addr).await {
        error!("Metrics endpoint unavailable: {:#}", e);
    }

    info!("Starting long polling...");

    Dispatcher::builder(bot, dptree::endpoint(handle_update))
        .dependencies(dptree::deps![pipeline, sessions])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error from the update pipeline",
        ))
        .build()
        .dispatch()
        .await;

    Ok(())
}
