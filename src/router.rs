use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::{ChatId, Message, Update, UpdateKind};
use teloxide::utils::command::BotCommands;
use tracing::debug;

use crate::middleware::{HandlerResult, UpdateHandler};

pub const GREETING: &str = "Hello";

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "say hello")]
    Start(String),
}

/// Outbound side of the bot: where replies go.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;
}

pub struct CommandRouter {
    responder: Arc<dyn Responder>,
    bot_username: String,
}

impl CommandRouter {
    pub fn new(responder: Arc<dyn Responder>, bot_username: impl Into<String>) -> Self {
        Self {
            responder,
            bot_username: bot_username.into(),
        }
    }

    async fn on_message(&self, message: &Message) -> HandlerResult {
        let Some(text) = message.text().or_else(|| message.caption()) else {
            return Ok(());
        };

        match Command::parse(text, &self.bot_username) {
            Ok(Command::Start(payload)) => {
                debug!(chat_id = message.chat.id.0, payload = %payload, "/start");
                self.responder.send_text(message.chat.id, GREETING).await
            }
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl UpdateHandler for CommandRouter {
    async fn handle(&self, update: &Update) -> HandlerResult {
        match &update.kind {
            UpdateKind::Message(message) => self.on_message(message).await,
            // Edits are matched so they never reach a fallback, then dropped.
            UpdateKind::EditedMessage(_) => Ok(()),
            _ => Ok(()),
        }
    }
}
