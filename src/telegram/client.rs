//! Telegram bot client - simple polling version.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;

use super::handler::{handle_message, parse_chat_id};
use crate::core::MessageQueue;
use crate::error::{Error, Result};
use crate::transport::ReplySender;

/// Create a bot from a configured token.
pub fn create_bot(token: Option<&str>) -> Result<Bot> {
    let token = token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::Config("No telegram bot token configured".to_string()))?;
    Ok(Bot::new(token))
}

/// Sends replies with `sendMessage`; destinations are chat IDs.
pub struct TelegramReplySender {
    bot: Bot,
}

impl TelegramReplySender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySender for TelegramReplySender {
    async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        let chat_id = parse_chat_id(destination)
            .ok_or_else(|| Error::Transport(format!("Not a Telegram chat id: {}", destination)))?;
        self.bot.send_message(chat_id, text).await?;
        Ok(())
    }
}

/// Poll Telegram and push every text message to the queue.
///
/// Returns when the dispatcher shuts down (Ctrl+C).
pub async fn run_telegram_bridge(bot: Bot, queue: Arc<dyn MessageQueue>) {
    tracing::info!("Starting Telegram bridge...");

    teloxide::repl(bot, move |msg: Message| {
        let queue = queue.clone();
        async move { handle_message(msg, queue).await }
    })
    .await;

    tracing::info!("Telegram bridge stopped");
}
