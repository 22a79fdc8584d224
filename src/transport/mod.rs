//! Transport bridges: inbound text becomes queued messages, replies go back out.

pub mod stdio;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::{Message, MessageQueue};
use crate::error::Result;

/// Outbound half of a transport.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Send `text` to `destination` (a sender ID as seen on inbound messages).
    async fn send_text(&self, destination: &str, text: &str) -> Result<()>;
}

/// Available transports.
#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Read commands from stdin, print replies to stdout
    #[default]
    Stdio,
    /// Telegram bot (chat ID is the sender)
    Telegram,
}

/// Stamp inbound text with the current time and push it to the queue.
pub fn enqueue_inbound(queue: &dyn MessageQueue, sender: &str, text: &str) -> Result<Message> {
    let message = Message::received(sender, text);
    queue.push(&message)?;
    tracing::info!("Queued message from {} at {}", sender, message.arrival_time);
    Ok(message)
}
