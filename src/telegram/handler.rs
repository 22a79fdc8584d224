//! Telegram inbound message handling.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::Message;

use crate::core::MessageQueue;
use crate::transport::enqueue_inbound;

/// Sender ID for a Telegram chat. Replies are addressed to the same value.
pub fn sender_id(chat_id: ChatId) -> String {
    chat_id.0.to_string()
}

/// Queue an incoming text message. Non-text updates are ignored.
///
/// A failed push is an operator problem: it is logged, never reported back
/// to the chat.
pub async fn handle_message(
    msg: Message,
    queue: Arc<dyn MessageQueue>,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let sender = sender_id(msg.chat.id);
    if let Err(e) = enqueue_inbound(queue.as_ref(), &sender, text) {
        tracing::error!("Failed to queue message from {}: {}", sender, e);
    }

    Ok(())
}

/// Parse a sender ID back into a chat ID.
pub fn parse_chat_id(destination: &str) -> Option<ChatId> {
    destination.trim().parse::<i64>().ok().map(ChatId)
}
