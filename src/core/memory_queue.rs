//! In-memory message queue.
//!
//! Same ordering and acknowledgment rules as the file queue, without
//! durability. Used for ephemeral runs and tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::message::Message;
use super::queue::{canonical_time, storage_order, validate, MessageHandle, MessageQueue, QueuedMessage};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryMessageQueue {
    messages: Mutex<Vec<Message>>,
    pushed: Notify,
}

impl MemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_for(message: &Message) -> String {
        format!(
            "{}\u{0}{}",
            canonical_time(message.arrival_time).to_bits(),
            message.sender
        )
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Message>>> {
        self.messages
            .lock()
            .map_err(|_| Error::Queue("memory queue lock poisoned".to_string()))
    }
}

#[async_trait]
impl MessageQueue for MemoryMessageQueue {
    fn name(&self) -> &str {
        "memory"
    }

    fn push(&self, message: &Message) -> Result<()> {
        validate(message)?;

        let key = Self::key_for(message);
        let mut messages = self.lock()?;
        messages.retain(|m| Self::key_for(m) != key);
        messages.push(message.clone());
        drop(messages);

        self.pushed.notify_one();
        Ok(())
    }

    fn pop(&self) -> Result<Option<QueuedMessage>> {
        let messages = self.lock()?;
        let oldest = messages.iter().min_by(|a, b| {
            storage_order((a.arrival_time, a.sender.as_bytes()), (b.arrival_time, b.sender.as_bytes()))
        });

        Ok(oldest.map(|m| QueuedMessage::stored(m.clone(), MessageHandle::new(Self::key_for(m)))))
    }

    fn ack(&self, queued: &QueuedMessage) -> Result<()> {
        let Some(handle) = queued.handle() else {
            return Ok(());
        };

        let mut messages = self.lock()?;
        messages.retain(|m| Self::key_for(m) != handle.key());
        Ok(())
    }

    fn pending(&self) -> Result<Vec<Message>> {
        let mut messages = self.lock()?.to_vec();
        messages.sort_by(|a, b| {
            storage_order((a.arrival_time, a.sender.as_bytes()), (b.arrival_time, b.sender.as_bytes()))
        });
        Ok(messages)
    }

    async fn wait_for_push(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.pushed.notified()).await;
    }
}
