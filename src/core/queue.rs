//! Durable message queue interface.
//!
//! A queue holds every message between the moment the transport pushes it
//! and the moment the dispatch loop acknowledges it:
//! - `push` : persist a message (overwrites on identical `(sender, arrival_time)`)
//! - `pop`  : peek the oldest pending message, without reserving it
//! - `ack`  : delete the record behind the handle attached by `pop`
//!
//! Exactly one consumer is expected per backing store. `pop` does not lease
//! the message it returns, so two consumers would dispatch it twice.

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;

use super::message::Message;
use crate::error::{Error, Result};

/// Opaque reference to where a popped message is stored.
///
/// Only a queue backend creates one, and only that backend interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub(crate) fn key(&self) -> &str {
        &self.0
    }
}

/// A message as returned by [`MessageQueue::pop`].
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: Message,
    handle: Option<MessageHandle>,
}

impl QueuedMessage {
    pub(crate) fn stored(message: Message, handle: MessageHandle) -> Self {
        Self {
            message,
            handle: Some(handle),
        }
    }

    /// Wrap a message that was never stored. Acknowledging it is a no-op.
    pub fn detached(message: Message) -> Self {
        Self {
            message,
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<&MessageHandle> {
        self.handle.as_ref()
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

/// Storage backend for pending messages.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Persist a message. Returns only once the message would survive a crash.
    fn push(&self, message: &Message) -> Result<()>;

    /// Oldest pending message by `(arrival_time, sender)`, or `None` when empty.
    fn pop(&self) -> Result<Option<QueuedMessage>>;

    /// Remove the stored record. Missing handle or missing record is a no-op.
    fn ack(&self, queued: &QueuedMessage) -> Result<()>;

    /// All pending messages, oldest first.
    fn pending(&self) -> Result<Vec<Message>>;

    /// Queue statistics.
    fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.pending()?.len(),
            quarantined: 0,
        })
    }

    /// Wait up to `timeout` for a new push. May return early or spuriously.
    async fn wait_for_push(&self, timeout: Duration) {
        tokio::time::sleep(timeout).await;
    }
}

/// Reject messages that cannot be ordered.
pub(crate) fn validate(message: &Message) -> Result<()> {
    if !message.arrival_time.is_finite() {
        return Err(Error::InvalidMessage(format!(
            "arrival_time must be finite, got {} from {}",
            message.arrival_time, message.sender
        )));
    }
    Ok(())
}

/// Timestamp as used in storage keys. `-0.0` and `0.0` are one key.
pub(crate) fn canonical_time(arrival_time: f64) -> f64 {
    if arrival_time == 0.0 {
        0.0
    } else {
        arrival_time
    }
}

/// Numeric ordering of storage keys: time first, sender bytes break ties.
pub(crate) fn storage_order(a: (f64, &[u8]), b: (f64, &[u8])) -> Ordering {
    canonical_time(a.0)
        .total_cmp(&canonical_time(b.0))
        .then_with(|| a.1.cmp(b.1))
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueStats {
    pub pending: usize,
    pub quarantined: usize,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Queue Stats:")?;
        writeln!(f, "  Pending:     {}", self.pending)?;
        write!(f, "  Quarantined: {}", self.quarantined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_has_no_handle() {
        let queued = QueuedMessage::detached(Message::new("u1", "ping", 1.0));
        assert!(queued.handle().is_none());
        assert_eq!(queued.into_message().text, "ping");
    }

    #[test]
    fn test_storage_order_is_numeric() {
        assert_eq!(storage_order((9.0, "a".as_bytes()), (10.0, "a".as_bytes())), Ordering::Less);
        assert_eq!(storage_order((10.0, "a".as_bytes()), (10.0, "b".as_bytes())), Ordering::Less);
        assert_eq!(storage_order((10.0, "b".as_bytes()), (10.0, "b".as_bytes())), Ordering::Equal);
    }

    #[test]
    fn test_negative_zero_is_zero() {
        assert_eq!(canonical_time(-0.0).to_bits(), 0.0f64.to_bits());
        assert_eq!(canonical_time(-1.5), -1.5);
        assert_eq!(storage_order((-0.0, "u1".as_bytes()), (0.0, "u1".as_bytes())), Ordering::Equal);
    }

    #[test]
    fn test_validate_rejects_nan() {
        assert!(validate(&Message::new("u1", "x", f64::NAN)).is_err());
        assert!(validate(&Message::new("u1", "x", f64::INFINITY)).is_err());
        assert!(validate(&Message::new("u1", "x", 0.0)).is_ok());
    }

    #[test]
    fn test_stats_display() {
        let stats = QueueStats {
            pending: 2,
            quarantined: 1,
        };
        let text = stats.to_string();
        assert!(text.contains("Pending:     2"));
        assert!(text.contains("Quarantined: 1"));
    }
}
