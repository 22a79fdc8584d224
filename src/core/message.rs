//! Inbound command messages.

use serde::{Deserialize, Serialize};

/// A command received from the transport.
///
/// Only these three fields are ever persisted. The storage handle a queue
/// attaches on `pop` lives next to the message in [`QueuedMessage`], never
/// inside it, so re-pushing a popped message cannot leak its old location.
///
/// [`QueuedMessage`]: super::queue::QueuedMessage
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    /// Sender ID (transport-specific, also the reply destination)
    pub sender: String,

    /// Raw command line
    pub text: String,

    /// Unix timestamp in fractional seconds
    pub arrival_time: f64,
}

impl Message {
    pub fn new(sender: impl Into<String>, text: impl Into<String>, arrival_time: f64) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            arrival_time,
        }
    }

    /// Create a message stamped with the current time.
    pub fn received(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(sender, text, now_seconds())
    }

    /// First whitespace-delimited token of the text, if any.
    pub fn command(&self) -> Option<&str> {
        self.text.split_whitespace().next()
    }

    /// All whitespace-delimited tokens of the text.
    pub fn tokens(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }
}

/// Current wall-clock time as fractional Unix seconds (microsecond resolution).
pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
