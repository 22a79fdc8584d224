//! Core module - messages and the durable queue.
//!
//! This module contains the heart of meshboard's delivery guarantees:
//! - Message records
//! - Queue trait with file-backed and in-memory backends

pub mod file_queue;
pub mod memory_queue;
pub mod message;
pub mod queue;

pub use file_queue::FileMessageQueue;
pub use memory_queue::MemoryMessageQueue;
pub use message::Message;
pub use queue::{MessageHandle, MessageQueue, QueueStats, QueuedMessage};
