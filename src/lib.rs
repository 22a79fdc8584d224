//! meshboard library root.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod service;
pub mod telegram;
pub mod transport;

pub use cli::Commands;
pub use config::{Config, Settings};
pub use crate::core::{FileMessageQueue, MemoryMessageQueue, Message, MessageQueue, QueuedMessage};
pub use error::{Error, Result};
pub use service::{Handler, HandlerError, ServiceHost};
pub use transport::ReplySender;
