//! Command handler contract and registry.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::core::Message;

/// Reply sent when a handler fails for an internal reason.
pub const COMMAND_FAILED_REPLY: &str = "Command failed.";

#[derive(Error, Debug)]
pub enum HandlerError {
    /// The command was understood but refused; the text goes back to the sender.
    #[error("{0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn rejected(reply: impl Into<String>) -> Self {
        HandlerError::Rejected(reply.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        HandlerError::Internal(reason.into())
    }

    /// Text safe to send to the remote sender.
    pub fn user_message(&self) -> String {
        match self {
            HandlerError::Rejected(reply) => reply.clone(),
            HandlerError::Io(_) | HandlerError::Internal(_) => COMMAND_FAILED_REPLY.to_string(),
        }
    }
}

/// Produces reply text for a command message.
pub trait Handler: Send + Sync {
    fn handle(&self, message: &Message) -> Result<String, HandlerError>;
}

/// Handler backed by a closure.
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Message) -> Result<String, HandlerError> + Send + Sync,
{
    fn handle(&self, message: &Message) -> Result<String, HandlerError> {
        (self.0)(message)
    }
}

/// Wrap a closure as a [`Handler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Message) -> Result<String, HandlerError> + Send + Sync,
{
    FnHandler(f)
}

/// Command keyword to handler mapping. Last registration wins.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: impl Into<String>, handler: Arc<dyn Handler>) {
        let command = command.into();
        if self.handlers.insert(command.clone(), handler).is_some() {
            tracing::debug!("Replaced handler for command: {}", command);
        }
    }

    pub fn get(&self, command: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(command).cloned()
    }

    /// Registered keywords, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        commands.sort_unstable();
        commands
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
