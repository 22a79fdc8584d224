//! Service host: drains the queue and routes each message to a handler.
//!
//! Delivery policy: a message is acknowledged after the reply-send attempt,
//! whether or not the send succeeded. Replies are therefore delivered at
//! most once; a crash between handling and ack re-runs the handler on the
//! next start, a failed send is never retried.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::handler::{Handler, HandlerRegistry, COMMAND_FAILED_REPLY};
use crate::core::{Message, MessageQueue};
use crate::error::Result;
use crate::transport::ReplySender;

/// Reply for a message with no tokens.
pub const EMPTY_COMMAND_REPLY: &str = "Empty command.";

/// Reply for a keyword with no registered handler.
pub const UNKNOWN_COMMAND_REPLY: &str = "Unknown command.";

/// Wait between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Single-consumer dispatch loop.
pub struct ServiceHost {
    queue: Arc<dyn MessageQueue>,
    replies: Arc<dyn ReplySender>,
    handlers: HandlerRegistry,
    poll_interval: Duration,
    stop_requested: AtomicBool,
    stop_when_idle: AtomicBool,
}

impl ServiceHost {
    pub fn new(queue: Arc<dyn MessageQueue>, replies: Arc<dyn ReplySender>) -> Self {
        Self {
            queue,
            replies,
            handlers: HandlerRegistry::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_requested: AtomicBool::new(false),
            stop_when_idle: AtomicBool::new(false),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Register a handler for a command keyword, replacing any previous one.
    pub fn register_handler(&mut self, command: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.register(command, Arc::new(handler));
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Stop after the message currently being processed.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        tracing::info!("Service host stop requested");
    }

    /// Stop once the queue has been drained.
    pub fn stop_when_idle(&self) {
        self.stop_when_idle.store(true, Ordering::SeqCst);
        tracing::info!("Service host will stop when the queue is empty");
    }

    /// Run until stopped. Returns an error only for queue I/O failures.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            "Service host started ({} queue, commands: {})",
            self.queue.name(),
            self.handlers.commands().join(", ")
        );

        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            if self.process_next().await? {
                continue;
            }

            if self.stop_when_idle.load(Ordering::SeqCst) {
                break;
            }

            self.queue.wait_for_push(self.poll_interval).await;
        }

        tracing::info!("Service host stopped");
        Ok(())
    }

    /// One dispatch cycle. `Ok(false)` when the queue was empty.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(queued) = self.queue.pop()? else {
            return Ok(false);
        };

        let message = &queued.message;
        tracing::debug!("Dispatching from {}: {}", message.sender, message.text);

        let reply = self.reply_for(message);

        if let Err(e) = self.replies.send_text(&message.sender, &reply).await {
            tracing::error!("Failed to send reply to {}: {}", message.sender, e);
        }

        self.queue.ack(&queued)?;
        Ok(true)
    }

    /// Route a message to its handler and produce the reply text.
    pub fn reply_for(&self, message: &Message) -> String {
        let Some(command) = message.command() else {
            return EMPTY_COMMAND_REPLY.to_string();
        };

        let Some(handler) = self.handlers.get(command) else {
            tracing::debug!("Unknown command from {}: {}", message.sender, command);
            return UNKNOWN_COMMAND_REPLY.to_string();
        };

        match catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!("Handler '{}' failed for {}: {}", command, message.sender, e);
                e.user_message()
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Handler '{}' panicked for {}: {}", command, message.sender, reason);
                COMMAND_FAILED_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FileMessageQueue, MemoryMessageQueue};
    use crate::error::Error;
    use crate::service::handler::{handler_fn, HandlerError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplySender for RecordingSender {
        async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Transport("link down".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn host_with(queue: Arc<dyn MessageQueue>, sender: Arc<RecordingSender>) -> ServiceHost {
        let mut host = ServiceHost::new(queue, sender);
        host.register_handler("ping", handler_fn(|_| Ok("pong".to_string())));
        host.register_handler(
            "board",
            handler_fn(|m| Ok(format!("board saw {} tokens", m.tokens().len()))),
        );
        host
    }

    #[tokio::test]
    async fn test_end_to_end_ping() {
        let temp_dir = tempfile::tempdir().unwrap();
        let queue: Arc<dyn MessageQueue> =
            Arc::new(FileMessageQueue::open(temp_dir.path().join("queue")).unwrap());
        let sender = Arc::new(RecordingSender::default());
        let host = host_with(queue.clone(), sender.clone());

        queue.push(&Message::new("u1", "ping", 1000.0)).unwrap();

        assert!(host.process_next().await.unwrap());
        assert_eq!(sender.sent(), vec![("u1".to_string(), "pong".to_string())]);
        assert!(queue.pop().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_process_next_on_empty_queue() {
        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryMessageQueue::new());
        let sender = Arc::new(RecordingSender::default());
        let host = host_with(queue, sender.clone());

        assert!(!host.process_next().await.unwrap());
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn test_routing() {
        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryMessageQueue::new());
        let host = host_with(queue, Arc::new(RecordingSender::default()));

        let routed = host.reply_for(&Message::new("u1", "board read general", 1.0));
        assert_eq!(routed, "board saw 3 tokens");

        let unknown = host.reply_for(&Message::new("u1", "unknown foo", 1.0));
        assert_eq!(unknown, UNKNOWN_COMMAND_REPLY);

        let empty = host.reply_for(&Message::new("u1", "", 1.0));
        assert_eq!(empty, EMPTY_COMMAND_REPLY);

        let blank = host.reply_for(&Message::new("u1", "  \t", 1.0));
        assert_eq!(blank, EMPTY_COMMAND_REPLY);
    }

    #[test]
    fn test_handler_error_becomes_reply() {
        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryMessageQueue::new());
        let mut host = ServiceHost::new(queue, Arc::new(RecordingSender::default()));
        host.register_handler(
            "mail",
            handler_fn(|_| Err(HandlerError::rejected("Invalid message number."))),
        );
        host.register_handler(
            "disk",
            handler_fn(|_| Err(HandlerError::internal("write failed"))),
        );

        assert_eq!(
            host.reply_for(&Message::new("u1", "mail read 9", 1.0)),
            "Invalid message number."
        );
        assert_eq!(
            host.reply_for(&Message::new("u1", "disk", 1.0)),
            COMMAND_FAILED_REPLY
        );
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryMessageQueue::new());
        let sender = Arc::new(RecordingSender::default());
        let mut host = ServiceHost::new(queue.clone(), sender.clone());
        host.register_handler("boom", handler_fn(|_| panic!("handler bug")));
        host.register_handler("ping", handler_fn(|_| Ok("pong".to_string())));

        queue.push(&Message::new("u1", "boom", 1.0)).unwrap();
        queue.push(&Message::new("u1", "ping", 2.0)).unwrap();

        assert!(host.process_next().await.unwrap());
        assert!(host.process_next().await.unwrap());
        assert_eq!(
            sender.sent(),
            vec![
                ("u1".to_string(), COMMAND_FAILED_REPLY.to_string()),
                ("u1".to_string(), "pong".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_send_still_acks() {
        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryMessageQueue::new());
        let host = host_with(queue.clone(), Arc::new(RecordingSender::failing()));

        queue.push(&Message::new("u1", "ping", 1.0)).unwrap();

        assert!(host.process_next().await.unwrap());
        assert!(queue.pop().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_drains_in_order_then_stops() {
        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryMessageQueue::new());
        let sender = Arc::new(RecordingSender::default());
        let host = host_with(queue.clone(), sender.clone())
            .with_poll_interval(Duration::from_millis(10));

        queue.push(&Message::new("u2", "ping", 10.0)).unwrap();
        queue.push(&Message::new("u1", "nope", 9.0)).unwrap();
        host.stop_when_idle();

        tokio::time::timeout(Duration::from_secs(5), host.run())
            .await
            .expect("run should stop once idle")
            .unwrap();

        assert_eq!(
            sender.sent(),
            vec![
                ("u1".to_string(), UNKNOWN_COMMAND_REPLY.to_string()),
                ("u2".to_string(), "pong".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_interrupts_idle_loop() {
        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryMessageQueue::new());
        let host = Arc::new(
            host_with(queue, Arc::new(RecordingSender::default()))
                .with_poll_interval(Duration::from_millis(10)),
        );

        let runner = {
            let host = host.clone();
            tokio::spawn(async move { host.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.stop();

        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("run should observe stop")
            .unwrap()
            .unwrap();
    }
}
