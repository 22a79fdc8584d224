//! Console transport: one command per stdin line, replies on stdout.
//!
//! Lines of the form `<sender>: <text>` are attributed to `<sender>`;
//! anything else comes from [`CONSOLE_SENDER`].
//!
//! stdin is read on a plain OS thread and handed over through a channel.
//! A blocking read there never holds up runtime shutdown, so Ctrl+C exits
//! even while stdin stays open.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};

use super::{enqueue_inbound, ReplySender};
use crate::core::MessageQueue;
use crate::error::Result;

/// Sender ID for lines without an explicit sender.
pub const CONSOLE_SENDER: &str = "console";

/// Split a console line into `(sender, text)`.
pub fn parse_console_line(line: &str) -> (String, String) {
    if let Some((sender, text)) = line.split_once(':') {
        let sender = sender.trim();
        if !sender.is_empty() && !sender.contains(char::is_whitespace) {
            return (sender.to_string(), text.trim().to_string());
        }
    }
    (CONSOLE_SENDER.to_string(), line.trim().to_string())
}

/// Lines waiting for the bridge. Kept small; the reader thread blocks when full.
const LINE_BUFFER: usize = 64;

/// Start a detached thread that forwards stdin lines until EOF, a read
/// error, or the receiver is dropped.
pub fn spawn_stdin_reader() -> Result<mpsc::Receiver<std::io::Result<String>>> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);

    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;

    Ok(rx)
}

/// Push every stdin line to the queue until EOF.
pub async fn run_stdin_bridge(queue: Arc<dyn MessageQueue>) -> Result<()> {
    tracing::info!("Reading commands from stdin");
    run_line_bridge(queue, spawn_stdin_reader()?).await
}

/// Push every received line to the queue until the channel closes.
pub async fn run_line_bridge(
    queue: Arc<dyn MessageQueue>,
    mut lines: mpsc::Receiver<std::io::Result<String>>,
) -> Result<()> {
    while let Some(line) = lines.recv().await {
        let (sender, text) = parse_console_line(&line?);
        enqueue_inbound(queue.as_ref(), &sender, &text)?;
    }

    tracing::info!("stdin closed");
    Ok(())
}

/// Prints replies as `-> <destination>: <text>`.
pub struct StdoutReplySender {
    out: Mutex<tokio::io::Stdout>,
}

impl StdoutReplySender {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutReplySender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplySender for StdoutReplySender {
    async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(format!("-> {}: {}\n", destination, text).as_bytes())
            .await?;
        out.flush().await?;
        Ok(())
    }
}
