//! CLI commands for meshboard using clap.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::core::{FileMessageQueue, Message, MessageQueue};
use crate::handlers;
use crate::service::ServiceHost;
use crate::telegram;
use crate::transport::stdio::{run_stdin_bridge, StdoutReplySender};
use crate::transport::{ReplySender, TransportKind};

/// meshboard - durable command relay for board and mail.
#[derive(Parser)]
#[command(name = "meshboard")]
#[command(version)]
#[command(about = "meshboard - queue text commands durably and answer them", long_about = None)]
pub struct Commands {
    /// Home directory (settings, queue, data, logs)
    #[arg(long, env = "MESHBOARD_HOME", global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the transport bridge and the dispatch loop
    Serve {
        /// Transport to use (overrides settings)
        #[arg(long, value_enum)]
        transport: Option<TransportKind>,
    },

    /// Queue operations
    Queue {
        /// Queue action
        #[command(subcommand)]
        action: QueueCommand,
    },
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Show queue statistics
    Stats,

    /// List pending messages, oldest first
    List,

    /// Push a message as if it arrived from the transport
    Push {
        /// Sender ID
        sender: String,

        /// Command text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self, home: PathBuf) -> Result<()> {
        let config = Config::load(home)?;
        match &self.command {
            Command::Serve { transport } => cmd_serve(&config, *transport).await,
            Command::Queue { action } => cmd_queue(&config, action),
        }
    }
}

async fn cmd_serve(config: &Config, transport: Option<TransportKind>) -> Result<()> {
    let kind = transport.unwrap_or(config.settings.transport.kind);

    let queue: Arc<dyn MessageQueue> = Arc::new(FileMessageQueue::open(config.queue_dir())?);
    let stats = queue.stats()?;
    tracing::info!(
        "Opened queue at {} ({} pending, {} quarantined)",
        config.queue_dir().display(),
        stats.pending,
        stats.quarantined
    );

    let bot = match kind {
        TransportKind::Telegram => Some(telegram::create_bot(
            config.settings.transport.telegram.bot_token.as_deref(),
        )?),
        TransportKind::Stdio => None,
    };

    let replies: Arc<dyn ReplySender> = match &bot {
        Some(bot) => Arc::new(telegram::TelegramReplySender::new(bot.clone())),
        None => Arc::new(StdoutReplySender::new()),
    };

    let mut host = ServiceHost::new(queue.clone(), replies).with_poll_interval(config.poll_interval());
    handlers::register_defaults(&mut host, &config.data_dir());
    let host = Arc::new(host);

    let bridge: JoinHandle<crate::Result<()>> = {
        let host = host.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            match bot {
                Some(bot) => {
                    telegram::run_telegram_bridge(bot, queue).await;
                    host.stop();
                    Ok(())
                }
                None => {
                    // stdin EOF: answer what is already queued, then exit
                    let result = run_stdin_bridge(queue).await;
                    match &result {
                        Ok(()) => host.stop_when_idle(),
                        Err(_) => host.stop(),
                    }
                    result
                }
            }
        })
    };

    {
        let host = host.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            host.stop();
        });
    }

    let run_result = host.run().await;

    let bridge_result = if bridge.is_finished() {
        Some(bridge.await)
    } else {
        // a stdin reader thread blocked on read is detached; it does not delay exit
        bridge.abort();
        None
    };

    run_result?;
    if let Some(joined) = bridge_result {
        joined??;
    }
    Ok(())
}

fn cmd_queue(config: &Config, action: &QueueCommand) -> Result<()> {
    let queue = FileMessageQueue::open(config.queue_dir())?;

    match action {
        QueueCommand::Stats => {
            println!("{}", queue.stats()?);
        }
        QueueCommand::List => {
            let messages = queue.pending()?;
            println!("Pending messages ({}):", messages.len());
            for msg in messages {
                println!(
                    "  {}  {} -> {}",
                    format_arrival(msg.arrival_time),
                    msg.sender,
                    msg.text.chars().take(50).collect::<String>()
                );
            }
        }
        QueueCommand::Push { sender, text } => {
            let msg = Message::received(sender.as_str(), text.join(" "));
            queue.push(&msg)?;
            println!("Queued message from {} at {}", msg.sender, msg.arrival_time);
        }
    }

    Ok(())
}

fn format_arrival(arrival_time: f64) -> String {
    chrono::DateTime::from_timestamp_micros((arrival_time * 1_000_000.0) as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| arrival_time.to_string())
}
