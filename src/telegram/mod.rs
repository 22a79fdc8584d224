//! Telegram bot integration.

pub mod client;
pub mod handler;

pub use client::{create_bot, run_telegram_bridge, TelegramReplySender};
