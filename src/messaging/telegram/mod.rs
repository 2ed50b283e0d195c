//! Telegram Bot API integration.
//!
//! - `sendMessage` with HTML parse mode for alerts and command replies
//! - `getUpdates` long-polling for operator commands

mod client;
mod types;

pub use client::TelegramClient;
pub use types::*;
