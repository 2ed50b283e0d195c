//! Messaging channel integrations.
//!
//! ## Telegram
//! Alerts and command replies go out as HTML messages; operator commands
//! arrive through Bot API long-polling.

pub mod mock;
pub mod telegram;
mod traits;

pub use mock::{NoopMessenger, RecordingMessenger};
pub use telegram::TelegramClient;
pub use traits::{InboundMessage, MessagingClient};

#[cfg(test)]
pub use traits::MockMessagingClient;
