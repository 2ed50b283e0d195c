//! Messaging channel contract: outbound rich text plus inbound long-poll.

use crate::error::TransientError;
use async_trait::async_trait;

/// One inbound update from the bot channel.
///
/// Updates that carry no text (joins, edits, stickers) still arrive with
/// an empty `text` so the caller can advance its cursor past them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Monotonic update id
    pub cursor: i64,
    pub chat_id: String,
    pub text: String,
    pub username: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Send an HTML-formatted message to the configured chat.
    async fn send_message(&self, html: &str) -> Result<(), TransientError>;

    /// Wait up to `timeout_secs` for updates newer than `cursor`.
    ///
    /// A long-poll that simply expires returns an empty batch.
    async fn poll_inbound(
        &self,
        cursor: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<InboundMessage>, TransientError>;
}
