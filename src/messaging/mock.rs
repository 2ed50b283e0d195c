//! In-memory messaging clients.

use super::traits::{InboundMessage, MessagingClient};
use crate::error::TransientError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// Records every sent message and replays scripted inbound batches.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<String>>,
    inbound: Mutex<VecDeque<Vec<InboundMessage>>>,
    cursors: Mutex<Vec<Option<i64>>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one batch for a future `poll_inbound`.
    pub async fn push_inbound(&self, batch: Vec<InboundMessage>) {
        self.inbound.lock().await.push_back(batch);
    }

    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    /// Cursor argument of every `poll_inbound` call.
    pub async fn polled_cursors(&self) -> Vec<Option<i64>> {
        self.cursors.lock().await.clone()
    }
}

#[async_trait]
impl MessagingClient for RecordingMessenger {
    async fn send_message(&self, html: &str) -> Result<(), TransientError> {
        self.sent.lock().await.push(html.to_string());
        Ok(())
    }

    async fn poll_inbound(
        &self,
        cursor: Option<i64>,
        _timeout_secs: u64,
    ) -> Result<Vec<InboundMessage>, TransientError> {
        self.cursors.lock().await.push(cursor);
        match self.inbound.lock().await.pop_front() {
            Some(batch) => Ok(batch),
            None => {
                // Behave like an idle long-poll without stalling tests.
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Used when no bot credentials are configured: drops outbound messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMessenger;

#[async_trait]
impl MessagingClient for NoopMessenger {
    async fn send_message(&self, _html: &str) -> Result<(), TransientError> {
        Ok(())
    }

    async fn poll_inbound(
        &self,
        _cursor: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<InboundMessage>, TransientError> {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        Ok(Vec::new())
    }
}
