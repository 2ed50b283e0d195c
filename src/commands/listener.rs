//! Long-poll loop for operator messages.

use super::processor::CommandProcessor;
use crate::messaging::{InboundMessage, MessagingClient};
use crate::utils::format::escape_html;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct CommandListener {
    messenger: Arc<dyn MessagingClient>,
    processor: CommandProcessor,
    allowed_chat: String,
    long_poll_secs: u64,
    backoff: Duration,
    shutdown: watch::Receiver<bool>,
}

impl CommandListener {
    pub fn new(
        messenger: Arc<dyn MessagingClient>,
        processor: CommandProcessor,
        allowed_chat: impl Into<String>,
        long_poll_secs: u64,
        backoff: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            messenger,
            processor,
            allowed_chat: allowed_chat.into(),
            long_poll_secs,
            backoff,
            shutdown,
        }
    }

    /// Poll until shutdown. Each update is acknowledged by advancing the
    /// cursor past it, whether or not it carried a command.
    pub async fn run(mut self) {
        info!("📨 Command listener started for chat {}", self.allowed_chat);
        let mut cursor: Option<i64> = None;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            // A poll in flight is allowed to finish; its batch is left
            // unacknowledged on shutdown so it is re-delivered next start.
            let batch = self
                .messenger
                .poll_inbound(cursor, self.long_poll_secs)
                .await;
            if *self.shutdown.borrow() {
                debug!("Shutdown requested, leaving last batch unacknowledged");
                break;
            }

            match batch {
                Ok(messages) => {
                    for message in messages {
                        cursor = Some(cursor.map_or(message.cursor, |c| c.max(message.cursor)));
                        self.handle(message).await;
                    }
                }
                Err(e) => {
                    warn!("Inbound poll failed: {}, retrying in {:?}", e, self.backoff);
                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => {}
                        changed = self.shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("Command listener stopped");
    }

    async fn handle(&self, message: InboundMessage) {
        let text = message.text.trim();
        if text.is_empty() {
            return;
        }

        if message.chat_id != self.allowed_chat {
            warn!(
                "Rejected message from chat {} ({:?})",
                message.chat_id, message.username
            );
            let denial = format!(
                "❌ Access denied. Your chat ID is: <code>{}</code>",
                escape_html(&message.chat_id)
            );
            if let Err(e) = self.messenger.send_message(&denial).await {
                warn!("Failed to send access denial: {}", e);
            }
            return;
        }

        debug!("Inbound message: {}", text);
        self.processor.handle(text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PositionSampler, Reporter};
    use crate::error::TransientError;
    use crate::exchange::MockExchange;
    use crate::messaging::{MockMessagingClient, RecordingMessenger};
    use crate::state::{spawn_config_actor, ConfigHandle, MemoryStore, StateDocument};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const CHAT: &str = "1001";

    fn message(cursor: i64, chat_id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            cursor,
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            username: None,
        }
    }

    fn listener(
        messenger: Arc<dyn MessagingClient>,
        shutdown: watch::Receiver<bool>,
    ) -> (CommandListener, ConfigHandle) {
        let (config, _) = spawn_config_actor(
            StateDocument::default(),
            Arc::new(MemoryStore::default()),
            0,
            16,
        );
        let sampler = PositionSampler::new(Arc::new(MockExchange::new()), config.clone(), 2);
        let processor = CommandProcessor::new(
            config.clone(),
            Reporter::new(sampler),
            messenger.clone(),
            Arc::new(Notify::new()),
            Duration::from_millis(1),
        );
        let listener = CommandListener::new(
            messenger,
            processor,
            CHAT,
            1,
            Duration::from_millis(10),
            shutdown,
        );
        (listener, config)
    }

    #[tokio::test]
    async fn test_commands_advance_cursor_and_apply() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger
            .push_inbound(vec![
                message(7, CHAT, "/add_coin sol"),
                message(8, CHAT, ""),
                message(9, CHAT, "gm"),
            ])
            .await;
        messenger
            .push_inbound(vec![message(10, CHAT, "/set_consensus 2")])
            .await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (listener, config) = listener(messenger.clone(), shutdown_rx);
        let task = tokio::spawn(listener.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let cursors = messenger.polled_cursors().await;
        assert_eq!(&cursors[..3], &[None, Some(9), Some(10)]);

        let settings = config.read().await.unwrap();
        assert_eq!(settings.symbols, vec!["BTC", "ETH", "SOL"]);
        assert_eq!(settings.consensus_count, 2);
        assert_eq!(messenger.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn test_foreign_chat_is_denied() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger
            .push_inbound(vec![message(1, "666", "/set_consensus 4")])
            .await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (listener, config) = listener(messenger.clone(), shutdown_rx);
        let task = tokio::spawn(listener.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let sent = messenger.sent().await;
        assert_eq!(
            sent,
            vec!["❌ Access denied. Your chat ID is: <code>666</code>"]
        );
        assert_eq!(config.read().await.unwrap().consensus_count, 1);
    }

    #[tokio::test]
    async fn test_poll_errors_back_off_and_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut mock = MockMessagingClient::new();
        mock.expect_poll_inbound().returning(move |cursor, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                assert_eq!(cursor, None);
                Err(TransientError::Transport("connection reset".into()))
            } else {
                Ok(vec![message(3, CHAT, "/status")])
            }
        });
        mock.expect_send_message().returning(|_| Ok(()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (listener, _) = listener(Arc::new(mock), shutdown_rx);
        let task = tokio::spawn(listener.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    /// Answers one poll after a delay, then idles.
    #[derive(Default)]
    struct SlowMessenger {
        completed_polls: AtomicUsize,
        sent: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MessagingClient for SlowMessenger {
        async fn send_message(&self, _html: &str) -> Result<(), TransientError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn poll_inbound(
            &self,
            _cursor: Option<i64>,
            _timeout_secs: u64,
        ) -> Result<Vec<InboundMessage>, TransientError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.completed_polls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![message(4, CHAT, "/status")])
        }
    }

    #[tokio::test]
    async fn test_shutdown_lets_poll_finish_without_handling_batch() {
        let messenger = Arc::new(SlowMessenger::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (listener, _) = listener(messenger.clone(), shutdown_rx);
        let task = tokio::spawn(listener.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(messenger.completed_polls.load(Ordering::SeqCst), 1);
        assert_eq!(messenger.sent.load(Ordering::SeqCst), 0);
    }
}
