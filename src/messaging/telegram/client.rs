//! Telegram Bot API client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::*;
use crate::config::TelegramConfig;
use crate::error::TransientError;
use crate::messaging::traits::{InboundMessage, MessagingClient};

/// Bot client bound to one token and one destination chat.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    async fn read_result<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransientError::Decode(e.to_string()))?;

        if !envelope.ok {
            return Err(TransientError::Api(
                envelope.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        envelope
            .result
            .ok_or_else(|| TransientError::Decode("missing result".to_string()))
    }
}

#[async_trait]
impl MessagingClient for TelegramClient {
    #[instrument(skip(self, html), name = "tg_send_message")]
    async fn send_message(&self, html: &str) -> Result<(), TransientError> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text: html,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await?;

        let _: serde_json::Value = Self::read_result(response).await?;
        debug!("Message sent ({} bytes)", html.len());
        Ok(())
    }

    #[instrument(skip(self), name = "tg_get_updates")]
    async fn poll_inbound(
        &self,
        cursor: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<InboundMessage>, TransientError> {
        let mut query = vec![("timeout", timeout_secs.to_string())];
        if let Some(cursor) = cursor {
            query.push(("offset", (cursor + 1).to_string()));
        }

        let sent = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .timeout(Duration::from_secs(timeout_secs + 5))
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                debug!("Long-poll expired without updates");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let updates: Vec<Update> = Self::read_result(response).await?;
        if !updates.is_empty() {
            debug!("Received {} update(s)", updates.len());
        }

        Ok(updates
            .into_iter()
            .map(|update| match update.message {
                Some(message) => InboundMessage {
                    cursor: update.update_id,
                    chat_id: message.chat.id.to_string(),
                    text: message.text.unwrap_or_default(),
                    username: message.from.and_then(|u| u.username),
                },
                None => {
                    debug!(update_id = update.update_id, "Non-message update");
                    InboundMessage {
                        cursor: update.update_id,
                        chat_id: String::new(),
                        text: String::new(),
                        username: None,
                    }
                }
            })
            .collect())
    }
}
