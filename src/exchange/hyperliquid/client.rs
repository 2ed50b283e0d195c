//! Hyperliquid REST API client.
//!
//! Every request goes to `POST {base_url}/info` under the configured
//! timeout. Failures are returned as [`TransientError`], never retried here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::types::*;
use crate::config::ExchangeConfig;
use crate::error::TransientError;
use crate::exchange::traits::{AccountState, ExchangeClient};
use crate::state::WalletAddress;

/// Hyperliquid API client for mids and account state.
#[derive(Debug, Clone)]
pub struct HyperliquidClient {
    client: Client,
    base_url: String,
}

impl HyperliquidClient {
    /// Create a client from the exchange section of the app config.
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_info<T: DeserializeOwned>(&self, request: &InfoRequest) -> Result<T, TransientError> {
        let url = format!("{}/info", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TransientError::Decode(e.to_string()))
    }

    /// Get mid prices for every listed coin, keyed by uppercase name.
    #[instrument(skip(self), name = "hl_all_mids")]
    pub async fn get_all_mids(&self) -> Result<HashMap<String, Decimal>, TransientError> {
        let raw: AllMidsResponse = self.post_info(&InfoRequest::AllMids).await?;
        let mids = parse_mids(raw);
        debug!("Fetched {} mid prices from Hyperliquid", mids.len());
        Ok(mids)
    }

    /// Get a wallet's perpetuals account summary.
    #[instrument(skip(self), fields(wallet = %wallet), name = "hl_clearinghouse_state")]
    pub async fn get_clearinghouse_state(
        &self,
        wallet: &WalletAddress,
    ) -> Result<ClearinghouseState, TransientError> {
        let request = InfoRequest::ClearinghouseState {
            user: wallet.to_lowercase_hex(),
        };
        let state: ClearinghouseState = self.post_info(&request).await?;
        debug!("Fetched {} asset positions", state.asset_positions.len());
        Ok(state)
    }
}

#[async_trait]
impl ExchangeClient for HyperliquidClient {
    async fn mid_prices(&self) -> Result<HashMap<String, Decimal>, TransientError> {
        self.get_all_mids().await
    }

    async fn account_state(&self, wallet: &WalletAddress) -> Result<AccountState, TransientError> {
        self.get_clearinghouse_state(wallet).await.map(AccountState::from)
    }
}
