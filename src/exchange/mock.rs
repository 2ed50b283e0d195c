//! Scriptable in-memory exchange for tests and offline runs.

use super::traits::{AccountState, ExchangeClient, PositionDetails};
use crate::error::TransientError;
use crate::state::WalletAddress;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Exchange whose mids and per-wallet positions are set by the caller.
#[derive(Debug, Default)]
pub struct MockExchange {
    mids: RwLock<HashMap<String, Decimal>>,
    accounts: RwLock<HashMap<WalletAddress, AccountState>>,
    failing: RwLock<HashSet<WalletAddress>>,
    mids_down: RwLock<bool>,
    account_calls: AtomicU64,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_mid(&self, symbol: &str, price: Decimal) {
        self.mids.write().await.insert(symbol.to_uppercase(), price);
    }

    /// Make `mid_prices` fail until called again with `false`.
    pub async fn set_mids_down(&self, down: bool) {
        *self.mids_down.write().await = down;
    }

    /// Replace `wallet`'s position on `symbol`.
    pub async fn set_position(
        &self,
        wallet: &WalletAddress,
        symbol: &str,
        size: Decimal,
        entry_price: Decimal,
        liquidation_price: Option<Decimal>,
    ) {
        let mut accounts = self.accounts.write().await;
        let account = accounts.entry(wallet.clone()).or_default();
        account
            .positions
            .retain(|p| !p.symbol.eq_ignore_ascii_case(symbol));
        account.positions.push(PositionDetails {
            symbol: symbol.to_uppercase(),
            size: Some(size),
            entry_price: Some(entry_price),
            liquidation_price,
        });
    }

    pub async fn clear_position(&self, wallet: &WalletAddress, symbol: &str) {
        if let Some(account) = self.accounts.write().await.get_mut(wallet) {
            account
                .positions
                .retain(|p| !p.symbol.eq_ignore_ascii_case(symbol));
        }
    }

    /// Make `account_state` fail for `wallet`.
    pub async fn fail_wallet(&self, wallet: &WalletAddress) {
        self.failing.write().await.insert(wallet.clone());
    }

    /// Number of `account_state` calls so far.
    pub fn account_calls(&self) -> u64 {
        self.account_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn mid_prices(&self) -> Result<HashMap<String, Decimal>, TransientError> {
        if *self.mids_down.read().await {
            return Err(TransientError::Timeout("mock mids unavailable".to_string()));
        }
        Ok(self.mids.read().await.clone())
    }

    async fn account_state(&self, wallet: &WalletAddress) -> Result<AccountState, TransientError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().await.contains(wallet) {
            return Err(TransientError::Status {
                status: 429,
                body: "rate limited".to_string(),
            });
        }
        Ok(self
            .accounts
            .read()
            .await
            .get(wallet)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wallet() -> WalletAddress {
        "0x2222222222222222222222222222222222222222".parse().unwrap()
    }

    #[tokio::test]
    async fn test_scripted_positions() {
        let exchange = MockExchange::new();
        exchange
            .set_position(&wallet(), "eth", dec!(1), dec!(2000), None)
            .await;
        exchange
            .set_position(&wallet(), "ETH", dec!(2), dec!(2100), None)
            .await;

        let state = exchange.account_state(&wallet()).await.unwrap();
        assert_eq!(state.positions.len(), 1);
        assert_eq!(state.position("ETH").unwrap().size, Some(dec!(2)));
        assert_eq!(exchange.account_calls(), 1);

        exchange.clear_position(&wallet(), "ETH").await;
        let state = exchange.account_state(&wallet()).await.unwrap();
        assert!(state.position("ETH").is_none());
    }

    #[tokio::test]
    async fn test_failures() {
        let exchange = MockExchange::new();
        exchange.fail_wallet(&wallet()).await;
        exchange.set_mids_down(true).await;

        assert!(exchange.account_state(&wallet()).await.is_err());
        assert!(exchange.mid_prices().await.unwrap_err().is_timeout());
    }
}
