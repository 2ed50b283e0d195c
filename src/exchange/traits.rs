//! Venue-agnostic view of the two read-only queries the engine needs.

use crate::error::TransientError;
use crate::state::WalletAddress;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One open perpetual position as reported by the venue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionDetails {
    /// Uppercase coin name (e.g., "ETH")
    pub symbol: String,
    /// Signed size, positive for long
    pub size: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub liquidation_price: Option<Decimal>,
}

/// A wallet's perpetual account state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountState {
    pub positions: Vec<PositionDetails>,
}

impl AccountState {
    /// Position on `symbol` (case-insensitive), if the wallet has one.
    pub fn position(&self, symbol: &str) -> Option<&PositionDetails> {
        self.positions
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Read-only market and account data source.
///
/// Every call is bounded by a timeout; any failure is a [`TransientError`]
/// that callers treat as "no data this cycle".
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Mid price per uppercase symbol.
    async fn mid_prices(&self) -> Result<HashMap<String, Decimal>, TransientError>;

    /// Open positions of one wallet.
    async fn account_state(&self, wallet: &WalletAddress) -> Result<AccountState, TransientError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_lookup_ignores_case() {
        let state = AccountState {
            positions: vec![PositionDetails {
                symbol: "ETH".to_string(),
                size: Some(dec!(1.5)),
                ..Default::default()
            }],
        };
        assert_eq!(state.position("eth").and_then(|p| p.size), Some(dec!(1.5)));
        assert!(state.position("BTC").is_none());
    }
}
