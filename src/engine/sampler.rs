//! Turns exchange state into normalized per-symbol position rows.

use super::types::{PositionRow, Side};
use crate::error::ActorError;
use crate::exchange::{AccountState, ExchangeClient};
use crate::state::{ConfigHandle, Stamping, WalletAddress};
use crate::utils::decimal::{notional, unrealized_pnl};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Account state per wallet for one cycle, `None` where the query failed.
pub type WalletStates = Vec<(WalletAddress, Option<AccountState>)>;

/// Fetches wallet state and builds [`PositionRow`]s.
#[derive(Clone)]
pub struct PositionSampler {
    exchange: Arc<dyn ExchangeClient>,
    config: ConfigHandle,
    max_concurrent: usize,
}

impl PositionSampler {
    pub fn new(exchange: Arc<dyn ExchangeClient>, config: ConfigHandle, max_concurrent: usize) -> Self {
        Self {
            exchange,
            config,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Current mids; empty when the exchange is unavailable.
    pub async fn fetch_mids(&self) -> HashMap<String, Decimal> {
        match self.exchange.mid_prices().await {
            Ok(mids) => mids,
            Err(e) => {
                warn!("Failed to fetch mid prices: {}", e);
                HashMap::new()
            }
        }
    }

    /// Query every wallet with at most `max_concurrent` requests in flight.
    /// Output keeps the order of `wallets`.
    pub async fn fetch_states(&self, wallets: &[WalletAddress]) -> WalletStates {
        stream::iter(wallets.iter().cloned())
            .map(|wallet| async move {
                match self.exchange.account_state(&wallet).await {
                    Ok(state) => (wallet, Some(state)),
                    Err(e) => {
                        warn!(wallet = %wallet, "Failed to fetch account state: {}", e);
                        (wallet, None)
                    }
                }
            })
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    /// Rows for `symbol`, with first-seen times from the config actor.
    pub async fn sample(
        &self,
        symbol: &str,
        states: &WalletStates,
        mids: &HashMap<String, Decimal>,
        now: DateTime<Utc>,
        stamping: Stamping,
    ) -> Result<Vec<PositionRow>, ActorError> {
        let mut rows = build_rows(symbol, states, mids);

        let keys: Vec<_> = rows.iter().filter_map(|r| r.key(symbol)).collect();
        let stamps = self.config.first_seen(symbol, keys, now, stamping).await?;

        let directional = rows.iter_mut().filter(|r| r.side.is_some());
        for (row, stamp) in directional.zip(stamps) {
            row.first_seen = stamp;
        }

        debug!(
            symbol,
            wallets = rows.len(),
            directional = rows.iter().filter(|r| r.side.is_some()).count(),
            "Sampled positions"
        );
        Ok(rows)
    }
}

/// Rows for `symbol` in wallet order, without first-seen times.
pub fn build_rows(
    symbol: &str,
    states: &WalletStates,
    mids: &HashMap<String, Decimal>,
) -> Vec<PositionRow> {
    let mark = mids.get(&symbol.to_uppercase()).copied();

    states
        .iter()
        .map(|(wallet, state)| {
            let Some(details) = state.as_ref().and_then(|s| s.position(symbol)) else {
                return PositionRow {
                    mark_price: state.as_ref().and(mark),
                    ..PositionRow::absent(wallet.clone())
                };
            };

            let side = details.size.and_then(Side::from_size);
            // A zero size is no position at all.
            let size = details.size.filter(|_| side.is_some());

            let value = size.zip(mark).and_then(|(s, m)| notional(s, m));
            let pnl = match (size, details.entry_price, mark) {
                (Some(s), Some(e), Some(m)) => unrealized_pnl(s, e, m),
                _ => None,
            };

            PositionRow {
                wallet: wallet.clone(),
                size,
                side,
                entry_price: details.entry_price,
                mark_price: mark,
                liquidation_price: details.liquidation_price,
                notional: value,
                unrealized_pnl: pnl,
                first_seen: None,
            }
        })
        .collect()
}
