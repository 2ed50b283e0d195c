//! Core data types flowing through the consensus pipeline.

use crate::state::WalletAddress;
use crate::utils::decimal::sum_present;
use crate::utils::format::serialize_timestamp_option;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional exposure of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Long for positive size, short for negative, `None` when flat.
    pub fn from_size(size: Decimal) -> Option<Side> {
        if size > Decimal::ZERO {
            Some(Side::Long)
        } else if size < Decimal::ZERO {
            Some(Side::Short)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    /// Uppercase label for messages.
    pub fn label(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Side::Long => "🟢",
            Side::Short => "🔴",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one directional position for first-seen bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub wallet: WalletAddress,
    pub symbol: String,
    pub side: Side,
}

/// One wallet's position on one symbol at sampling time.
///
/// Any field may be absent: the wallet holds nothing, the exchange omitted
/// it, or the query failed. Derived values are only present when all their
/// inputs are.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    #[serde(rename = "addr")]
    pub wallet: WalletAddress,
    #[serde(rename = "szi", with = "rust_decimal::serde::float_option")]
    pub size: Option<Decimal>,
    pub side: Option<Side>,
    #[serde(rename = "entry", with = "rust_decimal::serde::float_option")]
    pub entry_price: Option<Decimal>,
    #[serde(rename = "mark", with = "rust_decimal::serde::float_option")]
    pub mark_price: Option<Decimal>,
    #[serde(rename = "liq", with = "rust_decimal::serde::float_option")]
    pub liquidation_price: Option<Decimal>,
    #[serde(rename = "value", with = "rust_decimal::serde::float_option")]
    pub notional: Option<Decimal>,
    #[serde(rename = "upnl", with = "rust_decimal::serde::float_option")]
    pub unrealized_pnl: Option<Decimal>,
    #[serde(rename = "opened_at", serialize_with = "serialize_timestamp_option")]
    pub first_seen: Option<DateTime<Utc>>,
}

impl PositionRow {
    /// Row for a wallet whose state could not be fetched.
    pub fn absent(wallet: WalletAddress) -> Self {
        Self {
            wallet,
            size: None,
            side: None,
            entry_price: None,
            mark_price: None,
            liquidation_price: None,
            notional: None,
            unrealized_pnl: None,
            first_seen: None,
        }
    }

    /// First-seen key, only for directional rows.
    pub fn key(&self, symbol: &str) -> Option<PositionKey> {
        self.side.map(|side| PositionKey {
            wallet: self.wallet.clone(),
            symbol: symbol.to_string(),
            side,
        })
    }
}

/// A side of a symbol that reached the consensus threshold this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSignal {
    pub symbol: String,
    pub side: Side,
    pub count: usize,
    pub threshold: u32,
    pub ts: DateTime<Utc>,
    pub use_positions: bool,
    pub rows: Vec<PositionRow>,
}

impl CandidateSignal {
    pub fn wallets(&self) -> Vec<&WalletAddress> {
        self.rows.iter().map(|r| &r.wallet).collect()
    }

    /// Aggregated notional over rows where it is known.
    pub fn total_value(&self) -> Decimal {
        sum_present(self.rows.iter().map(|r| r.notional))
    }

    /// Aggregated unrealized PnL over rows where it is known.
    pub fn total_pnl(&self) -> Decimal {
        sum_present(self.rows.iter().map(|r| r.unrealized_pnl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn wallet() -> WalletAddress {
        "0x1111111111111111111111111111111111111111".parse().unwrap()
    }

    #[test]
    fn test_side_from_size() {
        assert_eq!(Side::from_size(dec!(0.5)), Some(Side::Long));
        assert_eq!(Side::from_size(dec!(-0.5)), Some(Side::Short));
        assert_eq!(Side::from_size(Decimal::ZERO), None);
    }

    #[test]
    fn test_row_serializes_with_feed_field_names() {
        let mut row = PositionRow::absent(wallet());
        row.size = Some(dec!(1.5));
        row.side = Some(Side::Long);
        row.mark_price = Some(dec!(2100));

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["addr"], "0x1111111111111111111111111111111111111111");
        assert_eq!(json["szi"], 1.5);
        assert_eq!(json["side"], "long");
        assert_eq!(json["mark"], 2100.0);
        assert!(json["upnl"].is_null());
        assert!(json["opened_at"].is_null());
    }

    #[test]
    fn test_opened_at_uses_wall_clock_layout() {
        let mut row = PositionRow::absent(wallet());
        row.first_seen = Some(Utc.with_ymd_and_hms(2024, 5, 1, 11, 55, 0).unwrap());

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["opened_at"], "2024-05-01 11:55:00");
    }

    #[test]
    fn test_key_only_for_directional_rows() {
        let mut row = PositionRow::absent(wallet());
        assert!(row.key("ETH").is_none());
        row.side = Some(Side::Short);
        let key = row.key("ETH").unwrap();
        assert_eq!(key.symbol, "ETH");
        assert_eq!(key.side, Side::Short);
    }
}
