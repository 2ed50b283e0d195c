//! Type definitions for Hyperliquid info API requests and responses.

use crate::exchange::traits::{AccountState, PositionDetails};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request type for Hyperliquid info endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InfoRequest {
    /// Get all mid prices.
    #[serde(rename = "allMids")]
    AllMids,

    /// Get a user's perpetuals account summary.
    #[serde(rename = "clearinghouseState")]
    ClearinghouseState { user: String },
}

/// Response from allMids: coin name -> decimal string.
pub type AllMidsResponse = HashMap<String, String>;

/// Response from clearinghouseState (only the fields the radar reads).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    #[serde(default)]
    pub asset_positions: Vec<AssetPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPosition {
    #[serde(default)]
    pub position: Option<PerpPosition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerpPosition {
    #[serde(default)]
    pub coin: String,
    /// Signed size
    #[serde(default, deserialize_with = "deserialize_decimal_option_null")]
    pub szi: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_option_null")]
    pub entry_px: Option<Decimal>,
    /// Null when the position cannot be liquidated at current leverage
    #[serde(
        default,
        alias = "liqPx",
        deserialize_with = "deserialize_decimal_option_null"
    )]
    pub liquidation_px: Option<Decimal>,
}

impl From<ClearinghouseState> for AccountState {
    fn from(state: ClearinghouseState) -> Self {
        let positions = state
            .asset_positions
            .into_iter()
            .filter_map(|a| a.position)
            .map(|p| PositionDetails {
                symbol: p.coin.to_uppercase(),
                size: p.szi,
                entry_price: p.entry_px,
                liquidation_price: p.liquidation_px,
            })
            .collect();
        AccountState { positions }
    }
}

/// Parse allMids into uppercase symbols, skipping unparsable prices.
pub fn parse_mids(raw: AllMidsResponse) -> HashMap<String, Decimal> {
    raw.into_iter()
        .filter_map(|(coin, px)| px.parse::<Decimal>().ok().map(|p| (coin.to_uppercase(), p)))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Str(String),
    Num(f64),
}

/// Deserializer that accepts a decimal string or number, null, or a missing field.
fn deserialize_decimal_option_null<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<NumberOrString> = Option::deserialize(deserializer)?;
    match opt {
        Some(NumberOrString::Str(s)) if !s.is_empty() => s
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(NumberOrString::Num(n)) => Decimal::try_from(n)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
