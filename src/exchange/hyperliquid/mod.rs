//! Hyperliquid exchange integration.
//!
//! Read-only access to the public info endpoint:
//! - `allMids` for the mark used to value positions
//! - `clearinghouseState` for a wallet's open perpetual positions

mod client;
mod types;

pub use client::HyperliquidClient;
pub use types::*;
