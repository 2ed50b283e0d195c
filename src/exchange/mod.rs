//! Exchange integrations.
//!
//! ## Hyperliquid
//! Read-only access to perpetuals data for:
//! - Mid prices used as the mark for every tracked symbol
//! - Per-wallet open positions (size, entry, liquidation price)

pub mod hyperliquid;
pub mod mock;
mod traits;

pub use hyperliquid::HyperliquidClient;
pub use mock::MockExchange;
pub use traits::{AccountState, ExchangeClient, PositionDetails};
