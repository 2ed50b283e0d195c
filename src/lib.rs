//! # Consensus Radar
//!
//! Watches a list of Hyperliquid wallets and raises an alert when enough
//! of them hold a position on the same side of the same perpetual.
//!
//! ## Architecture
//!
//! - `config`: Process configuration (endpoints, credentials, engine knobs)
//! - `state`: Operator-editable settings, their JSON store and the config actor
//! - `exchange`: Hyperliquid info API client and an in-memory fake
//! - `messaging`: Telegram Bot API client and in-memory fakes
//! - `engine`: Sampling, consensus detection, dedup, dispatch and the poll loop
//! - `commands`: Operator command parsing, execution and the inbound listener
//! - `feed`: Live WebSocket signal feed
//! - `utils`: Decimal helpers and display formatting

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod messaging;
pub mod state;
pub mod utils;

pub use config::AppConfig;
