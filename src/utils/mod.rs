//! Shared utilities: decimal arithmetic and message formatting.

pub mod decimal;
pub mod format;
