//! Operator-editable watch list and engine thresholds.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use tracing::warn;

pub const MIN_CONSENSUS: u32 = 1;
pub const MIN_POLL_SECONDS: u64 = 10;
pub const MAX_POLL_SECONDS: u64 = 600;

/// A `0x` + 40 hex character account address.
///
/// Keeps the operator's spelling for display; equality and hashing use the
/// decoded 20 bytes, so checksum casing never creates duplicates.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress {
    text: String,
    bytes: [u8; 20],
}

impl WalletAddress {
    /// Address as the operator entered it.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Canonical lowercase form.
    pub fn to_lowercase_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    /// Case-insensitive full or prefix match.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim().to_ascii_lowercase();
        !prefix.is_empty() && self.text.to_ascii_lowercase().starts_with(&prefix)
    }
}

impl FromStr for WalletAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let digits = text
            .strip_prefix("0x")
            .filter(|d| d.len() == 40)
            .ok_or_else(|| ValidationError::InvalidWallet(text.to_string()))?;

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| ValidationError::InvalidWallet(text.to_string()))?;

        Ok(Self {
            text: text.to_string(),
            bytes,
        })
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.text
    }
}

impl PartialEq for WalletAddress {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for WalletAddress {}

impl Hash for WalletAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl PartialOrd for WalletAddress {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WalletAddress {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletAddress({})", self.text)
    }
}

/// The `config` object of the persisted state document.
///
/// Wallets are kept as raw strings here so one bad entry in the file does
/// not reject the whole document; [`Settings::wallets`] only yields the
/// valid ones after [`Settings::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    wallets: Vec<String>,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    #[serde(default = "default_min_notional")]
    pub min_nocional_usd: f64,
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    #[serde(default = "default_consensus_count")]
    pub consensus_count: u32,
    #[serde(default = "default_use_positions")]
    pub use_positions: bool,
    /// Keys this version does not know about, written back untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_symbols() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string()]
}

fn default_window_minutes() -> u32 {
    5
}

fn default_min_notional() -> f64 {
    10_000.0
}

fn default_poll_seconds() -> u64 {
    12
}

fn default_cooldown_minutes() -> u32 {
    10
}

fn default_consensus_count() -> u32 {
    1
}

fn default_use_positions() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wallets: Vec::new(),
            symbols: default_symbols(),
            window_minutes: default_window_minutes(),
            min_nocional_usd: default_min_notional(),
            poll_seconds: default_poll_seconds(),
            cooldown_minutes: default_cooldown_minutes(),
            consensus_count: default_consensus_count(),
            use_positions: default_use_positions(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Settings {
    /// Tracked wallets in configured order.
    pub fn wallets(&self) -> Vec<WalletAddress> {
        self.wallets.iter().filter_map(|w| w.parse().ok()).collect()
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Bring a freshly loaded document back within invariants: drop invalid
    /// and duplicate wallets, uppercase and dedup symbols, clamp numbers.
    pub fn normalize(&mut self) {
        let mut seen = Vec::<WalletAddress>::new();
        self.wallets.retain(|raw| match raw.parse::<WalletAddress>() {
            Ok(addr) if seen.contains(&addr) => {
                warn!(wallet = %raw, "Dropping duplicate wallet from state file");
                false
            }
            Ok(addr) => {
                seen.push(addr);
                true
            }
            Err(_) => {
                warn!(wallet = %raw, "Dropping invalid wallet from state file");
                false
            }
        });

        let mut symbols: Vec<String> = Vec::with_capacity(self.symbols.len());
        for symbol in self.symbols.drain(..) {
            let symbol = normalize_symbol(&symbol);
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        self.symbols = symbols;

        if self.consensus_count < MIN_CONSENSUS {
            warn!(
                consensus_count = self.consensus_count,
                "Consensus threshold below minimum, using {}", MIN_CONSENSUS
            );
            self.consensus_count = MIN_CONSENSUS;
        }

        let clamped = self.poll_seconds.clamp(MIN_POLL_SECONDS, MAX_POLL_SECONDS);
        if clamped != self.poll_seconds {
            warn!(
                poll_seconds = self.poll_seconds,
                "Poll interval out of range, using {}s", clamped
            );
            self.poll_seconds = clamped;
        }
    }

    /// Append a wallet; rejects duplicates (case-insensitive).
    pub fn add_wallet(&mut self, wallet: WalletAddress) -> Result<(), ValidationError> {
        if self.wallets().contains(&wallet) {
            return Err(ValidationError::DuplicateWallet(wallet.to_string()));
        }
        self.wallets.push(wallet.into());
        Ok(())
    }

    /// Remove the first wallet equal to, or starting with, `prefix`.
    pub fn remove_wallet(&mut self, prefix: &str) -> Result<WalletAddress, ValidationError> {
        let position = self
            .wallets
            .iter()
            .position(|raw| {
                raw.parse::<WalletAddress>()
                    .map(|w| w.matches_prefix(prefix))
                    .unwrap_or(false)
            })
            .ok_or_else(|| ValidationError::WalletNotFound(prefix.trim().to_string()))?;
        let removed = self.wallets.remove(position);
        removed.parse()
    }

    pub fn add_symbol(&mut self, symbol: &str) -> Result<String, ValidationError> {
        let symbol = normalize_symbol(symbol);
        if self.symbols.contains(&symbol) {
            return Err(ValidationError::DuplicateSymbol(symbol));
        }
        self.symbols.push(symbol.clone());
        Ok(symbol)
    }

    pub fn remove_symbol(&mut self, symbol: &str) -> Result<String, ValidationError> {
        let symbol = normalize_symbol(symbol);
        let position = self
            .symbols
            .iter()
            .position(|s| *s == symbol)
            .ok_or_else(|| ValidationError::SymbolNotFound(symbol.clone()))?;
        Ok(self.symbols.remove(position))
    }

    pub fn set_consensus(&mut self, value: i64) -> Result<(), ValidationError> {
        if value < MIN_CONSENSUS as i64 || value > u32::MAX as i64 {
            return Err(ValidationError::OutOfRange {
                name: "consensus",
                value,
                min: MIN_CONSENSUS as i64,
                max: u32::MAX as i64,
            });
        }
        self.consensus_count = value as u32;
        Ok(())
    }

    pub fn set_poll_seconds(&mut self, value: i64) -> Result<(), ValidationError> {
        if value < MIN_POLL_SECONDS as i64 || value > MAX_POLL_SECONDS as i64 {
            return Err(ValidationError::OutOfRange {
                name: "poll interval",
                value,
                min: MIN_POLL_SECONDS as i64,
                max: MAX_POLL_SECONDS as i64,
            });
        }
        self.poll_seconds = value as u64;
        Ok(())
    }
}

/// Symbols are compared in uppercase.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
