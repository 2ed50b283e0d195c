//! Change detection for candidate signals.
//!
//! A signal is re-sent only when the set of wallets on its side, or one of
//! their sizes at 4 decimal places, changes. Price movement alone never
//! re-triggers an alert.

use super::types::{CandidateSignal, Side};
use crate::utils::decimal::{round_to_precision, DUST_SIZE, SIZE_DECIMALS};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// SHA-256 digest of a signal's wallet/size composition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalFingerprint(String);

impl SignalFingerprint {
    pub fn of(signal: &CandidateSignal) -> Self {
        let digest = Sha256::digest(Self::canonical(signal).as_bytes());
        Self(hex::encode(digest))
    }

    /// `SYMBOL:side:count:wallet:size,...` with pairs sorted; rows at or
    /// below the dust size are left out.
    pub fn canonical(signal: &CandidateSignal) -> String {
        let mut pairs: Vec<String> = signal
            .rows
            .iter()
            .filter_map(|row| {
                let size = row.size?.abs();
                (size > DUST_SIZE).then(|| {
                    format!(
                        "{}:{}",
                        row.wallet.to_lowercase_hex(),
                        round_to_precision(size, SIZE_DECIMALS).normalize()
                    )
                })
            })
            .collect();
        pairs.sort();

        format!(
            "{}:{}:{}:{}",
            signal.symbol,
            signal.side,
            pairs.len(),
            pairs.join(",")
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough for logs.
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

/// Classification of a candidate against the last dispatched one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    New,
    Changed,
    Unchanged,
}

impl SignalStatus {
    pub fn should_dispatch(&self) -> bool {
        !matches!(self, SignalStatus::Unchanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::New => "new",
            SignalStatus::Changed => "changed",
            SignalStatus::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running counts of classifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub new: u64,
    pub changed: u64,
    pub unchanged: u64,
}

/// Last fingerprint per `(symbol, side)`. Owned by the poll loop only.
#[derive(Debug, Default)]
pub struct SignalDeduplicator {
    last: HashMap<(String, Side), SignalFingerprint>,
    clear_on_consensus_lost: bool,
    stats: DedupStats,
}

impl SignalDeduplicator {
    pub fn new(clear_on_consensus_lost: bool) -> Self {
        Self {
            clear_on_consensus_lost,
            ..Self::default()
        }
    }

    /// Classify `signal` and remember its fingerprint.
    pub fn classify(&mut self, signal: &CandidateSignal) -> SignalStatus {
        let fingerprint = SignalFingerprint::of(signal);
        let key = (signal.symbol.clone(), signal.side);

        let status = match self.last.get(&key) {
            None => SignalStatus::New,
            Some(previous) if *previous == fingerprint => SignalStatus::Unchanged,
            Some(_) => SignalStatus::Changed,
        };

        match status {
            SignalStatus::New => self.stats.new += 1,
            SignalStatus::Changed => self.stats.changed += 1,
            SignalStatus::Unchanged => self.stats.unchanged += 1,
        }

        debug!(
            symbol = %signal.symbol,
            side = %signal.side,
            fingerprint = %fingerprint,
            %status,
            "Signal classified"
        );

        if status.should_dispatch() {
            self.last.insert(key, fingerprint);
        }
        status
    }

    /// A side of `symbol` was evaluated and did not reach the threshold.
    pub fn observe_below_threshold(&mut self, symbol: &str, side: Side) {
        if self.clear_on_consensus_lost
            && self.last.remove(&(symbol.to_string(), side)).is_some()
        {
            debug!(symbol, side = %side, "Consensus lost, fingerprint cleared");
        }
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }

    /// Number of `(symbol, side)` keys with a stored fingerprint.
    pub fn tracked(&self) -> usize {
        self.last.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::PositionRow;
    use crate::state::WalletAddress;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn wallet(n: u8) -> WalletAddress {
        format!("0x{}", hex::encode([n; 20])).parse().unwrap()
    }

    fn signal(pairs: &[(u8, Decimal)]) -> CandidateSignal {
        let rows: Vec<_> = pairs
            .iter()
            .map(|(n, size)| PositionRow {
                size: Some(*size),
                side: Side::from_size(*size),
                entry_price: Some(dec!(2000)),
                mark_price: Some(dec!(2100)),
                ..PositionRow::absent(wallet(*n))
            })
            .collect();
        CandidateSignal {
            symbol: "ETH".to_string(),
            side: Side::Long,
            count: rows.len(),
            threshold: 2,
            ts: Utc::now(),
            use_positions: true,
            rows,
        }
    }

    #[test]
    fn test_fingerprint_ignores_wallet_order() {
        let a = signal(&[(1, dec!(1.5)), (2, dec!(2))]);
        let b = signal(&[(2, dec!(2)), (1, dec!(1.5))]);
        assert_eq!(SignalFingerprint::of(&a), SignalFingerprint::of(&b));
    }

    #[test]
    fn test_fingerprint_ignores_price_and_sub_tolerance_noise() {
        let a = signal(&[(1, dec!(1.0)), (2, dec!(2.00001))]);
        let mut b = signal(&[(1, dec!(1.00)), (2, dec!(2.00004))]);
        b.rows[0].mark_price = Some(dec!(2500));
        b.rows[0].entry_price = Some(dec!(1999.5));
        assert_eq!(SignalFingerprint::of(&a), SignalFingerprint::of(&b));

        let c = signal(&[(1, dec!(1.0)), (2, dec!(2.001))]);
        assert_ne!(SignalFingerprint::of(&a), SignalFingerprint::of(&c));
    }

    #[test]
    fn test_canonical_form() {
        let s = signal(&[(2, dec!(2.5)), (1, dec!(1.00))]);
        let canonical = SignalFingerprint::canonical(&s);
        assert_eq!(
            canonical,
            format!(
                "ETH:long:2:{}:1,{}:2.5",
                wallet(1).to_lowercase_hex(),
                wallet(2).to_lowercase_hex()
            )
        );
        assert_eq!(SignalFingerprint::of(&s).as_str().len(), 64);
    }

    #[test]
    fn test_dedup_law() {
        let mut dedup = SignalDeduplicator::new(false);
        let s = signal(&[(1, dec!(1)), (2, dec!(1))]);

        assert_eq!(dedup.classify(&s), SignalStatus::New);
        assert_eq!(dedup.classify(&s), SignalStatus::Unchanged);

        let grown = signal(&[(1, dec!(1)), (2, dec!(1.5))]);
        assert_eq!(dedup.classify(&grown), SignalStatus::Changed);
        assert_eq!(dedup.classify(&grown), SignalStatus::Unchanged);

        assert_eq!(
            dedup.stats(),
            DedupStats {
                new: 1,
                changed: 1,
                unchanged: 2
            }
        );
    }

    #[test]
    fn test_sides_are_tracked_separately() {
        let mut dedup = SignalDeduplicator::new(false);
        let long = signal(&[(1, dec!(1))]);
        let mut short = signal(&[(1, dec!(1))]);
        short.side = Side::Short;

        assert_eq!(dedup.classify(&long), SignalStatus::New);
        assert_eq!(dedup.classify(&short), SignalStatus::New);
        assert_eq!(dedup.tracked(), 2);
    }

    #[test]
    fn test_consensus_lost_keeps_fingerprint_by_default() {
        let mut dedup = SignalDeduplicator::new(false);
        let s = signal(&[(1, dec!(1)), (2, dec!(1))]);
        dedup.classify(&s);

        dedup.observe_below_threshold("ETH", Side::Long);
        assert_eq!(dedup.classify(&s), SignalStatus::Unchanged);
    }

    #[test]
    fn test_consensus_lost_clears_fingerprint_when_enabled() {
        let mut dedup = SignalDeduplicator::new(true);
        let s = signal(&[(1, dec!(1)), (2, dec!(1))]);
        dedup.classify(&s);

        dedup.observe_below_threshold("ETH", Side::Long);
        assert_eq!(dedup.classify(&s), SignalStatus::New);
    }
}
