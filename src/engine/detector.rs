//! Consensus detection over one symbol's rows.

use super::types::{CandidateSignal, PositionRow, Side};
use crate::utils::decimal::{sum_present, DUST_SIZE};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Candidate signals for every side of `symbol` whose wallet count reaches
/// `threshold`, long first.
pub fn detect(
    symbol: &str,
    rows: &[PositionRow],
    threshold: u32,
    use_positions: bool,
    now: DateTime<Utc>,
) -> Vec<CandidateSignal> {
    [Side::Long, Side::Short]
        .into_iter()
        .filter_map(|side| {
            let side_rows: Vec<PositionRow> = rows
                .iter()
                .filter(|r| r.side == Some(side))
                .cloned()
                .collect();

            (side_rows.len() >= threshold as usize).then(|| CandidateSignal {
                symbol: symbol.to_string(),
                side,
                count: side_rows.len(),
                threshold,
                ts: now,
                use_positions,
                rows: side_rows,
            })
        })
        .collect()
}

/// Directional breakdown of one symbol, as shown by `/stats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideTally {
    pub long: usize,
    pub short: usize,
    /// No position, dust-sized position or failed query
    pub flat: usize,
    pub long_pnl: Decimal,
    pub short_pnl: Decimal,
}

pub fn tally(rows: &[PositionRow]) -> SideTally {
    let mut tally = SideTally::default();
    let mut long_pnl = Vec::new();
    let mut short_pnl = Vec::new();

    for row in rows {
        let meaningful = row.size.is_some_and(|s| s.abs() > DUST_SIZE);
        match row.side {
            Some(Side::Long) if meaningful => {
                tally.long += 1;
                long_pnl.push(row.unrealized_pnl);
            }
            Some(Side::Short) if meaningful => {
                tally.short += 1;
                short_pnl.push(row.unrealized_pnl);
            }
            _ => tally.flat += 1,
        }
    }

    tally.long_pnl = sum_present(long_pnl);
    tally.short_pnl = sum_present(short_pnl);
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WalletAddress;
    use rust_decimal_macros::dec;

    fn row(n: u8, size: Option<Decimal>, pnl: Option<Decimal>) -> PositionRow {
        let wallet: WalletAddress = format!("0x{}", hex::encode([n; 20])).parse().unwrap();
        PositionRow {
            size,
            side: size.and_then(Side::from_size),
            unrealized_pnl: pnl,
            ..PositionRow::absent(wallet)
        }
    }

    #[test]
    fn test_threshold_splits_sides() {
        // A and B long, C short, threshold 2
        let rows = vec![
            row(1, Some(dec!(1)), None),
            row(2, Some(dec!(2)), None),
            row(3, Some(dec!(-1)), None),
        ];
        let signals = detect("BTC", &rows, 2, true, Utc::now());

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Long);
        assert_eq!(signals[0].count, 2);
        assert_eq!(signals[0].threshold, 2);
    }

    #[test]
    fn test_both_sides_can_qualify_long_first() {
        let rows: Vec<_> = (1..=6)
            .map(|n| {
                let size = if n % 2 == 0 { dec!(-1) } else { dec!(1) };
                row(n, Some(size), None)
            })
            .collect();
        let signals = detect("ETH", &rows, 3, true, Utc::now());

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].side, Side::Long);
        assert_eq!(signals[1].side, Side::Short);
        assert!(signals[1].rows.iter().all(|r| r.side == Some(Side::Short)));
    }

    #[test]
    fn test_emits_iff_count_reaches_threshold() {
        for longs in 0..5u8 {
            let rows: Vec<_> = (0..longs).map(|n| row(n + 1, Some(dec!(1)), None)).collect();
            for threshold in 1..5u32 {
                let emitted = !detect("SOL", &rows, threshold, true, Utc::now()).is_empty();
                assert_eq!(emitted, longs as u32 >= threshold, "longs={longs} threshold={threshold}");
            }
        }
    }

    #[test]
    fn test_tally_treats_dust_as_flat() {
        let rows = vec![
            row(1, Some(dec!(1)), Some(dec!(100))),
            row(2, Some(dec!(0.5)), Some(dec!(-30))),
            row(3, Some(dec!(-2)), Some(dec!(50))),
            row(4, Some(dec!(0.00005)), Some(dec!(1))),
            row(5, None, None),
        ];
        let tally = tally(&rows);

        assert_eq!(tally.long, 2);
        assert_eq!(tally.short, 1);
        assert_eq!(tally.flat, 2);
        assert_eq!(tally.long_pnl, dec!(70));
        assert_eq!(tally.short_pnl, dec!(50));
    }
}
