//! Decimal arithmetic utilities for position valuation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Sizes at or below this magnitude are treated as no position.
pub const DUST_SIZE: Decimal = dec!(0.0001);

/// Decimal places kept when comparing position sizes.
pub const SIZE_DECIMALS: u32 = 4;

/// Round a decimal to a specific number of decimal places.
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp(decimals)
}

/// Signed percentage move from `from` to `to`, `None` when `from` is not positive.
pub fn percentage_change(from: Decimal, to: Decimal) -> Option<Decimal> {
    if from <= Decimal::ZERO {
        return None;
    }
    to.checked_sub(from)?
        .checked_div(from)?
        .checked_mul(dec!(100))
}

/// Absolute distance from `reference` to `target` as a percentage of `reference`.
pub fn percentage_distance(target: Decimal, reference: Decimal) -> Option<Decimal> {
    if reference <= Decimal::ZERO {
        return None;
    }
    target
        .checked_sub(reference)?
        .checked_div(reference)?
        .abs()
        .checked_mul(dec!(100))
}

/// Notional value `|size| * price`, `None` on overflow.
pub fn notional(size: Decimal, price: Decimal) -> Option<Decimal> {
    size.abs().checked_mul(price)
}

/// Unrealized PnL `(mark - entry) * size` for a signed size, `None` on overflow.
pub fn unrealized_pnl(size: Decimal, entry: Decimal, mark: Decimal) -> Option<Decimal> {
    mark.checked_sub(entry)?.checked_mul(size)
}

/// Sum the values that are present; absent values contribute nothing.
/// Saturates at the representable range.
pub fn sum_present<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Option<Decimal>>,
{
    values
        .into_iter()
        .flatten()
        .fold(Decimal::ZERO, |acc, v| acc.saturating_add(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_precision() {
        assert_eq!(round_to_precision(dec!(1.00004), SIZE_DECIMALS), dec!(1.0000));
        assert_eq!(round_to_precision(dec!(1.23456), SIZE_DECIMALS), dec!(1.2346));
    }

    #[test]
    fn test_percentage_change() {
        assert_eq!(percentage_change(dec!(2000), dec!(2100)), Some(dec!(5)));
        assert_eq!(percentage_change(dec!(2000), dec!(1900)), Some(dec!(-5)));
        assert_eq!(percentage_change(Decimal::ZERO, dec!(1)), None);
    }

    #[test]
    fn test_percentage_distance() {
        assert_eq!(percentage_distance(dec!(1800), dec!(2000)), Some(dec!(10)));
        assert_eq!(percentage_distance(dec!(2200), dec!(2000)), Some(dec!(10)));
        assert_eq!(percentage_distance(dec!(1), Decimal::ZERO), None);
    }

    #[test]
    fn test_pnl_sign_follows_side() {
        // Long gains when price rises, short loses
        assert_eq!(unrealized_pnl(dec!(1), dec!(2000), dec!(2100)), Some(dec!(100)));
        assert_eq!(unrealized_pnl(dec!(-1), dec!(2000), dec!(2100)), Some(dec!(-100)));
        assert_eq!(notional(dec!(-2), dec!(2100)), Some(dec!(4200)));
    }

    #[test]
    fn test_sum_present_skips_absent() {
        let total = sum_present(vec![Some(dec!(1.5)), None, Some(dec!(2))]);
        assert_eq!(total, dec!(3.5));
        assert_eq!(sum_present(Vec::new()), Decimal::ZERO);
        assert_eq!(
            sum_present(vec![Some(Decimal::MAX), Some(Decimal::MAX)]),
            Decimal::MAX
        );
    }

    #[test]
    fn test_overflow_yields_absent_value() {
        assert_eq!(notional(dec!(1000), Decimal::MAX), None);
        assert_eq!(unrealized_pnl(dec!(2), Decimal::MIN, Decimal::MAX), None);
        assert_eq!(unrealized_pnl(dec!(1000), Decimal::ZERO, Decimal::MAX), None);
        assert_eq!(percentage_change(dec!(0.0000001), Decimal::MAX), None);
        assert_eq!(percentage_distance(Decimal::MIN, Decimal::MAX), None);
    }
}
