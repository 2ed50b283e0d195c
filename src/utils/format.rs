//! Human-readable formatting for alert and report messages.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Wall-clock layout shared by alerts and the live feed.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a USD amount: `$1,234` at or above a thousand, `$12.34` below.
///
/// The branch is chosen after rounding to cents, so `999.996` is `$1,000`.
pub fn fmt_usd(x: Decimal) -> String {
    let cents = x.abs().round_dp(2);
    let sign = if x < Decimal::ZERO && !cents.is_zero() { "-" } else { "" };
    if cents >= dec!(1000) {
        format!("{}${}", sign, group_thousands(cents.round_dp(0)))
    } else {
        format!("{}${:.2}", sign, cents)
    }
}

/// Like [`fmt_usd`] but always carries a sign.
pub fn fmt_signed_usd(x: Decimal) -> String {
    if x >= Decimal::ZERO {
        format!("+{}", fmt_usd(x))
    } else {
        fmt_usd(x)
    }
}

fn group_thousands(whole: Decimal) -> String {
    let digits = whole.trunc().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Compact age such as `3d ago`, `2h ago`, `5m ago` or `42s ago`.
pub fn time_ago(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);
    if secs >= 86_400 {
        format!("{}d ago", secs / 86_400)
    } else if secs >= 3_600 {
        format!("{}h ago", secs / 3_600)
    } else if secs >= 60 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}s ago", secs)
    }
}

/// `2024-05-01 12:00:00`, UTC without a zone suffix.
pub fn fmt_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Serializes an optional timestamp with [`fmt_timestamp`], `null` when absent.
pub fn serialize_timestamp_option<S>(
    ts: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match ts {
        Some(ts) => serializer.serialize_some(&fmt_timestamp(*ts)),
        None => serializer.serialize_none(),
    }
}

/// `0x12345678...abcdef` style abbreviation.
pub fn short_address(addr: &str) -> String {
    if addr.len() <= 14 || !addr.is_ascii() {
        return addr.to_string();
    }
    format!("{}...{}", &addr[..8], &addr[addr.len() - 6..])
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_fmt_usd() {
        assert_eq!(fmt_usd(dec!(4200)), "$4,200");
        assert_eq!(fmt_usd(dec!(1234567.8)), "$1,234,568");
        assert_eq!(fmt_usd(dec!(99.5)), "$99.50");
        assert_eq!(fmt_usd(dec!(-2500)), "-$2,500");
    }

    #[test]
    fn test_fmt_usd_rounds_before_grouping() {
        assert_eq!(fmt_usd(dec!(999.996)), "$1,000");
        assert_eq!(fmt_usd(dec!(-999.997)), "-$1,000");
        assert_eq!(fmt_usd(dec!(999.994)), "$999.99");
        assert_eq!(fmt_usd(dec!(-0.001)), "$0.00");
    }

    #[test]
    fn test_fmt_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 3).unwrap();
        assert_eq!(fmt_timestamp(ts), "2024-05-01 09:05:03");
    }

    #[test]
    fn test_fmt_signed_usd() {
        assert_eq!(fmt_signed_usd(dec!(200)), "+$200.00");
        assert_eq!(fmt_signed_usd(dec!(-12.3)), "-$12.30");
        assert_eq!(fmt_signed_usd(Decimal::ZERO), "+$0.00");
    }

    #[test]
    fn test_time_ago() {
        let now = Utc::now();
        assert_eq!(time_ago(now - Duration::seconds(42), now), "42s ago");
        assert_eq!(time_ago(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(time_ago(now - Duration::hours(3), now), "3h ago");
        assert_eq!(time_ago(now - Duration::days(2), now), "2d ago");
        // Clock skew never yields a negative age
        assert_eq!(time_ago(now + Duration::seconds(5), now), "0s ago");
    }

    #[test]
    fn test_short_address() {
        let addr = "0xc2a30212a8DdAc9e123944d6e29FADdCe994E5f2";
        assert_eq!(short_address(addr), "0xc2a302...94E5f2");
        assert_eq!(short_address("0xabc"), "0xabc");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&"), "&lt;b&gt;&amp;");
    }
}
