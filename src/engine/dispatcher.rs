//! Sends dispatched signals to the live feed and the messaging channel.

use super::dedup::SignalStatus;
use super::types::{CandidateSignal, PositionRow, Side};
use crate::feed::SubscriberFeed;
use crate::messaging::MessagingClient;
use crate::utils::decimal::{percentage_change, percentage_distance};
use crate::utils::format::{
    escape_html, fmt_signed_usd, fmt_timestamp, fmt_usd, short_address, time_ago,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, warn};

const TRADER_URL: &str = "https://app.hyperdash.xyz/trader/";
const RULE: &str = "─────────────────────────────";

/// Liquidation closer than this percentage of mark gets a warning marker.
const LIQUIDATION_WARNING_PCT: Decimal = dec!(20);

/// Message written to the live feed.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum FeedMessage<'a> {
    Signal(SignalPayload<'a>),
}

#[derive(Debug, Serialize)]
pub struct SignalPayload<'a> {
    pub coin: &'a str,
    pub side: Side,
    pub count: usize,
    pub threshold: u32,
    pub ts: String,
    pub use_positions: bool,
    pub wallets: Vec<&'a str>,
    pub wallet_rows: &'a [PositionRow],
}

impl<'a> FeedMessage<'a> {
    pub fn signal(signal: &'a CandidateSignal) -> Self {
        FeedMessage::Signal(SignalPayload {
            coin: &signal.symbol,
            side: signal.side,
            count: signal.count,
            threshold: signal.threshold,
            ts: fmt_timestamp(signal.ts),
            use_positions: signal.use_positions,
            wallets: signal.wallets().into_iter().map(|w| w.as_str()).collect(),
            wallet_rows: &signal.rows,
        })
    }
}

/// A signal that went out, with what each sink did with it.
#[derive(Debug, Clone)]
pub struct DispatchedSignal {
    pub signal: CandidateSignal,
    pub status: SignalStatus,
    /// Feed subscribers that accepted the message
    pub feed_delivered: usize,
    pub messaging_ok: bool,
}

/// Fans a signal out to both sinks; neither sink's failure affects the other.
#[derive(Clone)]
pub struct AlertDispatcher {
    feed: SubscriberFeed,
    messenger: Arc<dyn MessagingClient>,
}

impl AlertDispatcher {
    pub fn new(feed: SubscriberFeed, messenger: Arc<dyn MessagingClient>) -> Self {
        Self { feed, messenger }
    }

    pub async fn dispatch(
        &self,
        signal: CandidateSignal,
        status: SignalStatus,
        now: DateTime<Utc>,
    ) -> DispatchedSignal {
        let feed_delivered = match serde_json::to_string(&FeedMessage::signal(&signal)) {
            Ok(json) => self.feed.publish(&json),
            Err(e) => {
                warn!(symbol = %signal.symbol, "Failed to serialize feed message: {}", e);
                0
            }
        };

        let html = build_alert_html(&signal, now);
        let messaging_ok = match self.messenger.send_message(&html).await {
            Ok(()) => true,
            Err(e) => {
                warn!(symbol = %signal.symbol, side = %signal.side, "Failed to send alert: {}", e);
                false
            }
        };

        info!(
            symbol = %signal.symbol,
            side = %signal.side,
            count = signal.count,
            threshold = signal.threshold,
            %status,
            feed_delivered,
            messaging_ok,
            "🚨 Consensus alert dispatched"
        );

        DispatchedSignal {
            signal,
            status,
            feed_delivered,
            messaging_ok,
        }
    }
}

/// Rich-text alert for one signal.
pub fn build_alert_html(signal: &CandidateSignal, now: DateTime<Utc>) -> String {
    let marker = signal.side.marker();
    let mut out = String::new();

    let _ = writeln!(out, "{marker} <b>CONSENSUS REACHED</b> {marker}");
    let _ = writeln!(
        out,
        "📊 <b>{} {}</b> → {}/{} wallets",
        escape_html(&signal.symbol),
        signal.side.label(),
        signal.count,
        signal.threshold
    );
    let _ = writeln!(out, "🕒 {}", fmt_timestamp(signal.ts));
    let _ = writeln!(out, "{RULE}");

    let total_value = signal.total_value();
    let total_pnl = signal.total_pnl();
    if total_value > Decimal::ZERO || !total_pnl.is_zero() {
        let _ = writeln!(out, "💰 <b>Total position:</b> {}", fmt_usd(total_value));
        if !total_pnl.is_zero() {
            let _ = writeln!(
                out,
                "{} <b>Total PnL:</b> {}",
                trend_marker(total_pnl),
                fmt_signed_usd(total_pnl)
            );
        }
        let _ = writeln!(out, "{RULE}");
    }

    for (idx, row) in signal.rows.iter().enumerate() {
        write_wallet(&mut out, idx + 1, row, now);
    }

    out.trim_end().to_string()
}

fn write_wallet(out: &mut String, idx: usize, row: &PositionRow, now: DateTime<Utc>) {
    let addr = row.wallet.as_str();
    let _ = writeln!(
        out,
        "\n<b>#{idx} Wallet</b> → <a href='{TRADER_URL}{addr}'>{}</a>",
        short_address(addr)
    );

    if let Some(opened) = row.first_seen {
        let _ = writeln!(out, "  ⏱️ Opened: <code>{}</code>", time_ago(opened, now));
    }
    if let Some(size) = row.size {
        let _ = writeln!(out, "  📊 Size: <code>{:.4}</code>", size.abs().round_dp(4));
    }
    if let Some(entry) = row.entry_price {
        let _ = writeln!(out, "  💰 Entry: <code>${:.2}</code>", entry.round_dp(2));
    }
    if let Some(mark) = row.mark_price {
        let _ = writeln!(out, "  📈 Mark: <code>${:.2}</code>", mark.round_dp(2));
        if let Some(change) = row.entry_price.and_then(|e| percentage_change(e, mark)) {
            let marker = if change >= Decimal::ZERO { "🟢" } else { "🔴" };
            let _ = writeln!(out, "  {marker} Change: <code>{}%</code>", signed_pct(change));
        }
    }
    if let Some(liq) = row.liquidation_price {
        match row.mark_price.and_then(|m| percentage_distance(liq, m)) {
            Some(distance) => {
                let marker = if distance < LIQUIDATION_WARNING_PCT { "⚠️" } else { "✅" };
                let _ = writeln!(
                    out,
                    "  {marker} Liquidation: <code>${:.2}</code> ({:.1}%)",
                    liq.round_dp(2),
                    distance.round_dp(1)
                );
            }
            None => {
                let _ = writeln!(out, "  ⚠️ Liquidation: <code>${:.2}</code>", liq.round_dp(2));
            }
        }
    }
    if let Some(value) = row.notional {
        let _ = writeln!(out, "  💵 Value: <code>{}</code>", fmt_usd(value));
    }
    if let Some(pnl) = row.unrealized_pnl {
        let _ = writeln!(out, "  {} PnL: <b>{}</b>", trend_marker(pnl), fmt_signed_usd(pnl));
    }
}

pub(crate) fn trend_marker(x: Decimal) -> &'static str {
    if x >= Decimal::ZERO {
        "📈"
    } else {
        "📉"
    }
}

fn signed_pct(x: Decimal) -> String {
    let sign = if x >= Decimal::ZERO { "+" } else { "" };
    format!("{sign}{:.2}", x.round_dp(2))
}
