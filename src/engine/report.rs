//! On-demand reports for operator commands and the CLI.
//!
//! Reports run the same sampler and detector as the poll loop but never
//! dispatch alerts and never create first-seen entries.

use super::detector::{detect, tally, SideTally};
use super::dispatcher::trend_marker;
use super::sampler::{build_rows, PositionSampler};
use super::types::CandidateSignal;
use crate::error::ActorError;
use crate::state::{Settings, Stamping};
use crate::utils::format::{escape_html, fmt_signed_usd, short_address};
use chrono::{DateTime, Utc};
use std::fmt::Write;

const RULE: &str = "─────────────────────────────";

/// Builds reports from live exchange data.
#[derive(Clone)]
pub struct Reporter {
    sampler: PositionSampler,
}

impl Reporter {
    pub fn new(sampler: PositionSampler) -> Self {
        Self { sampler }
    }

    /// Every side currently at or above the threshold, symbols in order.
    pub async fn consensus_snapshot(
        &self,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateSignal>, ActorError> {
        let wallets = settings.wallets();
        if wallets.is_empty() {
            return Ok(Vec::new());
        }

        let mids = self.sampler.fetch_mids().await;
        let states = self.sampler.fetch_states(&wallets).await;

        let mut signals = Vec::new();
        for symbol in &settings.symbols {
            let rows = self
                .sampler
                .sample(symbol, &states, &mids, now, Stamping::Lookup)
                .await?;
            signals.extend(detect(
                symbol,
                &rows,
                settings.consensus_count,
                settings.use_positions,
                now,
            ));
        }
        Ok(signals)
    }

    /// Long/short/flat breakdown per configured symbol.
    pub async fn tallies(&self, settings: &Settings) -> Vec<(String, SideTally)> {
        let wallets = settings.wallets();
        if wallets.is_empty() {
            return Vec::new();
        }

        let mids = self.sampler.fetch_mids().await;
        let states = self.sampler.fetch_states(&wallets).await;

        settings
            .symbols
            .iter()
            .map(|symbol| (symbol.clone(), tally(&build_rows(symbol, &states, &mids))))
            .collect()
    }
}

pub fn stats_text(tallies: &[(String, SideTally)]) -> String {
    let mut out = String::from("📊 <b>POSITION STATS</b>\n");
    let _ = writeln!(out, "{RULE}");

    for (symbol, t) in tallies {
        let _ = writeln!(out, "\n<b>━━━ {} ━━━</b>", escape_html(symbol));
        let _ = writeln!(
            out,
            "🟢 LONG: {} | 🔴 SHORT: {} | ⚪ Flat: {}",
            t.long, t.short, t.flat
        );
        if t.long > 0 {
            let _ = writeln!(
                out,
                "🟢 <b>Total LONG PnL:</b> {} {}",
                trend_marker(t.long_pnl),
                fmt_signed_usd(t.long_pnl)
            );
        }
        if t.short > 0 {
            let _ = writeln!(
                out,
                "🔴 <b>Total SHORT PnL:</b> {} {}",
                trend_marker(t.short_pnl),
                fmt_signed_usd(t.short_pnl)
            );
        }
    }

    out.trim_end().to_string()
}

pub fn status_text(settings: &Settings, tracked_positions: usize) -> String {
    let mut out = String::from("📊 <b>SYSTEM STATUS</b>\n");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "<b>Tracked wallets:</b> {}", settings.wallet_count());
    let _ = writeln!(out, "<b>Symbols:</b> {}", escape_html(&settings.symbols.join(", ")));
    let _ = writeln!(out, "<b>Required consensus:</b> {}", settings.consensus_count);
    let _ = writeln!(out, "<b>Polling:</b> {}s", settings.poll_seconds);
    let _ = writeln!(out, "<b>Open positions seen:</b> {}", tracked_positions);
    let _ = writeln!(out, "<b>Status:</b> ✅ Active");
    let _ = write!(out, "\n<i>Use /last to see current positions</i>");
    out
}

pub fn config_text(settings: &Settings) -> String {
    let wallets = settings.wallets();
    let mut out = String::from("⚙️ <b>CONFIGURATION</b>\n");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "<b>Wallets ({}):</b>", wallets.len());
    for (idx, wallet) in wallets.iter().enumerate() {
        let _ = writeln!(out, "{}. <code>{}</code>", idx + 1, short_address(wallet.as_str()));
    }
    let _ = writeln!(out, "\n<b>Symbols:</b> {}", escape_html(&settings.symbols.join(", ")));
    let _ = writeln!(out, "<b>Consensus:</b> {}", settings.consensus_count);
    let _ = writeln!(out, "<b>Interval:</b> {}s", settings.poll_seconds);
    let _ = write!(
        out,
        "<b>Use positions:</b> {}",
        if settings.use_positions { "✅" } else { "❌" }
    );
    out
}

/// Closing line of `/last`.
pub fn snapshot_summary(found: bool, threshold: u32) -> String {
    if found {
        "✅ <b>Positions updated</b>".to_string()
    } else {
        format!(
            "ℹ️ <b>No consensus reached</b>\n\n📊 {} wallets on the same side required",
            threshold
        )
    }
}
