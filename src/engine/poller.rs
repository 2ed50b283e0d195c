//! The poll loop: sample, detect, dedup and dispatch once per interval.

use super::dedup::SignalDeduplicator;
use super::detector::detect;
use super::dispatcher::{AlertDispatcher, DispatchedSignal};
use super::sampler::{PositionSampler, WalletStates};
use super::types::Side;
use crate::state::{ConfigHandle, Settings, Stamping};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use rust_decimal::Decimal;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

/// What one cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Poll interval in force during the cycle
    pub interval: Duration,
    pub symbols: usize,
    pub dispatched: Vec<DispatchedSignal>,
    pub suppressed: usize,
    pub failed_symbols: usize,
}

pub struct PollLoop {
    config: ConfigHandle,
    sampler: PositionSampler,
    dispatcher: AlertDispatcher,
    dedup: SignalDeduplicator,
    reload: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
    cycle_backoff: Duration,
}

impl PollLoop {
    pub fn new(
        config: ConfigHandle,
        sampler: PositionSampler,
        dispatcher: AlertDispatcher,
        dedup: SignalDeduplicator,
        reload: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
        cycle_backoff: Duration,
    ) -> Self {
        Self {
            config,
            sampler,
            dispatcher,
            dedup,
            reload,
            shutdown,
            cycle_backoff,
        }
    }

    /// Run cycles until shutdown. Errors and panics inside a cycle are
    /// logged and followed by the backoff; they never end the loop.
    pub async fn run(mut self) {
        info!("🔄 Poll loop started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let outcome = AssertUnwindSafe(self.run_cycle(Utc::now()))
                .catch_unwind()
                .await;

            let wait = match outcome {
                Ok(Ok(report)) => report.interval,
                Ok(Err(e)) => {
                    error!("Poll cycle failed: {:#}", e);
                    self.cycle_backoff
                }
                Err(panic) => {
                    error!("Poll cycle panicked: {}", panic_message(panic.as_ref()));
                    self.cycle_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.reload.notified() => {
                    info!("Reload requested, polling now");
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let stats = self.dedup.stats();
        info!(
            new = stats.new,
            changed = stats.changed,
            unchanged = stats.unchanged,
            "Poll loop stopped"
        );
    }

    /// One pass over every configured symbol, in order.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        let settings = self
            .config
            .read()
            .await
            .context("Failed to read settings")?;

        let mut report = CycleReport {
            interval: Duration::from_secs(settings.poll_seconds),
            symbols: settings.symbols.len(),
            ..Default::default()
        };

        let wallets = settings.wallets();
        if wallets.is_empty() {
            info!("No wallets configured, skipping cycle");
            return Ok(report);
        }

        let mids = self.sampler.fetch_mids().await;
        let states = self.sampler.fetch_states(&wallets).await;

        for symbol in &settings.symbols {
            let outcome = AssertUnwindSafe(self.process_symbol(
                symbol,
                &settings,
                &states,
                &mids,
                now,
                &mut report,
            ))
            .catch_unwind()
            .await;

            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            warn!(symbol = %symbol, "Symbol processing failed: {}", failure);
            report.failed_symbols += 1;
        }

        info!(
            "📡 [SCAN] {} wallets x {} symbols | dispatched {} | suppressed {} | failed {}",
            wallets.len(),
            report.symbols,
            report.dispatched.len(),
            report.suppressed,
            report.failed_symbols
        );
        Ok(report)
    }

    async fn process_symbol(
        &mut self,
        symbol: &str,
        settings: &Settings,
        states: &WalletStates,
        mids: &HashMap<String, Decimal>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let rows = self
            .sampler
            .sample(symbol, states, mids, now, Stamping::Record)
            .await
            .context("Failed to stamp first-seen times")?;

        self.config
            .store_positions(symbol, rows.clone())
            .await
            .context("Failed to cache positions")?;

        let candidates = detect(
            symbol,
            &rows,
            settings.consensus_count,
            settings.use_positions,
            now,
        );

        for side in [Side::Long, Side::Short] {
            if !candidates.iter().any(|c| c.side == side) {
                self.dedup.observe_below_threshold(symbol, side);
            }
        }

        for candidate in candidates {
            let status = self.dedup.classify(&candidate);
            if status.should_dispatch() {
                let dispatched = self.dispatcher.dispatch(candidate, status, now).await;
                report.dispatched.push(dispatched);
            } else {
                debug!(
                    symbol,
                    side = %candidate.side,
                    count = candidate.count,
                    threshold = candidate.threshold,
                    %status,
                    "Consensus unchanged, alert suppressed"
                );
                report.suppressed += 1;
            }
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
