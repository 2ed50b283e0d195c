//! Executes operator commands and sends the replies.

use super::parser::{self, Command};
use crate::engine::report::{config_text, snapshot_summary, stats_text, status_text};
use crate::engine::{build_alert_html, Reporter};
use crate::error::{MutateError, ValidationError};
use crate::messaging::MessagingClient;
use crate::state::{normalize_symbol, ConfigHandle, Mutation, Settings};
use crate::utils::format::escape_html;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

const NO_WALLETS: &str = "❌ <b>No wallets configured</b>";
const INTERNAL_ERROR: &str = "❌ <b>Internal error</b>, please try again later";
const UNKNOWN: &str = "❌ Command not recognized. Use /help to see available commands.";

const HELP_TEXT: &str = "\
<b>🤖 AVAILABLE COMMANDS</b>
─────────────────────────────

<b>📊 QUERIES:</b>
/reload - Refresh immediately
/last - Current consensus positions
/status - System status
/config - Show configuration
/stats - Position statistics

<b>⚙️ CONFIGURATION:</b>
/add_wallet 0x... - Add wallet
/remove_wallet 0x... - Remove wallet
/add_coin BTC - Add symbol
/remove_coin BTC - Remove symbol
/set_consensus 3 - Change consensus
/set_interval 60 - Change interval

<b>📚 HELP:</b>
/commands - Detailed examples
/help - This menu";

const EXAMPLES_TEXT: &str = "\
<b>📚 COMMAND EXAMPLES</b>
─────────────────────────────

<b>🔍 QUERIES:</b>

<code>/reload</code>
Refresh positions right now

<code>/last</code>
Show current positions that reach consensus

<code>/status</code>
System status and configuration

<code>/config</code>
Full configuration

<code>/stats</code>
Statistics for every symbol

─────────────────────────────

<b>👛 WALLETS:</b>

<code>/add_wallet 0xc2a30212a8DdAc9e123944d6e29FADdCe994E5f2</code>
Start following a wallet

<code>/remove_wallet 0xc2a3</code>
Remove a wallet by full or partial address

─────────────────────────────

<b>🪙 SYMBOLS:</b>

<code>/add_coin SOL</code>
Follow SOL

<code>/remove_coin BTC</code>
Stop following BTC

─────────────────────────────

<b>⚙️ PARAMETERS:</b>

<code>/set_consensus 3</code>
Require 3 wallets on the same side

<code>/set_interval 60</code>
Check every 60 seconds

─────────────────────────────

<b>⚡ TIPS:</b>

• Partial addresses work for removal:
  <code>/remove_wallet 0xc2a3</code>

• Symbols are stored in uppercase:
  <code>/add_coin sol</code> → SOL

• Valid interval: 10-600 seconds

• Every change applies immediately";

/// Runs parsed commands against the config actor and the reporter.
pub struct CommandProcessor {
    config: ConfigHandle,
    reporter: Reporter,
    messenger: Arc<dyn MessagingClient>,
    reload: Arc<Notify>,
    reload_ack_delay: Duration,
}

impl CommandProcessor {
    pub fn new(
        config: ConfigHandle,
        reporter: Reporter,
        messenger: Arc<dyn MessagingClient>,
        reload: Arc<Notify>,
        reload_ack_delay: Duration,
    ) -> Self {
        Self {
            config,
            reporter,
            messenger,
            reload,
            reload_ack_delay,
        }
    }

    /// Parse and execute one inbound text. Plain text is ignored.
    pub async fn handle(&self, text: &str) {
        match parser::parse(text) {
            None => {}
            Some(Ok(command)) => self.execute(command).await,
            Some(Err(e)) => {
                let usage = text
                    .split_whitespace()
                    .next()
                    .and_then(|head| {
                        let name = head.trim_start_matches('/').split('@').next()?;
                        parser::find(&name.to_ascii_lowercase())
                    })
                    .map(|spec| spec.usage)
                    .unwrap_or("/help");
                self.reply(&rejection(&e, usage)).await;
            }
        }
    }

    pub async fn execute(&self, command: Command) {
        info!("Executing command: {:?}", command);
        let usage = parser::usage(&command);

        match command {
            Command::AddWallet(wallet) => {
                let added = wallet.clone();
                let result = self.config.mutate(move |s| s.add_wallet(wallet)).await;
                self.after_mutation(result, usage, |m| {
                    info!("Wallet added: {}", added);
                    format!(
                        "✅ <b>Wallet added:</b>\n<code>{}</code>\n\n📊 Total wallets: {}",
                        added,
                        m.after.wallet_count()
                    )
                })
                .await;
            }
            Command::RemoveWallet(prefix) => {
                let result = self
                    .config
                    .mutate(move |s| s.remove_wallet(&prefix).map(|_| ()))
                    .await;
                self.after_mutation(result, usage, |m| {
                    let remaining = m.after.wallets();
                    let removed = m
                        .before
                        .wallets()
                        .into_iter()
                        .find(|w| !remaining.contains(w))
                        .map(|w| w.to_string())
                        .unwrap_or_default();
                    info!("Wallet removed: {}", removed);
                    format!(
                        "✅ <b>Wallet removed:</b>\n<code>{}</code>\n\n📊 Total wallets: {}",
                        removed,
                        remaining.len()
                    )
                })
                .await;
            }
            Command::AddCoin(raw) => {
                let symbol = normalize_symbol(&raw);
                let result = self
                    .config
                    .mutate(move |s| s.add_symbol(&raw).map(|_| ()))
                    .await;
                self.after_mutation(result, usage, |m| {
                    info!("Symbol added: {}", symbol);
                    format!(
                        "✅ <b>Symbol added:</b> {}\n\n📊 Symbols: {}",
                        escape_html(&symbol),
                        escape_html(&m.after.symbols.join(", "))
                    )
                })
                .await;
            }
            Command::RemoveCoin(raw) => {
                let symbol = normalize_symbol(&raw);
                let result = self
                    .config
                    .mutate(move |s| s.remove_symbol(&raw).map(|_| ()))
                    .await;
                self.after_mutation(result, usage, |m| {
                    info!("Symbol removed: {}", symbol);
                    format!(
                        "✅ <b>Symbol removed:</b> {}\n\n📊 Symbols: {}",
                        escape_html(&symbol),
                        escape_html(&m.after.symbols.join(", "))
                    )
                })
                .await;
            }
            Command::SetConsensus(value) => {
                let result = self.config.mutate(move |s| s.set_consensus(value)).await;
                self.after_mutation(result, usage, |m| {
                    info!(
                        "Consensus changed: {} -> {}",
                        m.before.consensus_count, m.after.consensus_count
                    );
                    format!(
                        "✅ <b>Consensus updated:</b>\n{} → {}\n\n<i>{} wallets on the same side are now required</i>",
                        m.before.consensus_count, m.after.consensus_count, m.after.consensus_count
                    )
                })
                .await;
            }
            Command::SetInterval(value) => {
                let result = self.config.mutate(move |s| s.set_poll_seconds(value)).await;
                self.after_mutation(result, usage, |m| {
                    info!(
                        "Interval changed: {}s -> {}s",
                        m.before.poll_seconds, m.after.poll_seconds
                    );
                    format!(
                        "✅ <b>Interval updated:</b>\n{}s → {}s\n\n<i>Positions will be checked every {} seconds</i>",
                        m.before.poll_seconds, m.after.poll_seconds, m.after.poll_seconds
                    )
                })
                .await;
            }
            Command::Reload => self.reload().await,
            Command::Last => self.last().await,
            Command::Stats => self.stats().await,
            Command::Status => {
                let Some(settings) = self.settings().await else {
                    return;
                };
                let tracked = self.config.tracked_positions().await.unwrap_or_default();
                self.reply(&status_text(&settings, tracked)).await;
            }
            Command::Config => {
                if let Some(settings) = self.settings().await {
                    self.reply(&config_text(&settings)).await;
                }
            }
            Command::Help => self.reply(HELP_TEXT).await,
            Command::Examples => self.reply(EXAMPLES_TEXT).await,
            Command::Unknown(name) => {
                info!("Unknown command: /{}", name);
                self.reply(UNKNOWN).await;
            }
        }
    }

    async fn reload(&self) {
        self.reply("🔄 <b>Refreshing positions...</b>\n<i>This takes a few seconds</i>")
            .await;
        self.reload.notify_one();
        tokio::time::sleep(self.reload_ack_delay).await;

        if let Some(settings) = self.settings().await {
            self.reply(&format!(
                "✅ <b>Refresh complete</b>\n📊 {} wallets queried",
                settings.wallet_count()
            ))
            .await;
        }
    }

    async fn last(&self) {
        self.reply("🔄 <b>Checking current positions...</b>").await;

        let Some(settings) = self.settings().await else {
            return;
        };
        if settings.wallet_count() == 0 {
            self.reply(NO_WALLETS).await;
            return;
        }

        let now = Utc::now();
        let signals = match self.reporter.consensus_snapshot(&settings, now).await {
            Ok(signals) => signals,
            Err(e) => {
                error!("Snapshot failed: {}", e);
                self.reply(INTERNAL_ERROR).await;
                return;
            }
        };

        for signal in &signals {
            self.reply(&build_alert_html(signal, now)).await;
        }
        self.reply(&snapshot_summary(!signals.is_empty(), settings.consensus_count))
            .await;
        info!("/last executed, consensus found: {}", !signals.is_empty());
    }

    async fn stats(&self) {
        self.reply("📊 <b>Building statistics...</b>").await;

        let Some(settings) = self.settings().await else {
            return;
        };
        if settings.wallet_count() == 0 {
            self.reply(NO_WALLETS).await;
            return;
        }
        let tallies = self.reporter.tallies(&settings).await;
        self.reply(&stats_text(&tallies)).await;
    }

    async fn after_mutation<F>(
        &self,
        result: Result<Mutation, MutateError>,
        usage: &str,
        confirm: F,
    ) where
        F: FnOnce(&Mutation) -> String,
    {
        match result {
            Ok(mutation) => self.reply(&confirm(&mutation)).await,
            Err(MutateError::Invalid(e)) => {
                info!("Command rejected: {}", e);
                self.reply(&rejection(&e, usage)).await;
            }
            Err(MutateError::Actor(e)) => {
                error!("Settings mutation failed: {}", e);
                self.reply(INTERNAL_ERROR).await;
            }
        }
    }

    async fn settings(&self) -> Option<Settings> {
        match self.config.read().await {
            Ok(settings) => Some(settings),
            Err(e) => {
                error!("Failed to read settings: {}", e);
                self.reply(INTERNAL_ERROR).await;
                None
            }
        }
    }

    async fn reply(&self, html: &str) {
        if let Err(e) = self.messenger.send_message(html).await {
            warn!("Failed to send reply: {}", e);
        }
    }
}

/// Operator-facing text for a rejected command.
fn rejection(err: &ValidationError, usage: &str) -> String {
    match err {
        ValidationError::MissingArgument { usage } => format!(
            "❌ <b>Error:</b> missing argument\n\n<b>Usage:</b> {}",
            escape_html(usage)
        ),
        ValidationError::InvalidWallet(raw) => format!(
            "❌ <b>Invalid wallet:</b> {}\n\n<i>Expected 0x followed by 40 hex characters</i>",
            escape_html(raw)
        ),
        ValidationError::DuplicateWallet(w) => {
            format!("⚠️ <b>Wallet already exists:</b>\n<code>{}</code>", escape_html(w))
        }
        ValidationError::WalletNotFound(w) => {
            format!("❌ <b>Wallet not found:</b>\n<code>{}</code>", escape_html(w))
        }
        ValidationError::DuplicateSymbol(s) => {
            format!("⚠️ <b>Symbol already exists:</b> {}", escape_html(s))
        }
        ValidationError::SymbolNotFound(s) => {
            format!("❌ <b>Symbol not found:</b> {}", escape_html(s))
        }
        ValidationError::NotANumber(_) | ValidationError::OutOfRange { .. } => format!(
            "❌ <b>Error:</b> invalid value\n\n<b>Usage:</b> {}\n<i>({})</i>",
            escape_html(usage),
            escape_html(&err.to_string())
        ),
    }
}
