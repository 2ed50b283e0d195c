//! Consensus Radar - Main Entry Point

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use consensus_radar::commands::{CommandListener, CommandProcessor};
use consensus_radar::config::AppConfig;
use consensus_radar::engine::{
    AlertDispatcher, FeedMessage, PollLoop, PositionSampler, Reporter, SignalDeduplicator,
};
use consensus_radar::exchange::{ExchangeClient, HyperliquidClient};
use consensus_radar::feed::{bind_feed, run_feed_server, SubscriberFeed};
use consensus_radar::messaging::{MessagingClient, NoopMessenger, TelegramClient};
use consensus_radar::state::{
    load_or_default, spawn_config_actor, ConfigStore, JsonFileStore, MemoryStore,
};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const MAILBOX_CAPACITY: usize = 64;

/// Consensus Radar CLI
#[derive(Parser)]
#[command(name = "consensus-radar")]
#[command(version, about = "Wallet consensus alerts for Hyperliquid perpetuals")]
struct Cli {
    /// Keep configuration changes in memory; never write the state file
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute one consensus report and print it as JSON lines
    Snapshot,

    /// Print the persisted configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = AppConfig::load()?;

    let file_store = JsonFileStore::new(&config.engine.state_path);
    let store: Arc<dyn ConfigStore> = if cli.dry_run {
        info!("📝 DRY RUN - configuration changes stay in memory");
        Arc::new(MemoryStore::new(file_store.load().ok().flatten()))
    } else {
        Arc::new(file_store)
    };

    match cli.command {
        Some(Commands::Snapshot) => run_snapshot(&config, store).await,
        Some(Commands::ShowConfig) => show_config(store.as_ref()),
        None => run_engine(config, store).await,
    }
}

async fn run_engine(config: AppConfig, store: Arc<dyn ConfigStore>) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║              Consensus Radar v{}                        ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    let doc = load_or_default(store.as_ref());
    log_settings(&config, &doc.config);

    let (config_handle, actor_task) = spawn_config_actor(
        doc,
        store,
        config.engine.position_eviction_cycles,
        MAILBOX_CAPACITY,
    );

    let exchange: Arc<dyn ExchangeClient> = Arc::new(HyperliquidClient::new(&config.exchange)?);

    let messenger: Arc<dyn MessagingClient> = if config.telegram.is_enabled() {
        Arc::new(TelegramClient::new(&config.telegram)?)
    } else {
        warn!("⚠️  Telegram not configured: alerts go to the feed only, commands are disabled");
        Arc::new(NoopMessenger)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reload = Arc::new(Notify::new());
    let feed = SubscriberFeed::new(config.feed.subscriber_buffer);

    let mut tasks = Vec::new();

    if let Some(addr) = &config.feed.listen_addr {
        let listener = bind_feed(addr).await?;
        tasks.push(tokio::spawn(run_feed_server(
            listener,
            feed.clone(),
            shutdown_rx.clone(),
        )));
    }

    let sampler = PositionSampler::new(
        exchange,
        config_handle.clone(),
        config.exchange.max_concurrent_requests,
    );

    if config.telegram.is_enabled() {
        let processor = CommandProcessor::new(
            config_handle.clone(),
            Reporter::new(sampler.clone()),
            messenger.clone(),
            reload.clone(),
            config.engine.reload_ack_delay(),
        );
        let listener = CommandListener::new(
            messenger.clone(),
            processor,
            config.telegram.chat_id.clone(),
            config.telegram.long_poll_timeout_secs,
            config.engine.listener_backoff(),
            shutdown_rx.clone(),
        );
        tasks.push(tokio::spawn(listener.run()));
    }

    let poll_loop = PollLoop::new(
        config_handle,
        sampler,
        AlertDispatcher::new(feed, messenger),
        SignalDeduplicator::new(config.engine.clear_fingerprint_on_consensus_lost),
        reload,
        shutdown_rx,
        config.engine.cycle_backoff(),
    );
    tasks.push(tokio::spawn(poll_loop.run()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("🛑 Shutdown signal received");
    shutdown_tx.send_replace(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }

    // Every handle is gone once the tasks finish, so the actor drains and exits.
    if let Err(e) = actor_task.await {
        error!("Config actor ended abnormally: {}", e);
    }

    info!("👋 Consensus Radar shutdown complete");
    Ok(())
}

/// One read-only consensus pass over the persisted configuration.
async fn run_snapshot(config: &AppConfig, store: Arc<dyn ConfigStore>) -> Result<()> {
    let doc = load_or_default(store.as_ref());
    let settings = doc.config.clone();
    let (config_handle, _actor) = spawn_config_actor(doc, store, 0, MAILBOX_CAPACITY);

    let exchange: Arc<dyn ExchangeClient> = Arc::new(HyperliquidClient::new(&config.exchange)?);
    let sampler = PositionSampler::new(
        exchange,
        config_handle,
        config.exchange.max_concurrent_requests,
    );

    let signals = Reporter::new(sampler)
        .consensus_snapshot(&settings, Utc::now())
        .await?;

    info!(
        "Snapshot: {} wallets, {} symbols, {} sides at consensus",
        settings.wallet_count(),
        settings.symbols.len(),
        signals.len()
    );

    for signal in &signals {
        let message = FeedMessage::signal(signal);
        println!("{}", serde_json::to_string(&message)?);
    }
    Ok(())
}

fn show_config(store: &dyn ConfigStore) -> Result<()> {
    let doc = load_or_default(store);
    println!("{}", serde_json::to_string_pretty(&doc.config)?);
    Ok(())
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "consensus-radar.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer flushing for the life of the process
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("consensus_radar=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_settings(config: &AppConfig, settings: &consensus_radar::state::Settings) {
    info!("📋 Configuration:");
    info!("   Wallets: {}", settings.wallet_count());
    info!("   Symbols: {}", settings.symbols.join(", "));
    info!("   Consensus: {}", settings.consensus_count);
    info!("   Poll interval: {}s", settings.poll_seconds);
    info!("   State file: {:?}", config.engine.state_path);
    info!(
        "   Telegram: {}",
        if config.telegram.is_enabled() { "enabled" } else { "disabled" }
    );
    info!(
        "   Feed: {}",
        config.feed.listen_addr.as_deref().unwrap_or("disabled")
    );
}
