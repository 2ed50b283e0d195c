//! Configuration management for the consensus radar.
//!
//! Loads process settings (endpoints, credentials, timeouts, engine knobs)
//! from environment variables and config files. The operator-editable
//! watch list lives separately in the JSON state file, see [`crate::state`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hyperliquid info API settings
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Telegram bot credentials and polling
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Poll loop and dedup behaviour
    #[serde(default)]
    pub engine: EngineConfig,
    /// Live WebSocket signal feed
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Base URL of the info API (without `/info`)
    #[serde(default = "default_exchange_url")]
    pub base_url: String,
    /// Timeout for a single info request in seconds
    #[serde(default = "default_exchange_timeout")]
    pub request_timeout_secs: u64,
    /// Maximum wallet state requests in flight at once
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from BotFather
    #[serde(default)]
    pub bot_token: String,
    /// The only chat allowed to issue commands and receive alerts
    #[serde(default)]
    pub chat_id: String,
    /// Bot API base URL
    #[serde(default = "default_telegram_url")]
    pub api_url: String,
    /// Server-side long-poll wait in seconds
    #[serde(default = "default_long_poll_timeout")]
    pub long_poll_timeout_secs: u64,
    /// Client-side timeout, must exceed the long-poll wait
    #[serde(default = "default_telegram_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the persisted JSON state document
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Pause after a failed poll cycle
    #[serde(default = "default_cycle_backoff")]
    pub cycle_backoff_secs: u64,
    /// Forget a side's fingerprint once it drops below threshold, so the
    /// next time consensus forms it alerts as new
    #[serde(default)]
    pub clear_fingerprint_on_consensus_lost: bool,
    /// Cycles a position key may go unseen before its first-seen time is
    /// dropped (0 = keep forever)
    #[serde(default = "default_position_eviction_cycles")]
    pub position_eviction_cycles: u32,
    /// Delay before acknowledging `/reload`
    #[serde(default = "default_reload_ack_delay")]
    pub reload_ack_delay_ms: u64,
    /// Pause after a failed inbound poll
    #[serde(default = "default_listener_backoff")]
    pub listener_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Address for the WebSocket feed, e.g. "0.0.0.0:8765" (unset = disabled)
    #[serde(default)]
    pub listen_addr: Option<String>,
    /// Per-subscriber queue depth before the subscriber is dropped
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

// Default value functions
fn default_exchange_url() -> String {
    "https://api.hyperliquid.xyz".to_string()
}

fn default_exchange_timeout() -> u64 {
    15
}

fn default_max_concurrent_requests() -> usize {
    4
}

fn default_telegram_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_long_poll_timeout() -> u64 {
    30
}

fn default_telegram_timeout() -> u64 {
    35
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/config.json")
}

fn default_cycle_backoff() -> u64 {
    5
}

fn default_position_eviction_cycles() -> u32 {
    10
}

fn default_reload_ack_delay() -> u64 {
    2000
}

fn default_listener_backoff() -> u64 {
    5
}

fn default_subscriber_buffer() -> usize {
    64
}

impl AppConfig {
    /// Load configuration from `.env`, an optional `config.*` file and
    /// `RADAR__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("RADAR"))
            .build()
            .context("Failed to build configuration")?;

        let mut app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Plain variable names used by existing deployments
        if app.telegram.bot_token.is_empty() {
            app.telegram.bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        }
        if app.telegram.chat_id.is_empty() {
            app.telegram.chat_id = std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
        }

        app.validate()?;
        Ok(app)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.exchange.request_timeout_secs > 0,
            "exchange.request_timeout_secs must be positive"
        );

        anyhow::ensure!(
            self.exchange.max_concurrent_requests >= 1,
            "exchange.max_concurrent_requests must be at least 1"
        );

        anyhow::ensure!(
            self.telegram.request_timeout_secs > self.telegram.long_poll_timeout_secs,
            "telegram.request_timeout_secs must exceed long_poll_timeout_secs"
        );

        anyhow::ensure!(
            self.feed.subscriber_buffer >= 1,
            "feed.subscriber_buffer must be at least 1"
        );

        Ok(())
    }
}

impl ExchangeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl TelegramConfig {
    /// Both token and chat id are present.
    pub fn is_enabled(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl EngineConfig {
    pub fn cycle_backoff(&self) -> Duration {
        Duration::from_secs(self.cycle_backoff_secs)
    }

    pub fn reload_ack_delay(&self) -> Duration {
        Duration::from_millis(self.reload_ack_delay_ms)
    }

    pub fn listener_backoff(&self) -> Duration {
        Duration::from_secs(self.listener_backoff_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            telegram: TelegramConfig::default(),
            engine: EngineConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_exchange_url(),
            request_timeout_secs: default_exchange_timeout(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_url: default_telegram_url(),
            long_poll_timeout_secs: default_long_poll_timeout(),
            request_timeout_secs: default_telegram_timeout(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            cycle_backoff_secs: default_cycle_backoff(),
            clear_fingerprint_on_consensus_lost: false,
            position_eviction_cycles: default_position_eviction_cycles(),
            reload_ack_delay_ms: default_reload_ack_delay(),
            listener_backoff_secs: default_listener_backoff(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.telegram.is_enabled());
        assert_eq!(config.exchange.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_long_poll_must_fit_in_timeout() {
        let mut config = AppConfig::default();
        config.telegram.request_timeout_secs = 30;
        config.telegram.long_poll_timeout_secs = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"engine":{"cycle_backoff_secs":1}}"#).unwrap();
        assert_eq!(config.engine.cycle_backoff_secs, 1);
        assert_eq!(config.engine.position_eviction_cycles, 10);
        assert_eq!(config.exchange.max_concurrent_requests, 4);
        assert!(config.feed.listen_addr.is_none());
    }
}
