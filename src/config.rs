//! Configuration loader and validator for the catalog sync bot.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::publisher::PublishSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Telegram bot and channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    /// Numeric chat id (`-100...`) or `@channel_username`.
    pub channel_id: String,
    /// Destination of the "contact support" button under every post.
    pub manager_url: String,
}

/// Timing and batching of the watcher and autopost loops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    pub check_interval_secs: u64,
    pub autopost_interval_secs: u64,
    pub autopost_batch_size: usize,
    pub concurrent_limit: usize,
    pub max_retries: u32,
    pub delay_between_products_ms: u64,
    pub min_stock_to_post: i64,
    pub restart_cooldown_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            autopost_interval_secs: 60 * 60,
            autopost_batch_size: 1,
            concurrent_limit: 1,
            max_retries: 3,
            delay_between_products_ms: 1500,
            min_stock_to_post: 2,
            restart_cooldown_secs: 10,
        }
    }
}

impl SyncSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn autopost_interval(&self) -> Duration {
        Duration::from_secs(self.autopost_interval_secs)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins over the file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/catalog.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }

    pub fn publish_settings(&self) -> PublishSettings {
        PublishSettings {
            max_retries: self.sync.max_retries,
            pacing: Duration::from_millis(self.sync.delay_between_products_ms),
            manager_url: self.telegram.manager_url.clone(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    let channel = cfg.telegram.channel_id.trim();
    if channel.is_empty() {
        return Err(ConfigError::Invalid("telegram.channel_id must be non-empty"));
    }
    if !channel.starts_with('@') && channel.parse::<i64>().is_err() {
        return Err(ConfigError::Invalid(
            "telegram.channel_id must be a numeric id or @username",
        ));
    }
    if Url::parse(cfg.telegram.manager_url.trim()).is_err() {
        return Err(ConfigError::Invalid(
            "telegram.manager_url must be an absolute URL",
        ));
    }

    let s = &cfg.sync;
    if s.check_interval_secs == 0 {
        return Err(ConfigError::Invalid("sync.check_interval_secs must be > 0"));
    }
    if s.autopost_interval_secs == 0 {
        return Err(ConfigError::Invalid("sync.autopost_interval_secs must be > 0"));
    }
    if s.autopost_batch_size == 0 {
        return Err(ConfigError::Invalid("sync.autopost_batch_size must be > 0"));
    }
    if s.concurrent_limit == 0 {
        return Err(ConfigError::Invalid("sync.concurrent_limit must be > 0"));
    }
    if s.max_retries == 0 {
        return Err(ConfigError::Invalid("sync.max_retries must be > 0"));
    }
    // delay, min stock and cooldown may legitimately be zero

    Ok(())
}

/// Returns the example YAML shipped with the bot.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  channel_id: "@your_catalog_channel"
  manager_url: "https://t.me/your_manager"

sync:
  check_interval_secs: 5
  autopost_interval_secs: 3600
  autopost_batch_size: 1
  concurrent_limit: 1
  max_retries: 3
  delay_between_products_ms: 1500
  min_stock_to_post: 2
  restart_cooldown_secs: 10
"#
}
