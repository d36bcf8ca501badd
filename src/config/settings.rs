//! Application settings and Telegram configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Telegram API configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Session file of the user account.
    pub session_path: PathBuf,

    /// Token of the companion bot. Without it the user account sends
    /// notifications itself.
    pub bot_token: Option<String>,

    /// Session file of the companion bot.
    pub bot_session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("userbot.session")
}

fn default_bot_session_path() -> PathBuf {
    PathBuf::from("assistant.session")
}

impl TelegramConfig {
    #[must_use]
    pub fn new(api_id: i32, api_hash: String) -> Self {
        Self {
            api_id,
            api_hash,
            session_path: default_session_path(),
            bot_token: None,
            bot_session_path: default_bot_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `TG_API_ID` and `TG_API_HASH` to be set.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_id: i32 = std::env::var("TG_API_ID")
            .map_err(|_| ConfigError::MissingEnvVar("TG_API_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidApiId)?;

        let api_hash = std::env::var("TG_API_HASH")
            .map_err(|_| ConfigError::MissingEnvVar("TG_API_HASH"))?;

        Ok(Self {
            api_id,
            api_hash,
            session_path: env_path("TG_SESSION_PATH").unwrap_or_else(default_session_path),
            bot_token: env_non_empty("TG_BOT_TOKEN"),
            bot_session_path: env_path("TG_BOT_SESSION_PATH")
                .unwrap_or_else(default_bot_session_path),
        })
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Redis URL. Without it state lives in memory only.
    pub db_url: Option<String>,

    /// Command prefix used until one is stored under `CMD_HANDLER`.
    pub command_prefix: String,

    /// Seconds between reminder polls.
    pub reminder_poll_secs: u64,

    /// Where `download` puts files.
    pub download_dir: PathBuf,
}

fn default_command_prefix() -> String {
    ".".to_owned()
}

const fn default_reminder_poll_secs() -> u64 {
    30
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            db_url: None,
            command_prefix: default_command_prefix(),
            reminder_poll_secs: default_reminder_poll_secs(),
            download_dir: default_download_dir(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self {
            db_url: env_non_empty("DB_URL"),
            command_prefix: env_non_empty("COMMAND_PREFIX")
                .unwrap_or_else(default_command_prefix),
            reminder_poll_secs: std::env::var("REMINDER_POLL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or_else(default_reminder_poll_secs),
            download_dir: env_path("DOWNLOAD_DIR").unwrap_or_else(default_download_dir),
        }
    }

    /// The prefix to route with: the stored `CMD_HANDLER` if non-empty.
    #[must_use]
    pub fn effective_prefix(&self, stored: &str) -> String {
        let stored = stored.trim();
        if stored.is_empty() {
            self.command_prefix.clone()
        } else {
            stored.to_owned()
        }
    }

    #[must_use]
    pub const fn reminder_poll_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_poll_secs)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn env_path(name: &str) -> Option<PathBuf> {
    env_non_empty(name).map(PathBuf::from)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,
}
