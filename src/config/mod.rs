//! Configuration module.
//!
//! Telegram credentials and runtime settings, both read from the environment
//! (optionally seeded from a `.env` file).

mod settings;

pub use settings::{BotSettings, ConfigError, TelegramConfig};
