//! Key-value persistence.
//!
//! Everything the bot persists is a string value or a string set in a flat
//! keyspace. [`KvStore`] is the seam; [`RedisStore`] is the production backend
//! and [`MemoryStore`] backs tests and runs without a database.

mod memory;
mod redis_store;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Well-known store keys.
pub mod keys {
    /// Set of sudoer user ids.
    pub const SUDOS: &str = "SUDOS";
    /// JSON array of pending reminders.
    pub const REMINDERS: &str = "REMINDERS";
    /// Command prefix, read once at startup.
    pub const CMD_HANDLER: &str = "CMD_HANDLER";
    /// Destination chat id for notifications and logs.
    pub const LOG_CHAT: &str = "LOG_CHAT";
    /// Active language code.
    pub const BOT_LANGUAGE: &str = "BOT_LANGUAGE";

    /// Per-user language override key.
    #[must_use]
    pub fn user_language(user_id: i64) -> String {
        format!("USER_LANG_{user_id}")
    }
}

/// Errors returned by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Key {0} holds a value of the wrong type")]
    WrongType(String),
}

/// String get/set plus string-set operations.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes the key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Adds a member to a set. Returns whether it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Removes a member from a set. Returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Lists keys matching a glob pattern (`*` and `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    async fn flush_all(&self) -> Result<(), StoreError>;
}

/// Reads a string value, degrading to an empty string on any failure.
pub async fn get_or_empty(store: &dyn KvStore, key: &str) -> String {
    match store.get(key).await {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            warn!("Store read of {} failed: {}", key, e);
            String::new()
        }
    }
}
