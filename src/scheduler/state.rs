//! Persisted reminder state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::store::{KvStore, StoreError, keys};

/// Maximum number of pending reminders.
pub const MAX_REMINDERS: usize = 25;

/// Maximum reminder text length in characters.
pub const MAX_TEXT_CHARS: usize = 500;

/// Shortest accepted delay (exclusive).
pub const MIN_DELAY: Duration = Duration::from_secs(60);

/// Longest accepted delay (inclusive).
pub const MAX_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors that can occur while managing reminders.
#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Duration is out of range")]
    Overflow,

    #[error("Duration exceeds 30 days")]
    TooLong,

    #[error("Duration must be longer than one minute")]
    TooShort,

    #[error("Reminder limit of {MAX_REMINDERS} reached")]
    LimitReached,

    #[error("Reminder text exceeds {MAX_TEXT_CHARS} characters")]
    TextTooLong,

    #[error("No reminder at position {0}")]
    NotFound(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A pending notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: u64,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub message_link: Option<String>,
    #[serde(rename = "reminder_text")]
    pub text: String,
    #[serde(rename = "remind_at")]
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// Whether the reminder should fire at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now > self.due_at
    }

    /// Time left until the reminder fires, or `None` once it is due.
    #[must_use]
    pub fn time_left(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.due_at - now).to_std().ok()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Parses a compact duration such as `1d2h30m` or `90s`.
///
/// Tokens are `<digits><unit>` with units `d`, `h`, `m`, `s`, in any order
/// and repeated freely. Input is trimmed and case-insensitive.
pub fn parse_duration(input: &str) -> Result<Duration, ReminderError> {
    let normalized = input.trim().to_lowercase();
    let invalid = || ReminderError::InvalidDuration(input.trim().to_owned());

    if normalized.is_empty() {
        return Err(invalid());
    }

    let mut total_secs: u64 = 0;
    let mut rest = normalized.as_str();

    while !rest.is_empty() {
        let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits_len == 0 {
            return Err(invalid());
        }
        let (digits, tail) = rest.split_at(digits_len);
        let mut chars = tail.chars();
        let unit_secs: u64 = match chars.next() {
            Some('d') => 86_400,
            Some('h') => 3_600,
            Some('m') => 60,
            Some('s') => 1,
            _ => return Err(invalid()),
        };

        let value: u64 = digits.parse().map_err(|_| ReminderError::Overflow)?;
        total_secs = value
            .checked_mul(unit_secs)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or(ReminderError::Overflow)?;

        rest = chars.as_str();
    }

    if total_secs == 0 {
        return Err(ReminderError::InvalidDuration("duration cannot be zero".to_owned()));
    }

    Ok(Duration::from_secs(total_secs))
}

/// Renders a duration as `1d 2h 30m`.
///
/// Zero components are dropped; minutes are kept when nothing else is shown.
#[must_use]
pub fn format_duration_human(duration: Duration) -> String {
    let total_minutes = duration.as_secs() / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

/// Reminder list persisted as one JSON array under `REMINDERS`.
///
/// Every read-modify-write holds `last_id`, so creation, deletion and the
/// scheduler tick never interleave.
pub struct ReminderBook {
    store: Arc<dyn KvStore>,

    /// Highest id issued by this process.
    last_id: Mutex<u64>,
}

impl ReminderBook {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            last_id: Mutex::new(0),
        }
    }

    /// Loads all pending reminders in creation order.
    pub async fn list(&self) -> Result<Vec<Reminder>, ReminderError> {
        let _guard = self.last_id.lock().await;
        self.load().await
    }

    /// Validates and persists a new reminder due `delay` after `now`.
    pub async fn create(
        &self,
        message_link: Option<String>,
        text: &str,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<Reminder, ReminderError> {
        if delay > MAX_DELAY {
            return Err(ReminderError::TooLong);
        }
        if delay <= MIN_DELAY {
            return Err(ReminderError::TooShort);
        }

        let mut last_id = self.last_id.lock().await;
        let mut reminders = self.load().await?;

        if reminders.len() >= MAX_REMINDERS {
            return Err(ReminderError::LimitReached);
        }
        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(ReminderError::TextTooLong);
        }

        let delay = TimeDelta::from_std(delay).map_err(|_| ReminderError::Overflow)?;
        let due_at = now.checked_add_signed(delay).ok_or(ReminderError::Overflow)?;

        let persisted_max = reminders.iter().map(|r| r.id).max().unwrap_or(0);
        let id = (*last_id).max(persisted_max) + 1;

        let reminder = Reminder {
            id,
            message_link: message_link.filter(|link| !link.is_empty()),
            text: text.to_owned(),
            due_at,
            created_at: now,
        };
        reminders.push(reminder.clone());
        self.save(&reminders).await?;
        *last_id = id;

        info!("Reminder {} scheduled for {}", id, due_at);
        Ok(reminder)
    }

    /// Deletes the reminder at a 1-based position of the current list.
    pub async fn delete_at(&self, position: usize) -> Result<Reminder, ReminderError> {
        let _guard = self.last_id.lock().await;
        let mut reminders = self.load().await?;

        if position == 0 || position > reminders.len() {
            return Err(ReminderError::NotFound(position));
        }
        let removed = reminders.remove(position - 1);
        self.save(&reminders).await?;

        debug!("Reminder {} deleted", removed.id);
        Ok(removed)
    }

    /// Removes every reminder.
    pub async fn clear(&self) -> Result<(), ReminderError> {
        let _guard = self.last_id.lock().await;
        self.store.delete(keys::REMINDERS).await?;
        Ok(())
    }

    /// Removes and returns the reminders due at `now`.
    ///
    /// The remaining reminders are persisted before the due ones are handed
    /// back, so a crash afterwards never delivers twice.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, ReminderError> {
        let _guard = self.last_id.lock().await;
        let reminders = self.load().await?;
        if reminders.is_empty() {
            return Ok(Vec::new());
        }

        let (due, pending): (Vec<_>, Vec<_>) =
            reminders.into_iter().partition(|r| r.is_due(now));
        if due.is_empty() {
            return Ok(due);
        }

        self.save(&pending).await?;
        Ok(due)
    }

    async fn load(&self) -> Result<Vec<Reminder>, ReminderError> {
        match self.store.get(keys::REMINDERS).await? {
            Some(data) if !data.is_empty() => {
                Ok(serde_json::from_str(&data).map_err(StoreError::from)?)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn save(&self, reminders: &[Reminder]) -> Result<(), ReminderError> {
        if reminders.is_empty() {
            self.store.delete(keys::REMINDERS).await?;
            return Ok(());
        }
        let data = serde_json::to_string(reminders).map_err(StoreError::from)?;
        self.store.set(keys::REMINDERS, &data).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ReminderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderBook").finish_non_exhaustive()
    }
}
