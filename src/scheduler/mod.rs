//! Reminder scheduling.
//!
//! [`ReminderBook`] owns the persisted reminder list; [`ReminderScheduler`]
//! polls it and delivers whatever has come due.

mod runner;
mod state;

pub use runner::{DEFAULT_POLL_INTERVAL, ReminderScheduler, SchedulerDeps};
pub use state::{
    MAX_DELAY, MAX_REMINDERS, MAX_TEXT_CHARS, MIN_DELAY, Reminder, ReminderBook, ReminderError,
    format_duration_human, parse_duration,
};
