//! Shared application state handed to every command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::commands::{CancelRegistry, HelpIndex, PermissionGate};
use crate::locale::Locales;
use crate::log_forward::LogSwitch;
use crate::scheduler::ReminderBook;
use crate::store::KvStore;
use crate::telegram::{Messenger, UserInfo};

/// Everything a command can reach, built once in `main`.
pub struct App {
    /// The logged-in account.
    pub owner: UserInfo,
    /// Command prefix the routes were built with.
    pub prefix: String,
    pub store: Arc<dyn KvStore>,
    pub locales: Arc<Locales>,
    pub permissions: PermissionGate,
    pub help: HelpIndex,
    /// The user account.
    pub messenger: Arc<dyn Messenger>,
    /// The companion bot, or the user account when no bot token is set.
    pub assistant: Arc<dyn Messenger>,
    pub reminders: Arc<ReminderBook>,
    pub cancels: CancelRegistry,
    pub download_dir: PathBuf,
    pub started_at: Instant,
    /// Whether warnings are forwarded to the log chat.
    pub log_switch: LogSwitch,
}

impl App {
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("owner", &self.owner)
            .field("prefix", &self.prefix)
            .field("download_dir", &self.download_dir)
            .finish_non_exhaustive()
    }
}
