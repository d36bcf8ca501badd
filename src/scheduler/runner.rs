//! Reminder polling loop.
//!
//! Each tick:
//! 1. Take the due reminders out of the book (the remainder is persisted first)
//! 2. Resolve the destination: `LOG_CHAT` if set, else the owner
//! 3. Send one HTML notification per due reminder, logging failures
//!
//! Delivery is at most once. A failed send is never retried.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::{Reminder, ReminderBook};
use crate::locale::{Locales, fill};
use crate::store::{KvStore, get_or_empty, keys};
use crate::telegram::{Messenger, escape_html};

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Everything a tick needs.
pub struct SchedulerDeps {
    pub book: Arc<ReminderBook>,
    pub store: Arc<dyn KvStore>,
    pub locales: Arc<Locales>,
    /// Account used to deliver notifications.
    pub sender: Arc<dyn Messenger>,
    pub owner_id: i64,
}

struct Running {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Background task that fires due reminders.
pub struct ReminderScheduler {
    deps: Arc<SchedulerDeps>,
    poll_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl ReminderScheduler {
    #[must_use]
    pub fn new(deps: SchedulerDeps) -> Self {
        Self {
            deps: Arc::new(deps),
            poll_interval: DEFAULT_POLL_INTERVAL,
            running: Mutex::new(None),
        }
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Starts the loop. Does nothing if it is already running.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            debug!("Reminder scheduler already running");
            return;
        }

        let (stop, mut stopped) = oneshot::channel();
        let deps = Arc::clone(&self.deps);
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(async move {
            info!("Reminder scheduler started");
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        deps.tick(Utc::now()).await;
                    }
                    _ = &mut stopped => {
                        info!("Reminder scheduler stopped");
                        break;
                    }
                }
            }
        });

        *running = Some(Running { stop, task });
    }

    /// Signals the loop to stop and returns its task handle.
    ///
    /// Returns `None` when the loop was not running.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        // The receiver is gone only if the task already exited.
        let _ = running.stop.send(());
        Some(running.task)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs one poll immediately.
    pub async fn tick(&self, now: DateTime<Utc>) {
        self.deps.tick(now).await;
    }
}

impl SchedulerDeps {
    async fn tick(&self, now: DateTime<Utc>) {
        let due = match self.book.take_due(now).await {
            Ok(due) => due,
            Err(e) => {
                warn!("Failed to load reminders: {}", e);
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        let target = self.notification_target().await;
        info!("Firing {} reminder(s) to {}", due.len(), target);

        for reminder in &due {
            let text = self.notification_text(reminder);
            if let Err(e) = self.sender.send_html(target, &text).await {
                error!("Failed to send reminder {}: {}", reminder.id, e);
            }
        }
    }

    async fn notification_target(&self) -> i64 {
        get_or_empty(self.store.as_ref(), keys::LOG_CHAT)
            .await
            .parse()
            .ok()
            .filter(|chat: &i64| *chat != 0)
            .unwrap_or(self.owner_id)
    }

    /// HTML notification: a mention of the owner, then the reminder.
    fn notification_text(&self, reminder: &Reminder) -> String {
        let owner_id = self.owner_id.to_string();
        let mention = fill(
            &self.locales.tr("reminders.owner_mention"),
            &[("owner_id", &owner_id)],
        );
        let text = escape_html(&reminder.text);
        let body = match &reminder.message_link {
            Some(link) => fill(
                &self.locales.tr("reminders.notification_with_link"),
                &[("text", &text), ("link", &escape_html(link))],
            ),
            None => fill(
                &self.locales.tr("reminders.notification"),
                &[("text", &text)],
            ),
        };
        format!("{mention}\n{body}")
    }
}

impl std::fmt::Debug for ReminderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{FakeMessenger, Sent};
    use chrono::TimeDelta;

    const OWNER: i64 = 1000;
    const HOUR: Duration = Duration::from_secs(3600);

    struct Fixture {
        store: Arc<MemoryStore>,
        book: Arc<ReminderBook>,
        sender: Arc<FakeMessenger>,
        scheduler: ReminderScheduler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let book = Arc::new(ReminderBook::new(store.clone()));
        let sender = Arc::new(FakeMessenger::new());
        let scheduler = ReminderScheduler::new(SchedulerDeps {
            book: Arc::clone(&book),
            store: store.clone(),
            locales: Arc::new(Locales::bundled().unwrap()),
            sender: sender.clone(),
            owner_id: OWNER,
        });
        Fixture {
            store,
            book,
            sender,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_tick_fires_due_once_to_owner() {
        let f = fixture();
        let now = Utc::now();
        f.book.create(None, "stretch", HOUR, now).await.unwrap();
        f.book.create(None, "sleep", 3 * HOUR, now).await.unwrap();

        let later = now + TimeDelta::minutes(61);
        f.scheduler.tick(later).await;
        f.scheduler.tick(later).await;

        let sent = f.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, OWNER);
        assert!(sent[0].1.contains("stretch"));
        assert_eq!(f.book.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_mentions_owner_as_html() {
        let f = fixture();
        let now = Utc::now();
        f.book.create(None, "pay <rent> & bills", HOUR, now).await.unwrap();

        f.scheduler.tick(now + TimeDelta::hours(2)).await;

        let log = f.sender.log();
        let [Sent::SendHtml { chat_id, html }] = log.as_slice() else {
            panic!("expected one HTML send, got {log:?}");
        };
        assert_eq!(*chat_id, OWNER);
        assert!(html.starts_with("Reminder for <a href=\"tg://user?id=1000\">you</a>\n"));
        assert!(html.ends_with("Reminder: pay &lt;rent&gt; &amp; bills"));
    }

    #[tokio::test]
    async fn test_tick_uses_log_chat_and_link() {
        let f = fixture();
        f.store.set(keys::LOG_CHAT, "-1001234").await.unwrap();
        let now = Utc::now();
        f.book
            .create(Some("https://t.me/chan/7".to_owned()), "read", HOUR, now)
            .await
            .unwrap();

        f.scheduler.tick(now + TimeDelta::hours(2)).await;

        let sent = f.sender.sent();
        assert_eq!(sent[0].0, -1_001_234);
        assert!(sent[0].1.contains("https://t.me/chan/7"));
    }

    #[tokio::test]
    async fn test_failed_send_is_not_retried() {
        let f = fixture();
        f.sender.fail_sends(true);
        let now = Utc::now();
        f.book.create(None, "lost", HOUR, now).await.unwrap();

        f.scheduler.tick(now + TimeDelta::hours(2)).await;
        f.sender.fail_sends(false);
        f.scheduler.tick(now + TimeDelta::hours(2)).await;

        assert!(f.sender.sent().is_empty());
        assert_eq!(f.sender.send_attempts(), 1);
        assert!(f.book.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let f = fixture();
        assert!(f.scheduler.stop().is_none());

        f.scheduler.start();
        f.scheduler.start();
        assert!(f.scheduler.is_running());

        let handle = f.scheduler.stop().unwrap();
        handle.await.unwrap();
        assert!(!f.scheduler.is_running());
        assert!(f.scheduler.stop().is_none());

        f.scheduler.start();
        assert!(f.scheduler.is_running());
        f.scheduler.stop().unwrap().await.unwrap();
    }
}
