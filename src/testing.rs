//! Test fixtures: a recording messenger and a fully wired [`App`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::commands::{CancelRegistry, CommandContext, CommandRouter, Invocation, ModuleRegistry, PermissionGate};
use crate::locale::{DEFAULT_LANGUAGE, Locales};
use crate::log_forward::LogSwitch;
use crate::modules;
use crate::scheduler::ReminderBook;
use crate::store::{KvStore, MemoryStore, keys};
use crate::telegram::{IncomingMessage, Messenger, StatusMessage, TelegramError, UserInfo};

pub const OWNER_ID: i64 = 1000;
pub const CHAT_ID: i64 = -1_001_234_567;
pub const COMMAND_MESSAGE_ID: i32 = 10;

/// A group message from `sender_id`.
pub fn message_from(sender_id: i64, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: CHAT_ID,
        message_id: COMMAND_MESSAGE_ID,
        sender_id,
        text: text.to_owned(),
        reply_to: None,
        link: Some(format!("https://t.me/c/1234567/{COMMAND_MESSAGE_ID}")),
        sent_at: Utc::now(),
    }
}

/// A message from `sender_id` replying to `reply_to`.
pub fn reply_from(sender_id: i64, text: &str, reply_to: i32) -> IncomingMessage {
    IncomingMessage {
        message_id: COMMAND_MESSAGE_ID + 1,
        reply_to: Some(reply_to),
        ..message_from(sender_id, text)
    }
}

/// One outbound call recorded by [`FakeMessenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Edit {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
    Reply {
        chat_id: i64,
        reply_to: i32,
        text: String,
    },
    Send {
        chat_id: i64,
        text: String,
    },
    SendHtml {
        chat_id: i64,
        html: String,
    },
}

impl Sent {
    pub fn text(&self) -> &str {
        match self {
            Self::Edit { text, .. } | Self::Reply { text, .. } | Self::Send { text, .. } => text,
            Self::SendHtml { html, .. } => html,
        }
    }
}

/// What `download_reply_media` does.
#[derive(Debug, Clone)]
pub enum DownloadBehaviour {
    Succeed,
    NoMedia,
    Fail(String),
    /// Blocks until the token is cancelled.
    Hang,
}

#[derive(Debug, Default)]
struct Directory {
    users: HashMap<i64, UserInfo>,
    usernames: HashMap<String, i64>,
    reply_senders: HashMap<i32, UserInfo>,
    unreachable: HashSet<i64>,
}

/// In-memory [`Messenger`] that records every call.
#[derive(Debug)]
pub struct FakeMessenger {
    log: Mutex<Vec<Sent>>,
    next_id: AtomicI32,
    send_attempts: AtomicUsize,
    fail_sends: AtomicBool,
    directory: Mutex<Directory>,
    download: Mutex<DownloadBehaviour>,
}

impl Default for FakeMessenger {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(500),
            send_attempts: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            directory: Mutex::new(Directory::default()),
            download: Mutex::new(DownloadBehaviour::Succeed),
        }
    }

    pub fn log(&self) -> Vec<Sent> {
        lock(&self.log).clone()
    }

    /// Standalone sends, plain or HTML, as `(chat id, text)`.
    pub fn sent(&self) -> Vec<(i64, String)> {
        lock(&self.log)
            .iter()
            .filter_map(|entry| match entry {
                Sent::Send { chat_id, text } => Some((*chat_id, text.clone())),
                Sent::SendHtml { chat_id, html } => Some((*chat_id, html.clone())),
                _ => None,
            })
            .collect()
    }

    /// Standalone sends tried so far, failed ones included.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    /// Text of the most recent edit or reply.
    pub fn last_text(&self) -> String {
        lock(&self.log)
            .iter()
            .rev()
            .find(|entry| !matches!(entry, Sent::Send { .. } | Sent::SendHtml { .. }))
            .map(|entry| entry.text().to_owned())
            .unwrap_or_default()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn add_user(&self, id: i64, name: &str, username: Option<&str>) {
        let mut dir = lock(&self.directory);
        dir.users.insert(
            id,
            UserInfo {
                id,
                name: name.to_owned(),
            },
        );
        if let Some(username) = username {
            dir.usernames.insert(username.to_lowercase(), id);
        }
    }

    pub fn set_reply_sender(&self, message_id: i32, id: i64, name: &str) {
        lock(&self.directory).reply_senders.insert(
            message_id,
            UserInfo {
                id,
                name: name.to_owned(),
            },
        );
    }

    pub fn block_chat(&self, chat_id: i64) {
        lock(&self.directory).unreachable.insert(chat_id);
    }

    pub fn set_download(&self, behaviour: DownloadBehaviour) {
        *lock(&self.download) = behaviour;
    }

    fn record(&self, entry: Sent) {
        lock(&self.log).push(entry);
    }

    fn check_send(&self, chat_id: i64) -> Result<(), TelegramError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TelegramError::Invocation("send failed".to_owned()));
        }
        if lock(&self.directory).unreachable.contains(&chat_id) {
            return Err(TelegramError::PeerNotFound(chat_id));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn edit(&self, message: &IncomingMessage, text: &str) -> Result<i32, TelegramError> {
        self.record(Sent::Edit {
            chat_id: message.chat_id,
            message_id: message.message_id,
            text: text.to_owned(),
        });
        Ok(message.message_id)
    }

    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<i32, TelegramError> {
        self.record(Sent::Reply {
            chat_id: message.chat_id,
            reply_to: message.message_id,
            text: text.to_owned(),
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit_status(&self, status: StatusMessage, text: &str) -> Result<(), TelegramError> {
        self.record(Sent::Edit {
            chat_id: status.chat_id,
            message_id: status.message_id,
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        self.check_send(chat_id)?;
        self.record(Sent::Send {
            chat_id,
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn send_html(&self, chat_id: i64, html: &str) -> Result<(), TelegramError> {
        self.check_send(chat_id)?;
        self.record(Sent::SendHtml {
            chat_id,
            html: html.to_owned(),
        });
        Ok(())
    }

    async fn reply_sender(
        &self,
        message: &IncomingMessage,
    ) -> Result<Option<UserInfo>, TelegramError> {
        let Some(reply_to) = message.reply_to else {
            return Ok(None);
        };
        Ok(lock(&self.directory).reply_senders.get(&reply_to).cloned())
    }

    async fn resolve_user(&self, query: &str) -> Result<Option<UserInfo>, TelegramError> {
        let dir = lock(&self.directory);
        let id = match crate::telegram::parse_user_id(query.trim()) {
            Some(id) => Some(id),
            None => {
                let username = query.trim().trim_start_matches('@').to_lowercase();
                dir.usernames.get(&username).copied()
            }
        };
        Ok(id.and_then(|id| dir.users.get(&id).cloned()))
    }

    async fn download_reply_media(
        &self,
        message: &IncomingMessage,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, TelegramError> {
        let reply_to = message.reply_to.ok_or(TelegramError::MessageNotFound)?;
        let behaviour = lock(&self.download).clone();
        match behaviour {
            DownloadBehaviour::Succeed => Ok(dir.join(format!("{}_{reply_to}", message.chat_id))),
            DownloadBehaviour::NoMedia => Err(TelegramError::NoMedia),
            DownloadBehaviour::Fail(reason) => Err(TelegramError::Download(reason)),
            DownloadBehaviour::Hang => {
                cancel.cancelled().await;
                Err(TelegramError::Cancelled)
            }
        }
    }
}

/// Builder for a wired application with every module registered.
#[derive(Debug, Default)]
pub struct TestApp {
    sudoers: Vec<i64>,
    vars: Vec<(String, String)>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sudoers(mut self, ids: &[i64]) -> Self {
        self.sudoers.extend_from_slice(ids);
        self
    }

    /// Pre-stores a string value.
    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.vars.push((key.to_owned(), value.to_owned()));
        self
    }

    pub async fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::new());
        for id in &self.sudoers {
            store
                .set_add(keys::SUDOS, &id.to_string())
                .await
                .unwrap();
        }
        for (key, value) in &self.vars {
            store.set(key, value).await.unwrap();
        }

        let messenger = Arc::new(FakeMessenger::new());
        let assistant = Arc::new(FakeMessenger::new());

        let mut registry = ModuleRegistry::new(".");
        modules::load_all(&mut registry).unwrap();
        let (router, help) = registry.finish();

        let app = Arc::new(App {
            owner: UserInfo {
                id: OWNER_ID,
                name: "Owner".to_owned(),
            },
            prefix: router.prefix().to_owned(),
            store: store.clone(),
            locales: Arc::new(Locales::bundled().unwrap()),
            permissions: PermissionGate::load(OWNER_ID, store.as_ref()).await,
            help,
            messenger: messenger.clone(),
            assistant: assistant.clone(),
            reminders: Arc::new(ReminderBook::new(store.clone())),
            cancels: CancelRegistry::new(),
            download_dir: std::env::temp_dir().join("pocket_userbot_tests"),
            started_at: Instant::now(),
            log_switch: LogSwitch::default(),
        });

        Harness {
            app,
            router,
            store,
            messenger,
            assistant,
        }
    }
}

/// A built application plus handles on its fakes.
pub struct Harness {
    pub app: Arc<App>,
    pub router: CommandRouter,
    pub store: Arc<MemoryStore>,
    pub messenger: Arc<FakeMessenger>,
    pub assistant: Arc<FakeMessenger>,
}

impl Harness {
    /// A context for calling an action directly.
    pub fn context(&self, message: IncomingMessage, args: &str) -> CommandContext {
        CommandContext {
            app: Arc::clone(&self.app),
            message,
            args: args.to_owned(),
            lang: DEFAULT_LANGUAGE.to_owned(),
        }
    }

    pub async fn invocations(&self, message: &IncomingMessage) -> Vec<Invocation> {
        self.router.dispatch(&self.app, message).await
    }

    /// Routes `message` and runs every resulting invocation to completion.
    pub async fn run_message(&self, message: &IncomingMessage) {
        for invocation in self.invocations(message).await {
            invocation.run().await;
        }
    }

    /// Runs `text` as sent by `sender_id`; returns the last visible response.
    pub async fn run(&self, sender_id: i64, text: &str) -> String {
        self.run_message(&message_from(sender_id, text)).await;
        self.messenger.last_text()
    }

    /// Translation in the default language.
    pub fn tr(&self, key: &str) -> String {
        self.app.locales.tr_lang(DEFAULT_LANGUAGE, key)
    }
}
