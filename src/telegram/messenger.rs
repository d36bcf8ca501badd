//! Outbound messaging seam used by command handlers and the reminder scheduler.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::TelegramError;

/// Plain view of an inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Bot-API style dialog id of the chat.
    pub chat_id: i64,
    pub message_id: i32,
    pub sender_id: i64,
    pub text: String,
    /// Id of the message this one replies to.
    pub reply_to: Option<i32>,
    /// Deep link to this message; `None` in private chats.
    pub link: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// A message the bot keeps editing while a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub chat_id: i64,
    pub message_id: i32,
}

/// Minimal user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
}

/// Telegram operations the command layer depends on.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Replaces the text of `message`. Returns the edited message id.
    async fn edit(&self, message: &IncomingMessage, text: &str) -> Result<i32, TelegramError>;

    /// Replies to `message`. Returns the id of the new message.
    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<i32, TelegramError>;

    async fn edit_status(&self, status: StatusMessage, text: &str) -> Result<(), TelegramError>;

    /// Sends a standalone message to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;

    /// Like [`Self::send_text`], parsing `html` as Telegram HTML.
    async fn send_html(&self, chat_id: i64, html: &str) -> Result<(), TelegramError>;

    /// Sender of the message `message` replies to, if any.
    async fn reply_sender(&self, message: &IncomingMessage)
    -> Result<Option<UserInfo>, TelegramError>;

    /// Resolves `@username`, a numeric id, or `tg://user?id=` link.
    async fn resolve_user(&self, query: &str) -> Result<Option<UserInfo>, TelegramError>;

    /// Downloads the media of the replied-to message into `dir`.
    async fn download_reply_media(
        &self,
        message: &IncomingMessage,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, TelegramError>;
}

/// Escapes text for inclusion in Telegram HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
