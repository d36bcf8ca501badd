//! Command types and definitions.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::app::App;
use crate::locale::fill;
use crate::scheduler::ReminderError;
use crate::store::StoreError;
use crate::telegram::{IncomingMessage, StatusMessage, TelegramError};

/// Errors a command action can return. They are logged, never shown.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Telegram(#[from] TelegramError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reminder(#[from] ReminderError),
}

/// Boxed future returned by an [`Action`].
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<(), CommandError>> + Send>>;

/// Callable run when a handler's route matches.
pub type Action = Arc<dyn Fn(CommandContext) -> ActionFuture + Send + Sync>;

/// A command registration.
///
/// An empty `command` registers help text only; an empty `description`
/// keeps the command out of help.
#[derive(Clone)]
pub struct Handler {
    pub command: String,
    pub description: String,
    pub module_name: String,
    /// Restricts the command to the owner.
    pub disallow_sudoers: bool,
    pub action: Action,
}

impl Handler {
    pub fn new<F, Fut>(module_name: &str, command: &str, description: &str, action: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CommandError>> + Send + 'static,
    {
        Self {
            command: command.to_owned(),
            description: description.to_owned(),
            module_name: module_name.to_owned(),
            disallow_sudoers: false,
            action: Arc::new(move |ctx| Box::pin(action(ctx))),
        }
    }

    /// Marks the handler as owner-only.
    #[must_use]
    pub fn owner_only(mut self) -> Self {
        self.disallow_sudoers = true;
        self
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("command", &self.command)
            .field("module_name", &self.module_name)
            .field("disallow_sudoers", &self.disallow_sudoers)
            .finish_non_exhaustive()
    }
}

/// What an action receives for one matched message.
#[derive(Clone)]
pub struct CommandContext {
    pub app: Arc<App>,
    pub message: IncomingMessage,
    /// Text after `<prefix><command> `, verbatim.
    pub args: String,
    /// Language resolved for the sender.
    pub lang: String,
}

impl CommandContext {
    /// Translates `key` in the sender's language.
    pub fn tr(&self, key: &str) -> String {
        self.app.locales.tr_lang(&self.lang, key)
    }

    /// Translates `key` and fills its placeholders.
    pub fn trf(&self, key: &str, vars: &[(&str, &str)]) -> String {
        fill(&self.tr(key), vars)
    }

    pub fn from_owner(&self) -> bool {
        self.message.sender_id == self.app.owner.id
    }

    /// Edits the command message when the owner sent it, otherwise replies.
    ///
    /// The returned status message can be updated with [`Self::update`].
    pub async fn respond(&self, text: &str) -> Result<StatusMessage, CommandError> {
        let message_id = if self.from_owner() {
            self.app.messenger.edit(&self.message, text).await?
        } else {
            self.app.messenger.reply(&self.message, text).await?
        };
        Ok(StatusMessage {
            chat_id: self.message.chat_id,
            message_id,
        })
    }

    /// Replaces the text of an earlier status message.
    pub async fn update(&self, status: StatusMessage, text: &str) -> Result<(), CommandError> {
        self.app.messenger.edit_status(status, text).await?;
        Ok(())
    }

    /// [`Self::respond`] with a translated template.
    pub async fn respond_tr(
        &self,
        key: &str,
        vars: &[(&str, &str)],
    ) -> Result<StatusMessage, CommandError> {
        self.respond(&self.trf(key, vars)).await
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("message", &self.message)
            .field("args", &self.args)
            .field("lang", &self.lang)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{OWNER_ID, Sent, TestApp, message_from};

    #[test]
    fn test_owner_only_flag() {
        async fn noop(_ctx: CommandContext) -> Result<(), CommandError> {
            Ok(())
        }

        let handler = Handler::new("Tools", "ping", "Ping", noop);
        assert!(!handler.disallow_sudoers);
        assert!(handler.owner_only().disallow_sudoers);
    }

    #[tokio::test]
    async fn test_respond_edits_for_owner() {
        let app = TestApp::new().build().await;
        let ctx = app.context(message_from(OWNER_ID, ".ping"), "");

        let status = ctx.respond("pong").await.unwrap();

        assert_eq!(status.message_id, ctx.message.message_id);
        assert_eq!(
            app.messenger.log(),
            vec![Sent::Edit {
                chat_id: ctx.message.chat_id,
                message_id: ctx.message.message_id,
                text: "pong".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn test_respond_replies_for_sudoer() {
        let app = TestApp::new().build().await;
        let ctx = app.context(message_from(77, ".ping"), "");

        let status = ctx.respond("pong").await.unwrap();

        assert_ne!(status.message_id, ctx.message.message_id);
        assert!(matches!(
            app.messenger.log().as_slice(),
            [Sent::Reply { reply_to, .. }] if *reply_to == ctx.message.message_id
        ));
    }
}
