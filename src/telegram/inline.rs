//! Inline query and button callback answers for the assistant bot.

use grammers_client::types::inline::query::Article;
use grammers_client::update::{CallbackQuery, InlineQuery};
use grammers_client::{InputMessage, button, reply_markup};

use super::TelegramError;

/// One inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuButton {
    /// Sends `data` back as a callback query.
    Callback { text: String, data: String },
    Url { text: String, url: String },
}

/// A message body with its inline keyboard rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuView {
    pub text: String,
    pub buttons: Vec<Vec<MenuButton>>,
}

/// The single result offered for an inline query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineArticle {
    pub title: String,
    pub description: String,
    pub view: MenuView,
}

/// How a button press is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackReply {
    /// Popup shown to the presser; the message is unchanged.
    Alert(String),
    /// Replaces the message the button belongs to.
    Edit(MenuView),
    /// Only dismisses the loading state.
    Ignore,
}

/// Id of the user who typed the inline query.
pub fn inline_sender(query: &InlineQuery) -> Option<i64> {
    query.sender().map(|s| s.id().bare_id())
}

/// Id of the user who pressed the button.
pub fn callback_sender(query: &CallbackQuery) -> Option<i64> {
    query.sender().map(|s| s.id().bare_id())
}

/// Callback payload as text; `None` for non-UTF-8 data.
pub fn callback_data(query: &CallbackQuery) -> Option<&str> {
    std::str::from_utf8(query.data()).ok()
}

/// Answers `query` with `article`, uncached so permissions apply per sender.
pub async fn answer_inline(query: &InlineQuery, article: InlineArticle) -> Result<(), TelegramError> {
    let result = Article::new(article.title, render(article.view)).description(article.description);
    query.answer(vec![result]).cache_time(0).send().await?;
    Ok(())
}

pub async fn answer_callback(query: &CallbackQuery, reply: CallbackReply) -> Result<(), TelegramError> {
    match reply {
        CallbackReply::Alert(text) => query.answer().alert(text).send().await?,
        CallbackReply::Edit(view) => query.answer().edit(render(view)).await?,
        CallbackReply::Ignore => query.answer().send().await?,
    }
    Ok(())
}

fn render(view: MenuView) -> InputMessage {
    let message = InputMessage::new().text(view.text);
    if view.buttons.is_empty() {
        return message;
    }

    let rows: Vec<Vec<button::Inline>> = view
        .buttons
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|b| match b {
                    MenuButton::Callback { text, data } => button::inline(text, data.into_bytes()),
                    MenuButton::Url { text, url } => button::url(text, url),
                })
                .collect()
        })
        .collect();
    message.reply_markup(&reply_markup::inline(rows))
}
