//! Telegram client wrapper module.
//!
//! [`TelegramBot`] wraps a grammers client for either the user account or the
//! assistant bot; command code talks to it through the [`Messenger`] trait.
//! The assistant also answers inline queries and button presses.

mod client;
mod inline;
mod messenger;
mod rate_limiter;

pub(crate) use client::parse_user_id;
pub use client::{
    PwdToken as PasswordToken, QrAuthResult, TelegramBot, TelegramError, Token as LoginToken,
};
pub use grammers_client::client::UpdateStream;
pub use grammers_client::update::Update;
pub use inline::{
    CallbackReply, InlineArticle, MenuButton, MenuView, answer_callback, answer_inline,
    callback_data, callback_sender, inline_sender,
};
pub use messenger::{IncomingMessage, Messenger, StatusMessage, UserInfo, escape_html};
pub use rate_limiter::RateLimiter;
