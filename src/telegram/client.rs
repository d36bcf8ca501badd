//! Telegram client wrapper for the user and assistant accounts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grammers_client::client::{LoginToken, PasswordToken, UpdateStream};
use grammers_client::types::Peer;
use grammers_client::update::Message;
use grammers_client::{
    Client, InputMessage, InvocationError, SenderPool, SignInError, UpdatesConfiguration, sender,
};
use grammers_session::defs::{PeerAuth, PeerId, PeerRef};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::RateLimiter;
use super::messenger::{IncomingMessage, Messenger, StatusMessage, UserInfo};

/// Re-export types for external use.
pub use grammers_client::client::{LoginToken as Token, PasswordToken as PwdToken};

/// Bot-API offset applied to channel and supergroup ids.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Password required for 2FA")]
    PasswordRequired(PasswordToken),

    #[error("Invalid password")]
    InvalidPassword(PasswordToken),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),

    #[error("Cannot resolve chat {0}")]
    PeerNotFound(i64),

    #[error("Message not found")]
    MessageNotFound,

    #[error("Message has no media")]
    NoMedia,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        let err_str = err.to_string();

        // Check for flood wait errors
        if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
            && let Some(seconds) = extract_flood_wait_seconds(&err_str) {
                return Self::FloodWait(seconds);
            }

        Self::Invocation(err_str)
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];

    for pattern in patterns {
        if let Some(idx) = err_msg.to_lowercase().find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = err_msg[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// Result of QR code authentication attempt.
#[derive(Debug, Clone)]
pub enum QrAuthResult {
    /// Got a token to display as QR code.
    Token {
        /// Raw token bytes (encode as base64 for URL).
        token: Vec<u8>,
        /// Unix timestamp when the token expires.
        expires: i32,
    },
    /// Need to migrate to another DC.
    MigrateTo {
        /// Target datacenter ID.
        dc_id: i32,
    },
    /// Authentication successful.
    Success {
        /// User ID of the authenticated user.
        user_id: i64,
        /// Username if available.
        username: Option<String>,
    },
    /// 2FA password is required.
    PasswordRequired,
}

/// High-level Telegram client wrapper.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Spacing for standalone sends (notifications, log lines).
    rate_limiter: RateLimiter,

    /// Chats seen in updates, keyed by dialog id.
    peers: RwLock<HashMap<i64, PeerRef>>,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram using the session stored at `session_path`.
    ///
    /// Returns the client together with its update stream.
    ///
    /// # Errors
    ///
    /// Returns an error if connection fails.
    pub async fn connect(
        session_path: &Path,
        api_id: i32,
        send_interval: Duration,
    ) -> Result<(Self, UpdateStream), TelegramError> {
        info!("Connecting to Telegram ({})...", session_path.display());

        let session = Arc::new(
            SqliteSession::open(session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        let stream = client.stream_updates(
            updates,
            UpdatesConfiguration {
                catch_up: false,
                update_queue_limit: Some(1024),
            },
        );

        let bot = Self {
            client,
            handle: handle.thin,
            rate_limiter: RateLimiter::new(send_interval),
            peers: RwLock::new(HashMap::new()),
            _pool_task: pool_task,
        };

        Ok((bot, stream))
    }

    /// Checks if the client is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn is_authorized(&self) -> Result<bool, TelegramError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))
    }

    /// Requests a login code to be sent to the phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn request_login_code(
        &self,
        phone: &str,
        api_hash: &str,
    ) -> Result<LoginToken, TelegramError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        self.client
            .request_login_code(phone, api_hash)
            .await
            .map_err(|e| TelegramError::SignInFailed(e.to_string()))
    }

    /// Signs in with the login code.
    ///
    /// # Errors
    ///
    /// Returns an error if sign in fails.
    pub async fn sign_in(&self, token: &LoginToken, code: &str) -> Result<(), TelegramError> {
        info!("Signing in with login code...");

        match self.client.sign_in(token, code).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                Ok(())
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!(
                    "2FA password required, hint: {:?}",
                    password_token.hint()
                );
                Err(TelegramError::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => {
                Err(TelegramError::SignInFailed("Invalid code".to_owned()))
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Checks the 2FA password.
    ///
    /// # Errors
    ///
    /// Returns an error if the password is invalid.
    pub async fn check_password(
        &self,
        password_token: PasswordToken,
        password: &str,
    ) -> Result<(), TelegramError> {
        info!("Checking 2FA password...");

        match self.client.check_password(password_token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA!");
                Ok(())
            }
            Err(SignInError::InvalidPassword(token)) => Err(TelegramError::InvalidPassword(token)),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Signs the assistant account in with a bot token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected.
    pub async fn bot_sign_in(&self, token: &str, api_hash: &str) -> Result<(), TelegramError> {
        info!("Signing in assistant bot...");

        self.client
            .bot_sign_in(token, api_hash)
            .await
            .map(|_| ())
            .map_err(|e| TelegramError::SignInFailed(e.to_string()))
    }

    /// Performs QR code authentication.
    ///
    /// Returns the login token bytes that should be displayed as a QR code.
    /// The QR code URL format is: `tg://login?token=BASE64_TOKEN`
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn export_login_token(
        &self,
        api_id: i32,
        api_hash: &str,
    ) -> Result<QrAuthResult, TelegramError> {
        debug!("Requesting QR login token...");

        let request = tl::functions::auth::ExportLoginToken {
            api_id,
            api_hash: api_hash.to_owned(),
            except_ids: vec![],
        };

        match self.client.invoke(&request).await {
            Ok(tl::enums::auth::LoginToken::Token(token)) => {
                debug!("Got login token, expires: {}", token.expires);
                Ok(QrAuthResult::Token {
                    token: token.token,
                    expires: token.expires,
                })
            }
            Ok(tl::enums::auth::LoginToken::MigrateTo(migrate)) => {
                debug!("Need to migrate to DC {}", migrate.dc_id);
                Ok(QrAuthResult::MigrateTo { dc_id: migrate.dc_id })
            }
            Ok(tl::enums::auth::LoginToken::Success(success)) => {
                debug!("QR login successful!");
                if let tl::enums::auth::Authorization::Authorization(auth) = success.authorization
                    && let tl::enums::User::User(user) = auth.user {
                        return Ok(QrAuthResult::Success {
                            user_id: user.id,
                            username: user.username,
                        });
                    }
                Ok(QrAuthResult::Success {
                    user_id: 0,
                    username: None,
                })
            }
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("SESSION_PASSWORD_NEEDED") {
                    return Ok(QrAuthResult::PasswordRequired);
                }
                Err(TelegramError::SignInFailed(err_str))
            }
        }
    }

    /// Returns the logged-in account.
    ///
    /// # Errors
    ///
    /// Returns an error if not authorized or the call fails.
    pub async fn me(&self) -> Result<UserInfo, TelegramError> {
        let me = self.client.get_me().await?;
        Ok(UserInfo {
            id: me.id().bare_id(),
            name: me.full_name(),
        })
    }

    /// Converts an inbound update into an [`IncomingMessage`], caching its chat.
    ///
    /// Returns `None` for messages without text. Outgoing messages are
    /// attributed to `owner_id`.
    pub async fn observe(&self, message: &Message, owner_id: i64) -> Option<IncomingMessage> {
        let text = message.text();
        if text.is_empty() {
            return None;
        }

        let Ok(peer) = message.peer() else {
            return None;
        };
        let chat_id = peer.id().bot_api_dialog_id();
        self.peers.write().await.insert(chat_id, PeerRef::from(peer));

        let sender_id = if message.outgoing() {
            owner_id
        } else {
            message.sender().map_or(chat_id, |s| s.id().bare_id())
        };

        Some(IncomingMessage {
            chat_id,
            message_id: message.id(),
            sender_id,
            text: text.to_owned(),
            reply_to: message.reply_to_message_id(),
            link: message_link(peer, message.id()),
            sent_at: message.date(),
        })
    }

    /// Looks a chat up in the cache, resolving it by id on a miss.
    async fn peer_ref(&self, chat_id: i64) -> Result<PeerRef, TelegramError> {
        if let Some(peer) = self.peers.read().await.get(&chat_id) {
            return Ok(*peer);
        }

        debug!("Resolving uncached chat {}", chat_id);
        let peer = self
            .client
            .resolve_peer(peer_ref_for_dialog(chat_id))
            .await
            .map_err(|_| TelegramError::PeerNotFound(chat_id))?;
        let peer_ref = PeerRef::from(&peer);
        self.peers.write().await.insert(chat_id, peer_ref);
        Ok(peer_ref)
    }

    async fn replied_message(&self, message: &IncomingMessage) -> Result<Message, TelegramError> {
        let reply_id = message.reply_to.ok_or(TelegramError::MessageNotFound)?;
        let peer = self.peer_ref(message.chat_id).await?;
        self.client
            .get_messages_by_id(peer, &[reply_id])
            .await?
            .into_iter()
            .flatten()
            .next()
            .ok_or(TelegramError::MessageNotFound)
    }

    /// Sends a standalone message, spaced by the rate limiter.
    async fn send_paced(&self, chat_id: i64, message: InputMessage) -> Result<(), TelegramError> {
        let peer = self.peer_ref(chat_id).await?;

        let waited = self.rate_limiter.wait_and_acquire().await;
        if !waited.is_zero() {
            debug!("Waited {:?} before sending to {}", waited, chat_id);
        }

        match self.client.send_message(peer, message).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err: TelegramError = e.into();
                if let TelegramError::FloodWait(seconds) = &err {
                    warn!("Flood wait triggered: {} seconds", seconds);
                    self.rate_limiter.handle_flood_wait(*seconds).await;
                }
                Err(err)
            }
        }
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

#[async_trait]
impl Messenger for TelegramBot {
    async fn edit(&self, message: &IncomingMessage, text: &str) -> Result<i32, TelegramError> {
        self.edit_status(
            StatusMessage {
                chat_id: message.chat_id,
                message_id: message.message_id,
            },
            text,
        )
        .await?;
        Ok(message.message_id)
    }

    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<i32, TelegramError> {
        let peer = self.peer_ref(message.chat_id).await?;
        let sent = self
            .client
            .send_message(
                peer,
                InputMessage::new()
                    .text(text)
                    .reply_to(Some(message.message_id)),
            )
            .await?;
        Ok(sent.id())
    }

    async fn edit_status(&self, status: StatusMessage, text: &str) -> Result<(), TelegramError> {
        let peer = self.peer_ref(status.chat_id).await?;
        self.client
            .edit_message(peer, status.message_id, InputMessage::new().text(text))
            .await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        debug!("Sending to {}: \"{}\"", chat_id, truncate_for_log(text, 30));
        self.send_paced(chat_id, InputMessage::new().text(text)).await
    }

    async fn send_html(&self, chat_id: i64, html: &str) -> Result<(), TelegramError> {
        debug!("Sending HTML to {}: \"{}\"", chat_id, truncate_for_log(html, 30));
        self.send_paced(chat_id, InputMessage::new().html(html)).await
    }

    async fn reply_sender(
        &self,
        message: &IncomingMessage,
    ) -> Result<Option<UserInfo>, TelegramError> {
        if message.reply_to.is_none() {
            return Ok(None);
        }
        let replied = self.replied_message(message).await?;
        Ok(replied.sender().map(user_info))
    }

    async fn resolve_user(&self, query: &str) -> Result<Option<UserInfo>, TelegramError> {
        let query = query.trim();

        if let Some(id) = parse_user_id(query) {
            let peer = match self.peer_ref(id).await {
                Ok(peer) => peer,
                Err(TelegramError::PeerNotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            };
            let resolved = self.client.resolve_peer(peer).await?;
            return Ok(Some(user_info(&resolved)));
        }

        let username = query
            .trim_start_matches("https://t.me/")
            .trim_start_matches('@');
        if username.is_empty() {
            return Ok(None);
        }
        let peer = self.client.resolve_username(username).await?;
        Ok(peer.as_ref().map(user_info))
    }

    async fn download_reply_media(
        &self,
        message: &IncomingMessage,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, TelegramError> {
        let replied = self.replied_message(message).await?;
        let media = replied.media().ok_or(TelegramError::NoMedia)?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| TelegramError::Download(e.to_string()))?;
        let path = dir.join(format!("{}_{}", message.chat_id, replied.id()));

        info!("Downloading media to {}", path.display());

        tokio::select! {
            result = self.client.download_media(&media, &path) => {
                result.map_err(|e| TelegramError::Download(e.to_string()))?;
                Ok(path)
            }
            () = cancel.cancelled() => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!("No partial download to remove: {}", e);
                }
                Err(TelegramError::Cancelled)
            }
        }
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

fn user_info(peer: &Peer) -> UserInfo {
    UserInfo {
        id: peer.id().bare_id(),
        name: peer.name().unwrap_or_default().to_owned(),
    }
}

/// Deep link to a message in a channel or supergroup.
fn message_link(peer: &Peer, message_id: i32) -> Option<String> {
    match peer {
        Peer::Channel(_) => Some(match peer.username() {
            Some(username) => format!("https://t.me/{username}/{message_id}"),
            None => format!("https://t.me/c/{}/{message_id}", peer.id().bare_id()),
        }),
        _ => None,
    }
}

/// Builds an unauthenticated reference from a bot-API dialog id.
fn peer_ref_for_dialog(dialog_id: i64) -> PeerRef {
    let id = if dialog_id > 0 {
        PeerId::user(dialog_id)
    } else if dialog_id <= -(CHANNEL_ID_OFFSET + 1) {
        PeerId::channel(-dialog_id - CHANNEL_ID_OFFSET)
    } else {
        PeerId::chat(-dialog_id)
    };
    PeerRef {
        id,
        auth: PeerAuth::default(),
    }
}

/// Parses a numeric user id or a `tg://user?id=` link.
pub(crate) fn parse_user_id(query: &str) -> Option<i64> {
    let digits = query.strip_prefix("tg://user?id=").unwrap_or(query);
    digits.parse().ok().filter(|id: &i64| *id > 0)
}

/// Masks a phone number for logging (shows last 4 digits).
fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}

/// Truncates a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}
