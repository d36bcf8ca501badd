//! Pocket Userbot - Main Entry Point
//!
//! Runs a Telegram user account as a command-driven assistant with
//! reminders, sudoers and key-value settings.

use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clap::Parser;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use dialoguer::{Input, Password};
use qrcode::QrCode;
use qrcode::render::unicode;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use pocket_userbot::app::App;
use pocket_userbot::commands::{CancelRegistry, ModuleRegistry, PermissionGate};
use pocket_userbot::config::{BotSettings, TelegramConfig};
use pocket_userbot::locale::Locales;
use pocket_userbot::log_forward::{self, LIFECYCLE, LogForwarder, LogLine, LogSwitch};
use pocket_userbot::modules::{self, inline_help};
use pocket_userbot::scheduler::{ReminderBook, ReminderScheduler, SchedulerDeps};
use pocket_userbot::store::{KvStore, MemoryStore, RedisStore, get_or_empty, keys};
use pocket_userbot::telegram::{
    self, Messenger, QrAuthResult, TelegramBot, TelegramError, Update, UpdateStream,
};

/// Spacing between standalone sends of one account.
const SEND_INTERVAL: Duration = Duration::from_secs(1);

/// Delay between QR login polls.
const QR_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Telegram userbot with commands, reminders and sudoers.
#[derive(Parser, Debug)]
#[command(name = "pocket_userbot")]
#[command(about = "Run your Telegram account as a command-driven assistant")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Sign in by scanning a QR code instead of entering a phone number.
    #[arg(long)]
    qr_login: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();
    let args = Args::parse();

    let log_switch = LogSwitch::default();
    let log_lines = init_logging(&args.log_level, log_switch.clone());

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;
    let settings = BotSettings::from_env_with_defaults();

    let store = open_store(&settings).await;

    let locales = Arc::new(Locales::bundled().context("Failed to load bundled locales")?);
    let bot_language = get_or_empty(store.as_ref(), keys::BOT_LANGUAGE).await;
    if !bot_language.is_empty() && !locales.set_active(&bot_language) {
        warn!("Stored language {} is not available", bot_language);
    }

    // User account
    let (bot, mut updates) =
        TelegramBot::connect(&tg_config.session_path, tg_config.api_id, SEND_INTERVAL)
            .await
            .context("Failed to connect to Telegram")?;

    if !bot.is_authorized().await.context("Failed to check authorization")? {
        if args.qr_login {
            qr_authenticate(&bot, &tg_config).await?;
        } else {
            authenticate(&bot, &tg_config).await?;
        }
    }

    let owner = bot.me().await.context("Failed to fetch the logged-in account")?;
    info!("Signed in as {} ({})", owner.name, owner.id);
    let bot = Arc::new(bot);

    let (assistant, assistant_updates) = connect_assistant(&tg_config, &bot).await?;

    let stored_prefix = get_or_empty(store.as_ref(), keys::CMD_HANDLER).await;
    let prefix = settings.effective_prefix(&stored_prefix);

    let permissions = PermissionGate::load(owner.id, store.as_ref()).await;

    let mut registry = ModuleRegistry::new(&prefix);
    modules::load_all(&mut registry).context("Failed to register command routes")?;
    let (router, help) = registry.finish();

    let reminders = Arc::new(ReminderBook::new(Arc::clone(&store)));
    let messenger: Arc<dyn Messenger> = bot.clone();

    let app = Arc::new(App {
        owner: owner.clone(),
        prefix: prefix.clone(),
        store: Arc::clone(&store),
        locales: Arc::clone(&locales),
        permissions,
        help,
        messenger,
        assistant: Arc::clone(&assistant),
        reminders: Arc::clone(&reminders),
        cancels: CancelRegistry::new(),
        download_dir: settings.download_dir.clone(),
        started_at: Instant::now(),
        log_switch,
    });

    let tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    tracker.spawn(
        LogForwarder::new(Arc::clone(&assistant), Arc::clone(&store), owner.id)
            .run(log_lines, shutdown.clone()),
    );
    if let Some(updates) = assistant_updates {
        tracker.spawn(serve_assistant(Arc::clone(&app), updates, shutdown.clone()));
    }

    let scheduler = ReminderScheduler::new(SchedulerDeps {
        book: reminders,
        store,
        locales: Arc::clone(&locales),
        sender: assistant,
        owner_id: owner.id,
    })
    .with_poll_interval(settings.reminder_poll_interval());
    scheduler.start();

    info!("Command prefix: {}", prefix);
    info!(
        target: LIFECYCLE,
        event = "STARTUP",
        "{}",
        pocket_userbot::locale::fill(
            &locales.tr("system.started"),
            &[("elapsed", &format!("{:.2}s", started.elapsed().as_secs_f64()))],
        )
    );
    info!("Bot is running. Use Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            update = updates.next() => {
                let update = match update {
                    Ok(update) => update,
                    Err(e) => {
                        error!("Update stream failed: {}", e);
                        break;
                    }
                };
                let Update::NewMessage(message) = update else {
                    continue;
                };
                let Some(incoming) = bot.observe(&message, owner.id).await else {
                    continue;
                };
                for invocation in router.dispatch(&app, &incoming).await {
                    debug!("Running {}", invocation.command());
                    tracker.spawn(invocation.run());
                }
            }
        }
    }

    // Cleanup
    info!(target: LIFECYCLE, event = "SHUTDOWN", "Shutting down...");
    if let Some(handle) = scheduler.stop()
        && let Err(e) = handle.await
    {
        warn!("Reminder scheduler ended abnormally: {}", e);
    }
    shutdown.cancel();
    tracker.close();
    tracker.wait().await;
    bot.disconnect();

    Ok(())
}

/// Initializes the logging subsystem.
///
/// Returns the queue of lines to forward to the log chat.
fn init_logging(level: &str, switch: LogSwitch) -> UnboundedReceiver<LogLine> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (forward, lines) = log_forward::forward_layer(switch);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(forward)
        .init();
    lines
}

/// Opens Redis when `DB_URL` is set, otherwise an in-memory store.
async fn open_store(settings: &BotSettings) -> Arc<dyn KvStore> {
    let Some(url) = settings.db_url.as_deref() else {
        warn!("DB_URL is not set; state is kept in memory and lost on exit");
        return Arc::new(MemoryStore::new());
    };
    match RedisStore::connect(url).await {
        Ok(store) => {
            info!("Connected to Redis");
            Arc::new(store)
        }
        Err(e) => {
            warn!("Failed to connect to Redis ({}); using memory store", e);
            Arc::new(MemoryStore::new())
        }
    }
}

/// Signs in the companion bot, or falls back to the user account.
///
/// Only a companion bot yields updates, for inline help.
async fn connect_assistant(
    config: &TelegramConfig,
    user: &Arc<TelegramBot>,
) -> Result<(Arc<dyn Messenger>, Option<UpdateStream>)> {
    let Some(token) = config.bot_token.as_deref() else {
        info!("No bot token set; the user account sends notifications");
        let assistant: Arc<dyn Messenger> = user.clone();
        return Ok((assistant, None));
    };

    let (assistant, updates) =
        TelegramBot::connect(&config.bot_session_path, config.api_id, SEND_INTERVAL)
            .await
            .context("Failed to connect the assistant bot")?;

    if !assistant.is_authorized().await? {
        assistant
            .bot_sign_in(token, &config.api_hash)
            .await
            .context("Assistant bot sign-in failed")?;
    }

    let me = assistant.me().await.context("Failed to fetch the assistant account")?;
    info!("Assistant bot: {} ({})", me.name, me.id);
    Ok((Arc::new(assistant), Some(updates)))
}

/// Answers inline help queries and menu buttons until `shutdown`.
async fn serve_assistant(app: Arc<App>, mut updates: UpdateStream, shutdown: CancellationToken) {
    loop {
        let update = tokio::select! {
            () = shutdown.cancelled() => break,
            update = updates.next() => update,
        };
        match update {
            Ok(Update::InlineQuery(query)) => {
                let Some(sender) = telegram::inline_sender(&query) else {
                    continue;
                };
                let article = inline_help::inline_answer(&app, sender, query.text()).await;
                if let Err(e) = telegram::answer_inline(&query, article).await {
                    warn!("Failed to answer inline query: {}", e);
                }
            }
            Ok(Update::CallbackQuery(query)) => {
                let Some(sender) = telegram::callback_sender(&query) else {
                    continue;
                };
                let data = telegram::callback_data(&query).unwrap_or_default();
                let reply = inline_help::callback_reply(&app, sender, data).await;
                if let Err(e) = telegram::answer_callback(&query, reply).await {
                    warn!("Failed to answer help button: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("Assistant update stream failed: {}", e);
                break;
            }
        }
    }
}

/// Handles Telegram authentication.
async fn authenticate(bot: &TelegramBot, config: &TelegramConfig) -> Result<()> {
    info!("Authentication required");

    let phone: String = Input::new()
        .with_prompt("Enter your phone number (with country code)")
        .interact_text()?;

    let token = bot
        .request_login_code(&phone, &config.api_hash)
        .await
        .context("Failed to request login code")?;

    info!("Login code sent to your Telegram app");

    let code: String = Input::new()
        .with_prompt("Enter the login code")
        .interact_text()?;

    match bot.sign_in(&token, &code).await {
        Ok(()) => {
            info!("Successfully signed in!");
            Ok(())
        }
        Err(TelegramError::PasswordRequired(password_token)) => {
            info!("Two-factor authentication is enabled");

            let hint = password_token.hint().unwrap_or("no hint");
            info!("Password hint: {}", hint);

            let password: String = Password::new()
                .with_prompt("Enter your 2FA password")
                .interact()?;

            bot.check_password(password_token, &password)
                .await
                .context("2FA authentication failed")?;

            info!("Successfully signed in with 2FA!");
            Ok(())
        }
        Err(e) => Err(e).context("Authentication failed"),
    }
}

/// Signs in by showing a login QR code until it is scanned.
///
/// Accounts with a 2FA password continue with the phone flow.
async fn qr_authenticate(bot: &TelegramBot, config: &TelegramConfig) -> Result<()> {
    info!("QR authentication requested");

    let mut shown: Option<Vec<u8>> = None;
    loop {
        match bot.export_login_token(config.api_id, &config.api_hash).await? {
            QrAuthResult::Token { token, expires } => {
                if shown.as_ref() != Some(&token) {
                    show_qr(&token, expires)?;
                    shown = Some(token);
                }
                tokio::time::sleep(QR_POLL_INTERVAL).await;
            }
            QrAuthResult::Success { user_id, username } => {
                info!(
                    "Signed in by QR as {} ({})",
                    username.as_deref().unwrap_or("unknown"),
                    user_id
                );
                return Ok(());
            }
            QrAuthResult::PasswordRequired => {
                warn!("The account has a 2FA password; continuing with phone login");
                return authenticate(bot, config).await;
            }
            QrAuthResult::MigrateTo { dc_id } => {
                bail!("QR login needs data center {dc_id}; sign in with a phone number instead");
            }
        }
    }
}

fn show_qr(token: &[u8], expires: i32) -> Result<()> {
    let url = format!("tg://login?token={}", URL_SAFE_NO_PAD.encode(token));
    let code = QrCode::new(url.as_bytes()).context("Failed to encode login QR code")?;
    let rendered = code
        .render::<unicode::Dense1x2>()
        .quiet_zone(true)
        .build();

    execute!(stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
    println!("{rendered}");
    println!("Scan with Telegram: Settings > Devices > Link Desktop Device");
    debug!("Login token expires at {}", expires);
    Ok(())
}
