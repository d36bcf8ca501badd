//! Log chat configuration and the forwarding switch. The log chat receives
//! reminder notifications and forwarded warnings.

use tracing::{info, warn};

use crate::log_forward::LIFECYCLE;

use crate::commands::{CommandContext, CommandError, Handler};
use crate::store::{get_or_empty, keys};

const MODULE: &str = "Logging";

pub fn handlers() -> Vec<Handler> {
    vec![
        Handler::new(MODULE, "setlog", "Set the log chat", set_log).owner_only(),
        Handler::new(MODULE, "getlog", "Show the log chat", get_log),
        Handler::new(MODULE, "dellog", "Remove the log chat", del_log).owner_only(),
        Handler::new(MODULE, "logging", "Turn log forwarding on or off", toggle)
            .owner_only(),
    ]
}

async fn set_log(ctx: CommandContext) -> Result<(), CommandError> {
    let arg = ctx.args.trim();
    if arg.is_empty() {
        ctx.respond_tr("logging.usage_setlog", &[]).await?;
        return Ok(());
    }
    let Ok(chat_id) = arg.parse::<i64>() else {
        ctx.respond_tr("logging.invalid_chat", &[]).await?;
        return Ok(());
    };
    let chat = chat_id.to_string();
    let confirmation = ctx.trf("logging.log_set_success", &[("chat_id", &chat)]);

    // The assistant must be able to post there.
    if let Err(e) = ctx.app.assistant.send_text(chat_id, &confirmation).await {
        warn!("Assistant cannot post to {}: {}", chat_id, e);
        ctx.respond_tr("logging.assistant_not_in_chat", &[]).await?;
        return Ok(());
    }

    if let Err(e) = ctx.app.store.set(keys::LOG_CHAT, &chat).await {
        ctx.respond_tr("logging.store_error", &[]).await?;
        return Err(e.into());
    }
    info!(target: LIFECYCLE, event = "LOG_CHAT", "Log chat set to {}", chat_id);

    ctx.respond(&confirmation).await?;
    Ok(())
}

async fn get_log(ctx: CommandContext) -> Result<(), CommandError> {
    let chat = get_or_empty(ctx.app.store.as_ref(), keys::LOG_CHAT).await;
    if chat.is_empty() {
        ctx.respond_tr("logging.not_set", &[]).await?;
    } else {
        ctx.respond_tr("logging.log_result", &[("chat_id", &chat)])
            .await?;
    }
    Ok(())
}

async fn del_log(ctx: CommandContext) -> Result<(), CommandError> {
    if !ctx.app.store.exists(keys::LOG_CHAT).await? {
        ctx.respond_tr("logging.not_set", &[]).await?;
        return Ok(());
    }
    ctx.app.store.delete(keys::LOG_CHAT).await?;
    info!("Log chat removed");
    ctx.respond_tr("logging.deleted", &[]).await?;
    Ok(())
}

async fn toggle(ctx: CommandContext) -> Result<(), CommandError> {
    let enabled = match ctx.args.trim().to_lowercase().as_str() {
        "on" | "enable" => true,
        "off" | "disable" => false,
        _ => {
            ctx.respond_tr("logging.usage_toggle", &[]).await?;
            return Ok(());
        }
    };
    ctx.app.log_switch.set(enabled);
    info!("Log forwarding {}", if enabled { "enabled" } else { "disabled" });

    let key = if enabled { "logging.enabled" } else { "logging.disabled" };
    ctx.respond_tr(key, &[]).await?;
    Ok(())
}
