//! Reminder commands. All are owner-only.

use chrono::Utc;
use tracing::warn;

use crate::commands::{CommandContext, CommandError, Handler};
use crate::scheduler::{ReminderError, format_duration_human, parse_duration};

const MODULE: &str = "Reminders";

pub fn handlers() -> Vec<Handler> {
    vec![
        Handler::new(
            MODULE,
            "remind",
            "Set a reminder (e.g. remind 1h30m Buy groceries)",
            remind,
        )
        .owner_only(),
        Handler::new(MODULE, "reminders", "List your reminders", list).owner_only(),
        Handler::new(MODULE, "delreminder", "Delete a reminder by index", delete).owner_only(),
        Handler::new(MODULE, "clearreminders", "Clear all your reminders", clear).owner_only(),
    ]
}

/// Locale key describing a reminder failure.
fn error_key(err: &ReminderError) -> &'static str {
    match err {
        ReminderError::InvalidDuration(_) | ReminderError::Overflow => "reminders.invalid_duration",
        ReminderError::TooLong => "reminders.too_long",
        ReminderError::TooShort => "reminders.too_short",
        ReminderError::LimitReached => "reminders.limit_reached",
        ReminderError::TextTooLong => "reminders.text_too_long",
        ReminderError::NotFound(_) => "reminders.not_found",
        ReminderError::Store(_) => "reminders.error",
    }
}

/// Answers with the message for `err`. Only store failures propagate.
async fn report(ctx: &CommandContext, err: ReminderError) -> Result<(), CommandError> {
    ctx.respond_tr(error_key(&err), &[]).await?;
    match err {
        ReminderError::Store(_) => Err(err.into()),
        _ => Ok(()),
    }
}

async fn remind(ctx: CommandContext) -> Result<(), CommandError> {
    let fields: Vec<&str> = ctx.args.split_whitespace().collect();
    let [duration, words @ ..] = fields.as_slice() else {
        ctx.respond_tr("reminders.usage", &[]).await?;
        return Ok(());
    };
    if words.is_empty() {
        ctx.respond_tr("reminders.usage", &[]).await?;
        return Ok(());
    }

    let delay = match parse_duration(duration) {
        Ok(delay) => delay,
        Err(e) => return report(&ctx, e).await,
    };
    let text = words.join(" ");

    let created = ctx
        .app
        .reminders
        .create(ctx.message.link.clone(), &text, delay, Utc::now())
        .await;

    match created {
        Ok(_) => {
            ctx.respond_tr(
                "reminders.created",
                &[("duration", &format_duration_human(delay)), ("text", &text)],
            )
            .await?;
            Ok(())
        }
        Err(e) => report(&ctx, e).await,
    }
}

async fn list(ctx: CommandContext) -> Result<(), CommandError> {
    let reminders = match ctx.app.reminders.list().await {
        Ok(reminders) => reminders,
        Err(e) => return report(&ctx, e).await,
    };

    if reminders.is_empty() {
        ctx.respond_tr("reminders.none", &[]).await?;
        return Ok(());
    }

    let now = Utc::now();
    let pending = ctx.tr("reminders.pending");
    let mut text = ctx.tr("reminders.list_header");
    text.push_str("\n\n");

    for (i, reminder) in reminders.iter().enumerate() {
        let index = (i + 1).to_string();
        let time = reminder
            .time_left(now)
            .map_or_else(|| pending.clone(), format_duration_human);
        let line = match &reminder.message_link {
            Some(link) => ctx.trf(
                "reminders.list_entry_link",
                &[("index", &index), ("text", &reminder.text), ("time", &time), ("link", link)],
            ),
            None => ctx.trf(
                "reminders.list_entry",
                &[("index", &index), ("text", &reminder.text), ("time", &time)],
            ),
        };
        text.push_str(&line);
        text.push('\n');
    }

    ctx.respond(text.trim_end()).await?;
    Ok(())
}

async fn delete(ctx: CommandContext) -> Result<(), CommandError> {
    let arg = ctx.args.trim();
    if arg.is_empty() {
        ctx.respond_tr("reminders.usage_delreminder", &[]).await?;
        return Ok(());
    }

    let Some(position) = arg.parse::<usize>().ok().filter(|p| *p >= 1) else {
        ctx.respond_tr("reminders.invalid_index", &[]).await?;
        return Ok(());
    };

    match ctx.app.reminders.delete_at(position).await {
        Ok(_) => {
            ctx.respond_tr("reminders.deleted", &[]).await?;
            Ok(())
        }
        Err(e) => report(&ctx, e).await,
    }
}

async fn clear(ctx: CommandContext) -> Result<(), CommandError> {
    if let Err(e) = ctx.app.reminders.clear().await {
        warn!("Failed to clear reminders: {}", e);
        return report(&ctx, e).await;
    }
    ctx.respond_tr("reminders.cleared", &[]).await?;
    Ok(())
}
