//! Bot language selection.

use tracing::info;

use crate::commands::{CommandContext, CommandError, Handler};
use crate::locale::{DEFAULT_LANGUAGE, fill};
use crate::store::{get_or_empty, keys};

const MODULE: &str = "Language";

pub fn handlers() -> Vec<Handler> {
    vec![
        Handler::new(MODULE, "setlang", "Set the bot language", set_lang).owner_only(),
        Handler::new(MODULE, "lang", "Show the current language", current_lang),
    ]
}

async fn set_lang(ctx: CommandContext) -> Result<(), CommandError> {
    let locales = &ctx.app.locales;
    let code = ctx.args.trim().to_lowercase();

    if code.is_empty() {
        let mut text = ctx.tr("lang_settings.available_header");
        for lang in locales.available() {
            text.push_str(&ctx.trf(
                "lang_settings.available_entry",
                &[("code", &lang), ("name", &locales.language_name(&lang))],
            ));
        }
        text.push_str(&ctx.tr("lang_settings.usage"));
        ctx.respond(&text).await?;
        return Ok(());
    }

    if !locales.has_language(&code) {
        ctx.respond_tr("lang_settings.not_found", &[("code", &code)])
            .await?;
        return Ok(());
    }

    if let Err(e) = ctx.app.store.set(keys::BOT_LANGUAGE, &code).await {
        ctx.respond_tr("lang_settings.set_error", &[]).await?;
        return Err(e.into());
    }
    locales.set_active(&code);
    info!("Bot language set to {}", code);

    // Confirm in the language just selected.
    let text = fill(
        &locales.tr_lang(&code, "lang_settings.changed"),
        &[("name", &locales.language_name(&code)), ("code", &code)],
    );
    ctx.respond(&text).await?;
    Ok(())
}

async fn current_lang(ctx: CommandContext) -> Result<(), CommandError> {
    let locales = &ctx.app.locales;
    let stored = get_or_empty(ctx.app.store.as_ref(), keys::BOT_LANGUAGE).await;
    let code = if locales.has_language(&stored) {
        stored
    } else {
        DEFAULT_LANGUAGE.to_owned()
    };

    ctx.respond_tr(
        "lang_settings.current",
        &[("name", &locales.language_name(&code)), ("code", &code)],
    )
    .await?;
    Ok(())
}
