//! `help` command.

use crate::commands::{CommandContext, CommandError, Handler, format_module_help};

const MODULE: &str = "Core";

pub fn handlers() -> Vec<Handler> {
    vec![Handler::new(
        MODULE,
        "help",
        "Show help menu or search modules/commands",
        help,
    )]
}

async fn help(ctx: CommandContext) -> Result<(), CommandError> {
    let query = ctx.args.trim();
    let index = &ctx.app.help;

    if query.is_empty() {
        let mut text = ctx.tr("help.menu_title");
        text.push_str("\n\n");
        for module in index.module_names() {
            text.push_str(&ctx.trf("help.module_entry", &[("module", module)]));
            text.push('\n');
        }
        text.push('\n');
        text.push_str(&ctx.trf("help.usage_hint", &[("prefix", &ctx.app.prefix)]));
        ctx.respond(&text).await?;
        return Ok(());
    }

    match index.lookup(query) {
        Some((module, handlers)) => {
            let text = format_module_help(&ctx.app.locales, &ctx.lang, module, handlers);
            ctx.respond(&text).await?;
        }
        None => {
            ctx.respond_tr("help.module_not_found", &[]).await?;
        }
    }
    Ok(())
}
