//! Raw access to stored variables.

use tracing::info;

use crate::commands::{CommandContext, CommandError, Handler};
use crate::store::keys;

const MODULE: &str = "Database";

pub fn handlers() -> Vec<Handler> {
    vec![
        Handler::new(MODULE, "setvar", "Set a database variable", set_var),
        Handler::new(MODULE, "getvar", "Get a database variable", get_var),
        Handler::new(MODULE, "delvar", "Delete a database variable", del_var),
        Handler::new(MODULE, "vars", "List all database variables", list_vars),
        Handler::new(
            MODULE,
            "delallvars",
            "Delete all variables (requires confirm)",
            del_all_vars,
        )
        .owner_only(),
    ]
}

async fn set_var(ctx: CommandContext) -> Result<(), CommandError> {
    let Some((key, value)) = ctx.args.split_once(' ') else {
        ctx.respond_tr("database.usage_setvar", &[]).await?;
        return Ok(());
    };
    let key = key.trim().to_uppercase();
    let value = value.trim();

    if key.is_empty() || value.is_empty() {
        ctx.respond_tr("database.key_value_required", &[]).await?;
        return Ok(());
    }

    if key == keys::SUDOS {
        ctx.respond_tr("database.sudos_protected", &[]).await?;
        return Ok(());
    }

    if let Err(e) = ctx.app.store.set(&key, value).await {
        ctx.respond_tr("database.set_error", &[("error", &e.to_string())])
            .await?;
        return Err(e.into());
    }
    info!("Variable {} updated", key);

    let mut text = ctx.trf("database.set_success", &[("key", &key), ("value", value)]);
    if key == keys::CMD_HANDLER {
        text.push('\n');
        text.push_str(&ctx.tr("database.prefix_note"));
    }
    ctx.respond(&text).await?;
    Ok(())
}

async fn get_var(ctx: CommandContext) -> Result<(), CommandError> {
    let key = ctx.args.trim().to_uppercase();
    if key.is_empty() {
        ctx.respond_tr("database.usage_getvar", &[]).await?;
        return Ok(());
    }

    // Set-valued keys read as absent.
    let value = ctx.app.store.get(&key).await.ok().flatten().unwrap_or_default();
    if value.is_empty() {
        ctx.respond_tr("database.get_not_found", &[]).await?;
        return Ok(());
    }

    ctx.respond_tr("database.get_result", &[("key", &key), ("value", &value)])
        .await?;
    Ok(())
}

async fn del_var(ctx: CommandContext) -> Result<(), CommandError> {
    let key = ctx.args.trim().to_uppercase();
    if key.is_empty() {
        ctx.respond_tr("database.usage_delvar", &[]).await?;
        return Ok(());
    }

    if !ctx.app.store.exists(&key).await.unwrap_or(false) {
        ctx.respond_tr("database.del_not_found", &[]).await?;
        return Ok(());
    }

    if let Err(e) = ctx.app.store.delete(&key).await {
        ctx.respond_tr("database.del_error", &[("error", &e.to_string())])
            .await?;
        return Err(e.into());
    }

    if key == keys::SUDOS {
        ctx.app.permissions.reload(ctx.app.store.as_ref()).await?;
    }

    ctx.respond_tr("database.del_success", &[("key", &key)]).await?;
    Ok(())
}

async fn list_vars(ctx: CommandContext) -> Result<(), CommandError> {
    let mut keys = match ctx.app.store.keys("*").await {
        Ok(keys) => keys,
        Err(e) => {
            ctx.respond_tr("database.fetch_error", &[]).await?;
            return Err(e.into());
        }
    };

    if keys.is_empty() {
        ctx.respond_tr("database.list_empty", &[]).await?;
        return Ok(());
    }
    keys.sort();

    let entries: Vec<String> = keys
        .iter()
        .map(|key| ctx.trf("database.list_entry", &[("key", key)]))
        .collect();
    let text = format!(
        "{}\n\n{}",
        ctx.trf("database.list_header", &[("count", &keys.len().to_string())]),
        entries.join("\n")
    );
    ctx.respond(&text).await?;
    Ok(())
}

async fn del_all_vars(ctx: CommandContext) -> Result<(), CommandError> {
    if ctx.args.trim() != "confirm" {
        ctx.respond_tr("database.del_all_warning", &[]).await?;
        return Ok(());
    }

    if let Err(e) = ctx.app.store.flush_all().await {
        ctx.respond_tr("database.del_all_error", &[]).await?;
        return Err(e.into());
    }

    info!("All variables deleted");
    ctx.app.permissions.reload(ctx.app.store.as_ref()).await?;
    ctx.respond_tr("database.del_all_success", &[]).await?;
    Ok(())
}
