//! Sudoer management.

use tracing::warn;

use crate::commands::{CommandContext, CommandError, Handler};
use crate::telegram::UserInfo;

const MODULE: &str = "Sudoers";

pub fn handlers() -> Vec<Handler> {
    vec![
        Handler::new(MODULE, "addsudo", "Add user as sudo", add).owner_only(),
        Handler::new(MODULE, "delsudo", "Remove user from sudo", remove).owner_only(),
        Handler::new(MODULE, "listsudo", "List all sudos", list),
    ]
}

/// The user a command targets: the replied-to sender, else the first argument.
async fn target_user(ctx: &CommandContext) -> Result<Option<UserInfo>, CommandError> {
    if ctx.message.reply_to.is_some()
        && let Some(user) = ctx.app.messenger.reply_sender(&ctx.message).await?
    {
        return Ok(Some(user));
    }

    match ctx.args.split_whitespace().next() {
        Some(query) => Ok(ctx.app.messenger.resolve_user(query).await?),
        None => Ok(None),
    }
}

async fn add(ctx: CommandContext) -> Result<(), CommandError> {
    let status = ctx.respond_tr("sudo.adding", &[]).await?;

    let user = match target_user(&ctx).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            ctx.update(status, &ctx.tr("sudo.usage_add")).await?;
            return Ok(());
        }
        Err(e) => {
            ctx.update(status, &ctx.tr("sudo.usage_add")).await?;
            return Err(e);
        }
    };

    if user.id == ctx.app.owner.id {
        ctx.update(status, &ctx.tr("sudo.owner_is_sudo")).await?;
        return Ok(());
    }

    let app = &ctx.app;
    match app.permissions.add_sudoer(app.store.as_ref(), user.id).await {
        Ok(true) => {
            let id = user.id.to_string();
            let text = ctx.trf("sudo.added", &[("name", &user.name), ("user_id", &id)]);
            ctx.update(status, &text).await?;
            Ok(())
        }
        Ok(false) => {
            ctx.update(status, &ctx.tr("sudo.already_sudo")).await?;
            Ok(())
        }
        Err(e) => {
            ctx.update(status, &ctx.tr("sudo.add_error")).await?;
            Err(e.into())
        }
    }
}

async fn remove(ctx: CommandContext) -> Result<(), CommandError> {
    let status = ctx.respond_tr("sudo.deleting", &[]).await?;

    let user = match target_user(&ctx).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            ctx.update(status, &ctx.tr("sudo.usage_del")).await?;
            return Ok(());
        }
        Err(e) => {
            ctx.update(status, &ctx.tr("sudo.usage_del")).await?;
            return Err(e);
        }
    };

    let app = &ctx.app;
    match app.permissions.remove_sudoer(app.store.as_ref(), user.id).await {
        Ok(true) => {
            let id = user.id.to_string();
            let text = ctx.trf("sudo.deleted", &[("name", &user.name), ("user_id", &id)]);
            ctx.update(status, &text).await?;
            Ok(())
        }
        Ok(false) => {
            ctx.update(status, &ctx.tr("sudo.not_sudo")).await?;
            Ok(())
        }
        Err(e) => {
            ctx.update(status, &ctx.tr("sudo.del_error")).await?;
            Err(e.into())
        }
    }
}

async fn list(ctx: CommandContext) -> Result<(), CommandError> {
    let sudoers = ctx.app.permissions.sudoers();

    let mut text = ctx.trf("sudo.list_header", &[("count", &sudoers.len().to_string())]);
    for id in sudoers {
        let id = id.to_string();
        let name = match ctx.app.messenger.resolve_user(&id).await {
            Ok(Some(user)) => user.name,
            Ok(None) => id.clone(),
            Err(e) => {
                warn!("Failed to resolve sudoer {}: {}", id, e);
                id.clone()
            }
        };
        text.push('\n');
        text.push_str(&ctx.trf("sudo.list_entry", &[("name", &name), ("user_id", &id)]));
    }

    ctx.respond(&text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::store::{KvStore, keys};
    use crate::testing::{OWNER_ID, TestApp, reply_from};

    #[tokio::test]
    async fn test_add_by_username_and_id() {
        let h = TestApp::new().build().await;
        h.messenger.add_user(55, "Alice", Some("alice"));
        h.messenger.add_user(66, "Bob", None);

        let text = h.run(OWNER_ID, ".addsudo @alice").await;
        assert_eq!(text, "Added Alice (55) as sudoer.");
        assert_eq!(h.run(OWNER_ID, ".addsudo tg://user?id=66").await, "Added Bob (66) as sudoer.");
        assert_eq!(h.run(OWNER_ID, ".addsudo 55").await, h.tr("sudo.already_sudo"));

        assert!(h.app.permissions.is_sudoer(55));
        assert!(h.store.set_is_member(keys::SUDOS, "66").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_by_reply() {
        let h = TestApp::new().build().await;
        h.messenger.set_reply_sender(3, 88, "Carol");

        h.run_message(&reply_from(OWNER_ID, ".addsudo", 3)).await;
        assert_eq!(h.messenger.last_text(), "Added Carol (88) as sudoer.");
    }

    #[tokio::test]
    async fn test_add_rejects_owner_and_unknown() {
        let h = TestApp::new().build().await;
        h.messenger.add_user(OWNER_ID, "Owner", Some("me"));

        assert_eq!(h.run(OWNER_ID, ".addsudo @me").await, h.tr("sudo.owner_is_sudo"));
        assert_eq!(h.run(OWNER_ID, ".addsudo @nobody").await, h.tr("sudo.usage_add"));
        assert_eq!(h.run(OWNER_ID, ".addsudo").await, h.tr("sudo.usage_add"));
    }

    #[tokio::test]
    async fn test_new_sudoer_gains_access_immediately() {
        let h = TestApp::new().build().await;
        h.messenger.add_user(55, "Alice", Some("alice"));

        h.run(55, ".listsudo").await;
        assert!(h.messenger.log().is_empty());

        h.run(OWNER_ID, ".addsudo 55").await;
        let text = h.run(55, ".listsudo").await;
        assert_eq!(text, "Sudoers (1):\n• Alice (55)");
    }

    #[tokio::test]
    async fn test_remove() {
        let h = TestApp::new().sudoers(&[55]).build().await;
        h.messenger.add_user(55, "Alice", None);

        assert_eq!(h.run(OWNER_ID, ".delsudo 55").await, "Removed Alice (55) from sudoers.");
        assert_eq!(h.run(OWNER_ID, ".delsudo 55").await, h.tr("sudo.not_sudo"));
        assert!(!h.app.permissions.is_sudoer(55));
    }

    #[tokio::test]
    async fn test_sudoer_cannot_manage_sudoers() {
        let h = TestApp::new().sudoers(&[55]).build().await;
        h.messenger.add_user(66, "Bob", None);

        h.run(55, ".addsudo 66").await;
        assert!(!h.app.permissions.is_sudoer(66));
        assert!(h.messenger.log().is_empty());
    }

    #[tokio::test]
    async fn test_list_falls_back_to_id() {
        let h = TestApp::new().sudoers(&[123]).build().await;
        assert_eq!(h.run(OWNER_ID, ".listsudo").await, "Sudoers (1):\n• 123 (123)");
    }
}
