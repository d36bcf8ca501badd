//! Media download with cancellation.

use std::time::Instant;

use tracing::{info, warn};

use crate::commands::{CommandContext, CommandError, Handler};
use crate::telegram::TelegramError;

const MODULE: &str = "Files";

pub fn handlers() -> Vec<Handler> {
    vec![
        Handler::new(MODULE, "download", "Download media from the replied message", download),
        Handler::new(MODULE, "cancel", "Cancel a running download (reply to its status)", cancel),
    ]
}

async fn download(ctx: CommandContext) -> Result<(), CommandError> {
    if ctx.message.reply_to.is_none() {
        ctx.respond_tr("files.reply_to_media", &[]).await?;
        return Ok(());
    }

    let status = ctx.respond_tr("files.downloading", &[]).await?;
    let guard = ctx.app.cancels.register(status.message_id);
    let start = Instant::now();

    let result = ctx
        .app
        .messenger
        .download_reply_media(&ctx.message, &ctx.app.download_dir, guard.token())
        .await;
    drop(guard);

    let text = match result {
        Ok(path) => {
            info!("Downloaded {}", path.display());
            ctx.trf(
                "files.download_success",
                &[
                    ("path", &path.display().to_string()),
                    ("elapsed", &format!("{:.1}s", start.elapsed().as_secs_f64())),
                ],
            )
        }
        Err(TelegramError::NoMedia) => ctx.tr("files.no_file"),
        Err(TelegramError::Cancelled) => {
            info!("Download {} cancelled", status.message_id);
            ctx.tr("files.download_cancelled")
        }
        Err(TelegramError::Download(reason)) => {
            warn!("Download failed: {}", reason);
            ctx.trf("files.download_error", &[("error", &reason)])
        }
        Err(e) => {
            warn!("Download failed: {}", e);
            ctx.trf("files.download_error", &[("error", &e.to_string())])
        }
    };
    ctx.update(status, &text).await
}

async fn cancel(ctx: CommandContext) -> Result<(), CommandError> {
    let Some(status_id) = ctx.message.reply_to else {
        ctx.respond_tr("files.reply_to_download", &[]).await?;
        return Ok(());
    };

    if ctx.app.cancels.cancel(status_id) {
        ctx.respond_tr("files.cancelled", &[]).await?;
    } else {
        ctx.respond_tr("files.no_active_download", &[]).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::testing::{
        COMMAND_MESSAGE_ID, DownloadBehaviour, OWNER_ID, Sent, TestApp, reply_from,
    };

    #[tokio::test]
    async fn test_download_requires_reply() {
        let h = TestApp::new().build().await;
        assert_eq!(h.run(OWNER_ID, ".download").await, h.tr("files.reply_to_media"));
    }

    #[tokio::test]
    async fn test_download_success() {
        let h = TestApp::new().build().await;

        h.run_message(&reply_from(OWNER_ID, ".download", 7)).await;

        let text = h.messenger.last_text();
        assert!(text.starts_with("Saved to "), "{text}");
        assert!(text.contains("_7"));
        assert!(!h.app.cancels.is_active(COMMAND_MESSAGE_ID + 1));
    }

    #[tokio::test]
    async fn test_download_failures() {
        let h = TestApp::new().build().await;

        h.messenger.set_download(DownloadBehaviour::NoMedia);
        h.run_message(&reply_from(OWNER_ID, ".download", 7)).await;
        assert_eq!(h.messenger.last_text(), h.tr("files.no_file"));

        h.messenger.set_download(DownloadBehaviour::Fail("disk full".to_owned()));
        h.run_message(&reply_from(OWNER_ID, ".download", 7)).await;
        assert_eq!(h.messenger.last_text(), "Download failed: disk full");
    }

    #[tokio::test]
    async fn test_cancel_running_download() {
        let h = TestApp::new().sudoers(&[55]).build().await;
        h.messenger.set_download(DownloadBehaviour::Hang);

        // A sudoer's status message is a reply with a fresh id.
        let message = reply_from(55, ".download", 7);
        let mut invocations = h.invocations(&message).await;
        let task = tokio::spawn(invocations.remove(0).run());

        let status_id = 500;
        for _ in 0..100 {
            if h.app.cancels.is_active(status_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.app.cancels.is_active(status_id));

        h.run_message(&reply_from(OWNER_ID, ".cancel", status_id)).await;
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(!h.app.cancels.is_active(status_id));
        let log = h.messenger.log();
        assert!(log.contains(&Sent::Edit {
            chat_id: message.chat_id,
            message_id: status_id,
            text: h.tr("files.download_cancelled"),
        }));
        assert!(log.iter().any(|sent| sent.text() == h.tr("files.cancelled")));
    }

    #[tokio::test]
    async fn test_cancel_without_download() {
        let h = TestApp::new().build().await;
        assert_eq!(h.run(OWNER_ID, ".cancel").await, h.tr("files.reply_to_download"));

        h.run_message(&reply_from(OWNER_ID, ".cancel", 42)).await;
        assert_eq!(h.messenger.last_text(), h.tr("files.no_active_download"));
    }
}
