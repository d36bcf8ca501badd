//! Liveness commands.

use std::time::{Duration, Instant};

use crate::commands::{CommandContext, CommandError, Handler};

const MODULE: &str = "System";

pub fn handlers() -> Vec<Handler> {
    vec![
        Handler::new(MODULE, "ping", "Check response latency", ping),
        Handler::new(MODULE, "alive", "Show bot status", alive),
    ]
}

async fn ping(ctx: CommandContext) -> Result<(), CommandError> {
    let start = Instant::now();
    let status = ctx.respond_tr("ping.pinging", &[]).await?;
    let latency = start.elapsed().as_millis().to_string();

    let text = ctx.trf(
        "ping.result",
        &[("latency", &latency), ("uptime", &format_uptime(ctx.app.uptime()))],
    );
    ctx.update(status, &text).await
}

async fn alive(ctx: CommandContext) -> Result<(), CommandError> {
    let app = &ctx.app;
    let text = ctx.trf(
        "alive.message",
        &[
            ("name", &app.owner.name),
            ("user_id", &app.owner.id.to_string()),
            ("sudoers", &app.permissions.sudoers().len().to_string()),
            ("version", env!("CARGO_PKG_VERSION")),
            ("uptime", &format_uptime(app.uptime())),
        ],
    );
    ctx.respond(&text).await?;
    Ok(())
}

/// Formats an uptime as `1d 2h 3m 4s`, skipping leading zero units.
fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let units = [
        (secs / 86_400, "d"),
        ((secs / 3600) % 24, "h"),
        ((secs / 60) % 60, "m"),
    ];

    let mut out = String::new();
    for (value, unit) in units {
        if value > 0 || !out.is_empty() {
            out.push_str(&format!("{value}{unit} "));
        }
    }
    out.push_str(&format!("{}s", secs % 60));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{OWNER_ID, Sent, TestApp};

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0s");
        assert_eq!(format_uptime(Duration::from_secs(59)), "59s");
        assert_eq!(format_uptime(Duration::from_secs(3601)), "1h 0m 1s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[tokio::test]
    async fn test_ping_edits_status_with_latency() {
        let h = TestApp::new().build().await;

        let text = h.run(OWNER_ID, ".ping").await;

        assert!(text.starts_with("Pong! "));
        assert!(text.contains("\nUptime: "));
        let log = h.messenger.log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].text(), h.tr("ping.pinging"));
    }

    #[tokio::test]
    async fn test_sudoer_ping_updates_the_reply() {
        let h = TestApp::new().sudoers(&[55]).build().await;

        h.run(55, ".ping").await;

        let log = h.messenger.log();
        let [Sent::Reply { .. }, Sent::Edit { message_id, .. }] = log.as_slice() else {
            panic!("unexpected calls: {log:?}");
        };
        assert_eq!(*message_id, 500);
    }

    #[tokio::test]
    async fn test_alive_reports_owner_and_sudoers() {
        let h = TestApp::new().sudoers(&[55, 66]).build().await;

        let text = h.run(OWNER_ID, ".alive").await;

        assert!(text.contains("Owner: Owner (1000)"));
        assert!(text.contains("Sudoers: 2"));
        assert!(text.contains(env!("CARGO_PKG_VERSION")));
    }
}
