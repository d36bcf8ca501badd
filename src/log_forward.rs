//! Forwarding of log lines to the log chat.
//!
//! [`ForwardLayer`] sits next to the `fmt` layer and queues every warning and
//! error, plus info lines under [`LIFECYCLE`]. [`LogForwarder`] drains the
//! queue through the assistant into `LOG_CHAT`, or to the owner when unset.

use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber, debug};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::store::{KvStore, get_or_empty, keys};
use crate::telegram::{Messenger, escape_html};

/// Target of startup, shutdown and event lines, forwarded at info level.
pub const LIFECYCLE: &str = "pocket_userbot::lifecycle";

/// Never forwarded: their failures would be reported through themselves.
const QUIET_TARGETS: [&str; 2] = ["pocket_userbot::telegram", "grammers"];

/// Shared on/off flag for forwarding. On by default.
#[derive(Debug, Clone)]
pub struct LogSwitch(Arc<AtomicBool>);

impl Default for LogSwitch {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl LogSwitch {
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

/// One queued line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Level name, or the `event` field of lifecycle lines.
    pub tag: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LogLine {
    /// HTML rendering: bold tag, time, message.
    pub fn render(&self) -> String {
        format!(
            "<b>[{}]</b> <code>{}</code>\n{}",
            escape_html(&self.tag),
            self.at.format("%H:%M:%S"),
            escape_html(&self.message)
        )
    }
}

/// Layer queueing forwardable events.
#[derive(Debug)]
pub struct ForwardLayer {
    switch: LogSwitch,
    lines: mpsc::UnboundedSender<LogLine>,
}

/// Creates the layer and the queue it feeds.
pub fn forward_layer(switch: LogSwitch) -> (ForwardLayer, mpsc::UnboundedReceiver<LogLine>) {
    let (lines, receiver) = mpsc::unbounded_channel();
    (ForwardLayer { switch, lines }, receiver)
}

impl<S: Subscriber> Layer<S> for ForwardLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.switch.is_enabled() {
            return;
        }
        let meta = event.metadata();
        let target = meta.target();
        if target != LIFECYCLE && *meta.level() > Level::WARN {
            return;
        }
        if QUIET_TARGETS.iter().any(|quiet| target.starts_with(quiet)) {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = LogLine {
            tag: visitor.event.unwrap_or_else(|| meta.level().to_string()),
            message: visitor.message + &visitor.fields,
            at: Utc::now(),
        };
        // Fails only once the forwarder is gone.
        let _ = self.lines.send(line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    event: Option<String>,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => value.clone_into(&mut self.message),
            "event" => self.event = Some(value.to_owned()),
            name => {
                let _ = write!(self.fields, " {name}={value}");
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "event" => self.event = Some(format!("{value:?}")),
            name => {
                let _ = write!(self.fields, " {name}={value:?}");
            }
        }
    }
}

/// Sends queued lines through the assistant.
pub struct LogForwarder {
    sender: Arc<dyn Messenger>,
    store: Arc<dyn KvStore>,
    owner_id: i64,
}

impl LogForwarder {
    pub fn new(sender: Arc<dyn Messenger>, store: Arc<dyn KvStore>, owner_id: i64) -> Self {
        Self {
            sender,
            store,
            owner_id,
        }
    }

    /// Delivers lines until `shutdown` fires, then flushes what is queued.
    pub async fn run(
        self,
        mut lines: mpsc::UnboundedReceiver<LogLine>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                line = lines.recv() => match line {
                    Some(line) => self.deliver(&line).await,
                    None => return,
                },
            }
        }
        while let Ok(line) = lines.try_recv() {
            self.deliver(&line).await;
        }
    }

    /// Sends one line. Failures are only logged at debug level.
    pub async fn deliver(&self, line: &LogLine) {
        let chat = get_or_empty(self.store.as_ref(), keys::LOG_CHAT)
            .await
            .parse()
            .ok()
            .filter(|chat: &i64| *chat != 0)
            .unwrap_or(self.owner_id);

        if let Err(e) = self.sender.send_html(chat, &line.render()).await {
            debug!("Failed to forward log line to {}: {}", chat, e);
        }
    }
}

impl fmt::Debug for LogForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogForwarder")
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::prelude::*;

    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::FakeMessenger;

    fn capture(switch: &LogSwitch, emit: impl FnOnce()) -> Vec<LogLine> {
        let (layer, mut lines) = forward_layer(switch.clone());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, emit);

        let mut out = Vec::new();
        while let Ok(line) = lines.try_recv() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_forwards_warnings_and_lifecycle_lines() {
        let switch = LogSwitch::default();
        let lines = capture(&switch, || {
            tracing::warn!("disk almost full");
            tracing::info!("routine");
            tracing::error!(command = "ping", "Command failed");
            tracing::info!(target: LIFECYCLE, event = "STARTUP", "Userbot started");
        });

        let tags: Vec<&str> = lines.iter().map(|l| l.tag.as_str()).collect();
        assert_eq!(tags, ["WARN", "ERROR", "STARTUP"]);
        assert_eq!(lines[0].message, "disk almost full");
        assert_eq!(lines[1].message, "Command failed command=ping");
        assert_eq!(lines[2].message, "Userbot started");
    }

    #[test]
    fn test_nothing_forwarded_while_off() {
        let switch = LogSwitch::default();
        switch.set(false);
        let lines = capture(&switch, || {
            tracing::error!("ignored");
            tracing::info!(target: LIFECYCLE, event = "SHUTDOWN", "bye");
        });
        assert!(lines.is_empty());
    }

    #[test]
    fn test_quiet_targets_are_skipped() {
        let lines = capture(&LogSwitch::default(), || {
            tracing::warn!(target: "pocket_userbot::telegram::client", "Flood wait triggered");
        });
        assert!(lines.is_empty());
    }

    #[test]
    fn test_render_escapes_html() {
        let line = LogLine {
            tag: "WARN".to_owned(),
            message: "a <b> & c".to_owned(),
            at: DateTime::parse_from_rfc3339("2030-01-01T12:34:56Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        assert_eq!(
            line.render(),
            "<b>[WARN]</b> <code>12:34:56</code>\na &lt;b&gt; &amp; c"
        );
    }

    #[tokio::test]
    async fn test_deliver_prefers_log_chat() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(FakeMessenger::new());
        let forwarder = LogForwarder::new(sender.clone(), store.clone(), 1000);
        let line = LogLine {
            tag: "WARN".to_owned(),
            message: "x".to_owned(),
            at: Utc::now(),
        };

        forwarder.deliver(&line).await;
        store.set(keys::LOG_CHAT, "-100555").await.unwrap();
        forwarder.deliver(&line).await;

        let chats: Vec<i64> = sender.sent().iter().map(|(chat, _)| *chat).collect();
        assert_eq!(chats, [1000, -100_555]);
    }

    #[tokio::test]
    async fn test_run_flushes_queue_on_shutdown() {
        let sender = Arc::new(FakeMessenger::new());
        let forwarder = LogForwarder::new(sender.clone(), Arc::new(MemoryStore::new()), 1000);
        let (tx, rx) = mpsc::unbounded_channel();
        for tag in ["WARN", "SHUTDOWN"] {
            tx.send(LogLine {
                tag: tag.to_owned(),
                message: "m".to_owned(),
                at: Utc::now(),
            })
            .unwrap();
        }
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        forwarder.run(rx, shutdown).await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].1.starts_with("<b>[SHUTDOWN]</b>"));
    }
}
