//! Prefix-based message routing.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, error};

use super::types::{CommandContext, Handler};
use crate::app::App;
use crate::telegram::IncomingMessage;

struct Route {
    pattern: Regex,
    handler: Arc<Handler>,
}

/// Route table built once at startup.
///
/// A handler with command `ban` under prefix `.` matches `.ban` and
/// `.ban <args>`, never `.banx`. Matching is case-sensitive.
pub struct CommandRouter {
    prefix: String,
    routes: Vec<Route>,
}

impl CommandRouter {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            routes: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Adds a route for `handler`. Help-only handlers are skipped.
    pub fn add(&mut self, handler: Arc<Handler>) -> Result<(), regex::Error> {
        if handler.command.is_empty() {
            return Ok(());
        }
        let pattern = Regex::new(&format!(
            r"^{}{}(?:$| (?s:(.*)))",
            regex::escape(&self.prefix),
            regex::escape(&handler.command)
        ))?;
        self.routes.push(Route { pattern, handler });
        Ok(())
    }

    /// Every handler whose route matches `text`, with its arguments.
    pub fn matches(&self, text: &str) -> Vec<(Arc<Handler>, String)> {
        self.routes
            .iter()
            .filter_map(|route| {
                let caps = route.pattern.captures(text)?;
                let args = caps.get(1).map_or("", |m| m.as_str());
                Some((Arc::clone(&route.handler), args.to_owned()))
            })
            .collect()
    }

    /// Builds the invocations `message` triggers for its sender.
    ///
    /// Routes the sender may not use are dropped silently.
    pub async fn dispatch(&self, app: &Arc<App>, message: &IncomingMessage) -> Vec<Invocation> {
        let matched = self.matches(&message.text);
        if matched.is_empty() {
            return Vec::new();
        }

        let allowed: Vec<_> = matched
            .into_iter()
            .filter(|(handler, _)| {
                let allowed = app.permissions.can_invoke(message.sender_id, handler);
                if !allowed {
                    debug!(
                        "Dropping {} from unauthorised sender {}",
                        handler.command, message.sender_id
                    );
                }
                allowed
            })
            .collect();
        if allowed.is_empty() {
            return Vec::new();
        }

        let lang = app
            .locales
            .language_for(app.store.as_ref(), message.sender_id)
            .await;

        allowed
            .into_iter()
            .map(|(handler, args)| {
                debug!("Routing {} for sender {}", handler.command, message.sender_id);
                Invocation {
                    ctx: CommandContext {
                        app: Arc::clone(app),
                        message: message.clone(),
                        args,
                        lang: lang.clone(),
                    },
                    handler,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("prefix", &self.prefix)
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// One authorised handler run for one message.
#[derive(Debug)]
pub struct Invocation {
    handler: Arc<Handler>,
    ctx: CommandContext,
}

impl Invocation {
    pub fn command(&self) -> &str {
        &self.handler.command
    }

    /// Runs the action. Errors are logged only.
    pub async fn run(self) {
        let command = self.handler.command.clone();
        if let Err(e) = (self.handler.action)(self.ctx).await {
            error!("Command {} failed: {}", command, e);
        }
    }
}
