//! Startup-time collection of every module's handlers.

use std::sync::Arc;

use tracing::info;

use super::help::HelpIndex;
use super::router::CommandRouter;
use super::types::Handler;

/// Feeds each handler to the router and the help index.
#[derive(Debug)]
pub struct ModuleRegistry {
    router: CommandRouter,
    help: HelpIndex,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            router: CommandRouter::new(prefix),
            help: HelpIndex::new(),
        }
    }

    pub fn add(&mut self, handler: Handler) -> Result<(), regex::Error> {
        let handler = Arc::new(handler);
        self.router.add(Arc::clone(&handler))?;
        self.help.register(handler);
        Ok(())
    }

    pub fn add_all(&mut self, handlers: impl IntoIterator<Item = Handler>) -> Result<(), regex::Error> {
        handlers.into_iter().try_for_each(|handler| self.add(handler))
    }

    /// Finalises the help index and hands both tables out.
    pub fn finish(mut self) -> (CommandRouter, HelpIndex) {
        self.help.finalize();
        info!(
            "Registered {} routes across {} modules",
            self.router.len(),
            self.help.module_names().len()
        );
        (self.router, self.help)
    }
}
