//! Command modules.
//!
//! Each module exposes `handlers()`; [`load_all`] registers all of them.
//! [`inline_help`] answers the assistant's inline queries and buttons.

mod database;
mod files;
mod help;
pub mod inline_help;
mod language;
mod logging;
mod reminders;
mod sudoers;
mod system;

use crate::commands::ModuleRegistry;

/// Registers every module's handlers.
pub fn load_all(registry: &mut ModuleRegistry) -> Result<(), regex::Error> {
    registry.add_all(help::handlers())?;
    registry.add_all(reminders::handlers())?;
    registry.add_all(sudoers::handlers())?;
    registry.add_all(database::handlers())?;
    registry.add_all(language::handlers())?;
    registry.add_all(logging::handlers())?;
    registry.add_all(system::handlers())?;
    registry.add_all(files::handlers())?;
    Ok(())
}
