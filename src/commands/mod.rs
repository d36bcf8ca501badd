//! Command routing module.
//!
//! Handlers are registered once at startup through [`ModuleRegistry`], which
//! builds the [`CommandRouter`] and the [`HelpIndex`] together.

mod cancel;
mod help;
mod permission;
mod registry;
mod router;
mod types;

pub use cancel::{CancelGuard, CancelRegistry};
pub use help::{HelpIndex, MIN_SCORE, format_module_help, fuzzy_score};
pub use permission::PermissionGate;
pub use registry::ModuleRegistry;
pub use router::{CommandRouter, Invocation};
pub use types::{Action, ActionFuture, CommandContext, CommandError, Handler};
