//! Pocket Userbot Library
//!
//! A Telegram userbot driven by prefixed commands in any chat.
//!
//! This crate provides the core functionality for:
//! - Routing prefixed messages to command handlers
//! - Gating commands between the owner and sudoers
//! - Fuzzy help lookup across modules
//! - Persisting and delivering timed reminders
//! - Storing settings in Redis or in memory
//! - Forwarding warnings to a log chat

pub mod app;
pub mod commands;
pub mod config;
pub mod locale;
pub mod log_forward;
pub mod modules;
pub mod scheduler;
pub mod store;
pub mod telegram;

#[cfg(test)]
mod testing;
