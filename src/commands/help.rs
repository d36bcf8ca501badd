//! Module help registry with fuzzy lookup.

use std::sync::Arc;

use super::types::Handler;
use crate::locale::{Locales, fill};

/// Lowest score a lookup accepts.
pub const MIN_SCORE: u32 = 50;

/// Handlers grouped by module, in registration order.
#[derive(Debug, Default)]
pub struct HelpIndex {
    modules: Vec<(String, Vec<Arc<Handler>>)>,
    sorted: Vec<String>,
}

impl HelpIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a handler under its module. Handlers without a description
    /// are not listed.
    pub fn register(&mut self, handler: Arc<Handler>) {
        if handler.description.is_empty() {
            return;
        }
        match self
            .modules
            .iter_mut()
            .find(|(name, _)| *name == handler.module_name)
        {
            Some((_, handlers)) => handlers.push(handler),
            None => self
                .modules
                .push((handler.module_name.clone(), vec![handler])),
        }
    }

    /// Sorts the module listing. Call once registration is complete.
    pub fn finalize(&mut self) {
        self.sorted = self.modules.iter().map(|(name, _)| name.clone()).collect();
        self.sorted.sort();
    }

    /// Module names, sorted by [`Self::finalize`].
    pub fn module_names(&self) -> &[String] {
        &self.sorted
    }

    pub fn handlers(&self, module: &str) -> Option<&[Arc<Handler>]> {
        self.modules
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, handlers)| handlers.as_slice())
    }

    /// Finds the module best matching `query`.
    ///
    /// Module names are scored first, then every command of every module.
    /// The first highest score wins; it must reach [`MIN_SCORE`].
    pub fn lookup(&self, query: &str) -> Option<(&str, &[Arc<Handler>])> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        let mut best: Option<(u32, usize)> = None;
        let mut consider = |score: u32, index: usize| {
            if score > best.map_or(0, |(s, _)| s) {
                best = Some((score, index));
            }
        };

        for (index, (name, _)) in self.modules.iter().enumerate() {
            consider(fuzzy_score(query, name), index);
        }
        for (index, (_, handlers)) in self.modules.iter().enumerate() {
            for handler in handlers {
                consider(fuzzy_score(query, &handler.command), index);
            }
        }

        let (score, index) = best?;
        if score < MIN_SCORE {
            return None;
        }
        let (name, handlers) = &self.modules[index];
        Some((name.as_str(), handlers.as_slice()))
    }
}

/// Scores how well `query` matches `target`, case-insensitively.
///
/// 100 for equality, 90 for a prefix, 70 for a substring. A subsequence scores
/// `50 + matched * 10 / target length`. Anything else scores 0.
pub fn fuzzy_score(query: &str, target: &str) -> u32 {
    let query = query.to_lowercase();
    let target = target.to_lowercase();

    if query == target {
        return 100;
    }
    if target.starts_with(&query) {
        return 90;
    }
    if target.contains(&query) {
        return 70;
    }

    let query: Vec<char> = query.chars().collect();
    let target: Vec<char> = target.chars().collect();

    let mut remaining = target.iter();
    let matched = query
        .iter()
        .take_while(|q| remaining.any(|t| t == *q))
        .count();

    if matched == query.len() && !target.is_empty() {
        let bonus = matched * 10 / target.len();
        50 + u32::try_from(bonus).unwrap_or(0)
    } else {
        0
    }
}

/// Renders the help text of one module.
pub fn format_module_help(
    locales: &Locales,
    lang: &str,
    module: &str,
    handlers: &[Arc<Handler>],
) -> String {
    let mut text = fill(
        &locales.tr_lang(lang, "help.commands_header"),
        &[("module", module)],
    );
    let entry = locales.tr_lang(lang, "help.command_entry");
    for handler in handlers {
        text.push_str(&fill(
            &entry,
            &[
                ("command", &handler.command),
                ("description", &handler.description),
            ],
        ));
    }
    text
}
