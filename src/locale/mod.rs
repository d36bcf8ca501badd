//! Localised message templates.
//!
//! Locale files are JSON objects nested by section (`"reminders": {"usage": ...}`)
//! and addressed with dot paths (`reminders.usage`). Lookups fall back to the
//! default language, then to the key itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{KvStore, get_or_empty, keys};

/// Language used when nothing else is configured.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Locale files compiled into the binary.
pub const BUNDLED_LOCALES: &[(&str, &str)] = &[
    ("en", include_str!("../../locales/en.json")),
    ("ru", include_str!("../../locales/ru.json")),
];

/// Errors that can occur while loading locale files.
#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("Failed to parse locale {lang}: {source}")]
    Parse {
        lang: String,
        source: serde_json::Error,
    },

    #[error("Locale {0} is not a JSON object")]
    NotAnObject(String),

    #[error("Default locale {DEFAULT_LANGUAGE} is missing")]
    MissingDefault,
}

/// Loaded translations plus the currently active language.
#[derive(Debug)]
pub struct Locales {
    languages: HashMap<String, Value>,
    active: RwLock<String>,
}

impl Locales {
    /// Loads the locales bundled with the binary.
    pub fn bundled() -> Result<Self, LocaleError> {
        Self::from_sources(BUNDLED_LOCALES)
    }

    /// Parses `(language code, JSON text)` pairs.
    pub fn from_sources(sources: &[(&str, &str)]) -> Result<Self, LocaleError> {
        let mut languages = HashMap::with_capacity(sources.len());

        for (lang, text) in sources {
            let value: Value = serde_json::from_str(text).map_err(|source| LocaleError::Parse {
                lang: (*lang).to_owned(),
                source,
            })?;
            if !value.is_object() {
                return Err(LocaleError::NotAnObject((*lang).to_owned()));
            }
            languages.insert((*lang).to_owned(), value);
        }

        if !languages.contains_key(DEFAULT_LANGUAGE) {
            return Err(LocaleError::MissingDefault);
        }

        info!("Loaded {} languages", languages.len());

        Ok(Self {
            languages,
            active: RwLock::new(DEFAULT_LANGUAGE.to_owned()),
        })
    }

    /// Translates `key` in the active language.
    pub fn tr(&self, key: &str) -> String {
        let lang = self.active();
        self.tr_lang(&lang, key)
    }

    /// Translates `key` in `lang`, falling back to the default language.
    pub fn tr_lang(&self, lang: &str, key: &str) -> String {
        let resolved = self
            .languages
            .get(lang)
            .and_then(|root| lookup(root, key))
            .or_else(|| {
                self.languages
                    .get(DEFAULT_LANGUAGE)
                    .and_then(|root| lookup(root, key))
            });

        resolved.map_or_else(
            || {
                debug!("Missing translation for {}", key);
                key.to_owned()
            },
            str::to_owned,
        )
    }

    /// Resolves a user's language: `USER_LANG_<id>`, then `BOT_LANGUAGE`, then the default.
    pub async fn language_for(&self, store: &dyn KvStore, user_id: i64) -> String {
        let user_lang = get_or_empty(store, &keys::user_language(user_id)).await;
        if self.has_language(&user_lang) {
            return user_lang;
        }
        let bot_lang = get_or_empty(store, keys::BOT_LANGUAGE).await;
        if self.has_language(&bot_lang) {
            return bot_lang;
        }
        DEFAULT_LANGUAGE.to_owned()
    }

    /// Switches the active language. Returns `false` for unknown codes.
    pub fn set_active(&self, lang: &str) -> bool {
        if !self.has_language(lang) {
            return false;
        }
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        lang.clone_into(&mut *active);
        true
    }

    /// Returns the active language code.
    pub fn active(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn has_language(&self, lang: &str) -> bool {
        self.languages.contains_key(lang)
    }

    /// Available language codes, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.languages.keys().cloned().collect();
        langs.sort();
        langs
    }

    /// Human-readable name of a language (`language.name`).
    pub fn language_name(&self, lang: &str) -> String {
        self.tr_lang(lang, "language.name")
    }

    /// All leaf keys of a language with their templates.
    pub fn entries(&self, lang: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(root) = self.languages.get(lang) {
            flatten(root, String::new(), &mut out);
        }
        out
    }
}

/// A difference between a translation and the default language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleIssue {
    MissingKey(String),
    UnknownKey(String),
    PlaceholderMismatch {
        key: String,
        expected: BTreeSet<String>,
        found: BTreeSet<String>,
    },
}

impl fmt::Display for LocaleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey(key) => write!(f, "missing key {key}"),
            Self::UnknownKey(key) => write!(f, "key {key} is not in {DEFAULT_LANGUAGE}"),
            Self::PlaceholderMismatch {
                key,
                expected,
                found,
            } => write!(
                f,
                "placeholders of {key} differ: expected {expected:?}, found {found:?}"
            ),
        }
    }
}

impl Locales {
    /// Compares `lang` against the default language.
    pub fn check(&self, lang: &str) -> Vec<LocaleIssue> {
        let reference = self.entries(DEFAULT_LANGUAGE);
        let candidate = self.entries(lang);
        let mut issues = Vec::new();

        for (key, template) in &reference {
            match candidate.get(key) {
                None => issues.push(LocaleIssue::MissingKey(key.clone())),
                Some(translated) => {
                    let expected = placeholders(template);
                    let found = placeholders(translated);
                    if expected != found {
                        issues.push(LocaleIssue::PlaceholderMismatch {
                            key: key.clone(),
                            expected,
                            found,
                        });
                    }
                }
            }
        }
        issues.extend(
            candidate
                .keys()
                .filter(|key| !reference.contains_key(*key))
                .map(|key| LocaleIssue::UnknownKey(key.clone())),
        );
        issues
    }
}

fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a str> {
    key.split('.')
        .try_fold(root, |node, part| node.get(part))
        .and_then(Value::as_str)
}

fn flatten(node: &Value, prefix: String, out: &mut BTreeMap<String, String>) {
    match node {
        Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(v, path, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix, s.clone());
        }
        _ => {}
    }
}

/// Substitutes `{name}` placeholders in a template.
///
/// Unknown placeholders are left untouched.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_owned();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Collects the placeholder names used in a template.
pub fn placeholders(template: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            names.insert(name.to_owned());
        }
        rest = &after[end + 1..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn locales() -> Locales {
        Locales::from_sources(&[
            ("en", r#"{"language":{"name":"English"},"greet":{"hello":"Hello {name}","bye":"Bye"}}"#),
            ("de", r#"{"language":{"name":"Deutsch"},"greet":{"hello":"Hallo {name}"}}"#),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_and_fallback() {
        let l = locales();
        assert_eq!(l.tr_lang("de", "greet.hello"), "Hallo {name}");
        assert_eq!(l.tr_lang("de", "greet.bye"), "Bye");
        assert_eq!(l.tr_lang("fr", "greet.bye"), "Bye");
        assert_eq!(l.tr_lang("en", "greet.missing"), "greet.missing");
        assert_eq!(l.tr_lang("en", "greet"), "greet");
    }

    #[test]
    fn test_active_language() {
        let l = locales();
        assert_eq!(l.tr("greet.hello"), "Hello {name}");
        assert!(l.set_active("de"));
        assert_eq!(l.tr("greet.hello"), "Hallo {name}");
        assert!(!l.set_active("xx"));
        assert_eq!(l.active(), "de");
    }

    #[tokio::test]
    async fn test_user_language_override() {
        let l = locales();
        let store = MemoryStore::new();
        assert_eq!(l.language_for(&store, 5).await, "en");

        store.set(keys::BOT_LANGUAGE, "de").await.unwrap();
        assert_eq!(l.language_for(&store, 5).await, "de");

        store.set(&keys::user_language(5), "en").await.unwrap();
        assert_eq!(l.language_for(&store, 5).await, "en");
    }

    #[test]
    fn test_missing_default_rejected() {
        assert!(matches!(
            Locales::from_sources(&[("de", "{}")]),
            Err(LocaleError::MissingDefault)
        ));
    }

    #[test]
    fn test_fill_and_placeholders() {
        assert_eq!(fill("Hello {name}", &[("name", "Ann")]), "Hello Ann");
        assert_eq!(fill("{a}{b}{a}", &[("a", "1")]), "1{b}1");
        assert_eq!(
            placeholders("{index}. {text} - {time} {}"),
            ["index", "text", "time"].into_iter().map(String::from).collect()
        );
    }

    #[test]
    fn test_check_reports_differences() {
        let l = Locales::from_sources(&[
            ("en", r#"{"a":"x {n}","b":"y","c":"z"}"#),
            ("de", r#"{"a":"x {m}","b":"y","d":"w"}"#),
        ])
        .unwrap();

        let issues = l.check("de");
        assert_eq!(issues.len(), 3);
        assert!(issues.contains(&LocaleIssue::MissingKey("c".to_owned())));
        assert!(issues.contains(&LocaleIssue::UnknownKey("d".to_owned())));
        assert!(matches!(
            &issues[0],
            LocaleIssue::PlaceholderMismatch { key, .. } if key == "a"
        ));
    }

    #[test]
    fn test_bundled_locales_are_consistent() {
        let l = Locales::bundled().unwrap();
        for lang in l.available() {
            assert_eq!(l.check(&lang), Vec::new(), "{lang} differs from {DEFAULT_LANGUAGE}");
        }
    }

    #[test]
    fn test_bundled_locales_load() {
        let l = Locales::bundled().unwrap();
        assert_eq!(l.available(), vec!["en", "ru"]);
        assert_eq!(l.language_name("en"), "English");
        assert_ne!(l.tr("reminders.usage"), "reminders.usage");
    }
}
