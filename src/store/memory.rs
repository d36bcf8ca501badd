//! In-process store used when no database URL is configured and in tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{KvStore, StoreError};

#[derive(Debug, Default)]
struct MemoryData {
    strings: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// Volatile store with Redis-like semantics for the operations the bot uses.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = self.lock();
        if data.sets.contains_key(key) {
            return Err(StoreError::WrongType(key.to_owned()));
        }
        Ok(data.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut data = self.lock();
        data.sets.remove(key);
        data.strings.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut data = self.lock();
        let had_string = data.strings.remove(key).is_some();
        let had_set = data.sets.remove(key).is_some();
        Ok(had_string || had_set)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let data = self.lock();
        Ok(data.strings.contains_key(key) || data.sets.contains_key(key))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut data = self.lock();
        if data.strings.contains_key(key) {
            return Err(StoreError::WrongType(key.to_owned()));
        }
        Ok(data
            .sets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut data = self.lock();
        let Some(set) = data.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        // Redis drops empty sets.
        if set.is_empty() {
            data.sets.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let data = self.lock();
        Ok(data
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let data = self.lock();
        Ok(data.sets.get(key).is_some_and(|set| set.contains(member)))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let data = self.lock();
        let mut keys: Vec<String> = data
            .strings
            .keys()
            .chain(data.sets.keys())
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        let mut data = self.lock();
        data.strings.clear();
        data.sets.clear();
        Ok(())
    }
}

/// Matches `text` against a pattern where `*` is any run and `?` any one char.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
