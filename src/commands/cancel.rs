//! Cancellation tokens for long-running commands.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
struct TokenMap {
    entries: HashMap<i32, (u64, CancellationToken)>,
    next_generation: u64,
}

/// Running operations keyed by the id of their status message.
#[derive(Debug, Default, Clone)]
pub struct CancelRegistry {
    tokens: Arc<Mutex<TokenMap>>,
}

impl CancelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation under `status_id`.
    ///
    /// The entry lives as long as the returned guard.
    pub fn register(&self, status_id: i32) -> CancelGuard {
        let token = CancellationToken::new();
        let generation = {
            let mut map = self.lock();
            map.next_generation += 1;
            let generation = map.next_generation;
            if let Some((_, previous)) = map.entries.insert(status_id, (generation, token.clone())) {
                previous.cancel();
            }
            generation
        };
        debug!("Registered cancellable operation {}", status_id);
        CancelGuard {
            registry: self.clone(),
            status_id,
            generation,
            token,
        }
    }

    /// Cancels the operation under `status_id`. Returns `false` if none runs.
    pub fn cancel(&self, status_id: i32) -> bool {
        match self.lock().entries.get(&status_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, status_id: i32) -> bool {
        self.lock().entries.contains_key(&status_id)
    }

    fn lock(&self) -> MutexGuard<'_, TokenMap> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its registry entry when dropped.
#[derive(Debug)]
pub struct CancelGuard {
    registry: CancelRegistry,
    status_id: i32,
    generation: u64,
    token: CancellationToken,
}

impl CancelGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let mut map = self.registry.lock();
        // A newer registration under the same id owns the slot now.
        if map
            .entries
            .get(&self.status_id)
            .is_some_and(|(generation, _)| *generation == self.generation)
        {
            map.entries.remove(&self.status_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_fires_token() {
        let registry = CancelRegistry::new();
        let guard = registry.register(10);

        assert!(registry.is_active(10));
        assert!(registry.cancel(10));
        assert!(guard.token().is_cancelled());
        assert!(!registry.cancel(11));
    }

    #[test]
    fn test_drop_removes_entry() {
        let registry = CancelRegistry::new();
        {
            let _guard = registry.register(10);
        }
        assert!(!registry.is_active(10));
        assert!(!registry.cancel(10));
    }

    #[tokio::test]
    async fn test_entry_removed_when_task_fails() {
        let registry = CancelRegistry::new();
        let task_registry = registry.clone();

        let result = tokio::spawn(async move {
            let _guard = task_registry.register(5);
            Err::<(), _>("download failed")
        })
        .await
        .unwrap();

        assert!(result.is_err());
        assert!(!registry.is_active(5));
    }

    #[test]
    fn test_reregistration_keeps_newer_entry() {
        let registry = CancelRegistry::new();
        let first = registry.register(1);
        let second = registry.register(1);

        assert!(first.token().is_cancelled());
        drop(first);
        assert!(registry.is_active(1));
        drop(second);
        assert!(!registry.is_active(1));
    }
}
