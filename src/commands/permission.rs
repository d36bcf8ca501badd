//! Owner and sudoer gating.

use std::sync::{PoisonError, RwLock};

use tracing::{info, warn};

use super::types::Handler;
use crate::store::{KvStore, StoreError, keys};

/// Decides who may run which command.
///
/// The owner may run everything. Sudoers may run commands that are not
/// owner-only. Everyone else is ignored.
#[derive(Debug)]
pub struct PermissionGate {
    owner_id: i64,
    sudoers: RwLock<Vec<i64>>,
}

impl PermissionGate {
    #[must_use]
    pub fn new(owner_id: i64, sudoers: Vec<i64>) -> Self {
        Self {
            owner_id,
            sudoers: RwLock::new(sudoers),
        }
    }

    /// Builds the gate from the persisted `SUDOS` set.
    ///
    /// A failed read starts with no sudoers.
    pub async fn load(owner_id: i64, store: &dyn KvStore) -> Self {
        let members = store.set_members(keys::SUDOS).await.unwrap_or_else(|e| {
            warn!("Failed to load sudoers: {}", e);
            Vec::new()
        });

        let sudoers = parse_members(&members);
        info!("Loaded {} sudoers", sudoers.len());
        Self::new(owner_id, sudoers)
    }

    /// Re-reads `SUDOS` after the set was changed outside this gate.
    ///
    /// On a failed read the current sudoers are kept.
    pub async fn reload(&self, store: &dyn KvStore) -> Result<usize, StoreError> {
        let members = store.set_members(keys::SUDOS).await?;
        let sudoers = parse_members(&members);
        let count = sudoers.len();
        *self.write() = sudoers;
        info!("Reloaded {} sudoers", count);
        Ok(count)
    }

    pub const fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn is_sudoer(&self, user_id: i64) -> bool {
        self.read().contains(&user_id)
    }

    /// Current sudoers in insertion order.
    pub fn sudoers(&self) -> Vec<i64> {
        self.read().clone()
    }

    pub fn can_invoke(&self, sender_id: i64, handler: &Handler) -> bool {
        sender_id == self.owner_id || (!handler.disallow_sudoers && self.is_sudoer(sender_id))
    }

    /// Persists a new sudoer, then mirrors it in memory.
    ///
    /// Returns `false` if the user already was one.
    pub async fn add_sudoer(&self, store: &dyn KvStore, user_id: i64) -> Result<bool, StoreError> {
        if self.is_sudoer(user_id) {
            return Ok(false);
        }
        store.set_add(keys::SUDOS, &user_id.to_string()).await?;

        let mut sudoers = self.write();
        if sudoers.contains(&user_id) {
            return Ok(false);
        }
        sudoers.push(user_id);
        info!("Added sudoer {}", user_id);
        Ok(true)
    }

    /// Removes a sudoer from the store, then from memory.
    ///
    /// Returns `false` if the user was not one.
    pub async fn remove_sudoer(
        &self,
        store: &dyn KvStore,
        user_id: i64,
    ) -> Result<bool, StoreError> {
        if !self.is_sudoer(user_id) {
            return Ok(false);
        }
        store.set_remove(keys::SUDOS, &user_id.to_string()).await?;

        let mut sudoers = self.write();
        let before = sudoers.len();
        sudoers.retain(|id| *id != user_id);
        info!("Removed sudoer {}", user_id);
        Ok(sudoers.len() != before)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<i64>> {
        self.sudoers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<i64>> {
        self.sudoers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_members(members: &[String]) -> Vec<i64> {
    members
        .iter()
        .filter_map(|member| member.parse().ok())
        .filter(|id| *id != 0)
        .collect()
}
