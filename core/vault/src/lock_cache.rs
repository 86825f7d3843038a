//! Process-local cache of vault lock states.
//!
//! The cache is never authoritative: the true state of a vault can always be
//! recomputed from the key store. Entries are created or overwritten every
//! time a state is computed and dropped when their vault is deleted.
//!
//! Each key system also gets a mutex. Holding it across a
//! compute-then-write sequence keeps a slow computation from overwriting a
//! newer result for the same vault.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use keyvault_common::KeySystemIdentifier;

/// Whether a vault's key material is available in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    Locked,
    Unlocked,
}

impl LockState {
    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }

    pub fn from_locked(locked: bool) -> Self {
        if locked {
            LockState::Locked
        } else {
            LockState::Unlocked
        }
    }
}

/// Concurrency-safe map from key system to cached lock state.
#[derive(Debug)]
pub struct LockCache {
    states: DashMap<KeySystemIdentifier, LockState>,
    guards: DashMap<KeySystemIdentifier, Arc<Mutex<()>>>,
    default_state: LockState,
}

impl LockCache {
    /// Create an empty cache reporting `default_state` for unknown vaults.
    pub fn new(default_state: LockState) -> Self {
        Self {
            states: DashMap::new(),
            guards: DashMap::new(),
            default_state,
        }
    }

    /// Cached state, if one has been recorded.
    pub fn get(&self, id: &KeySystemIdentifier) -> Option<LockState> {
        self.states.get(id).map(|entry| *entry.value())
    }

    /// Cached state, falling back to the default posture.
    pub fn state(&self, id: &KeySystemIdentifier) -> LockState {
        self.get(id).unwrap_or(self.default_state)
    }

    /// Record a state. Returns the previously cached one.
    pub fn set(&self, id: &KeySystemIdentifier, state: LockState) -> Option<LockState> {
        self.states.insert(id.clone(), state)
    }

    /// Drop the cached state of a deleted vault. Its guard stays so that
    /// waiters and newcomers keep sharing one mutex.
    pub fn forget(&self, id: &KeySystemIdentifier) -> Option<LockState> {
        self.states.remove(id).map(|(_, state)| state)
    }

    pub fn default_state(&self) -> LockState {
        self.default_state
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Wait for exclusive access to a key system's lock-state sequence.
    pub async fn acquire(&self, id: &KeySystemIdentifier) -> OwnedMutexGuard<()> {
        // Clone the mutex out so no map shard stays locked across the await.
        let mutex = self
            .guards
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        mutex.lock_owned().await
    }
}
