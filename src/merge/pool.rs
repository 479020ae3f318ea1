//! Per-merge-request exclusive locks
//!
//! Serializes merge attempts on the same request across the git phase
//! without holding a store transaction.

use crate::error::{Error, Result};
use crate::types::MergeRequestId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

/// Held while a merge request is being merged
pub type WorkGuard = OwnedMutexGuard<()>;

/// Keyed async locks
#[derive(Debug, Default)]
pub struct WorkingPool {
    locks: Mutex<HashMap<MergeRequestId, Arc<TokioMutex<()>>>>,
}

impl WorkingPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a merge request
    pub async fn acquire(&self, id: MergeRequestId) -> Result<WorkGuard> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| Error::Store(format!("working pool poisoned: {e}")))?;
            // Drop idle entries (only the map holds them)
            locks.retain(|key, lock| *key == id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.locks.lock().map_or(0, |locks| locks.len())
    }

    /// Whether no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
