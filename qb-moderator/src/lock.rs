//! Per-record exclusion lock
//!
//! A set of record identifiers currently checked out. Acquisition never
//! waits: a caller that finds the identifier taken skips its work, relying
//! on the stale input hash to be rediscovered by a later trigger.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Advisory, non-blocking, process-local lock keyed by record identifier
#[derive(Debug, Clone, Default)]
pub struct ExclusionLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ExclusionLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked mid-operation
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check out `id`; `false` if it is already checked out
    pub fn try_lock(&self, id: &str) -> bool {
        self.held().insert(id.to_string())
    }

    /// Release `id`
    ///
    /// Releasing an identifier that is not held is a bookkeeping bug and is
    /// reported as [`Error::Invariant`].
    pub fn unlock(&self, id: &str) -> Result<()> {
        if self.held().remove(id) {
            Ok(())
        } else {
            Err(Error::Invariant(format!("released record {} which was not locked", id)))
        }
    }

    /// Check out `id` for the lifetime of the returned guard
    pub fn acquire(&self, id: &str) -> Option<LockGuard> {
        self.try_lock(id).then(|| LockGuard {
            lock: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.held().contains(id)
    }

    /// Number of identifiers currently checked out
    pub fn len(&self) -> usize {
        self.held().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its identifier when dropped
#[derive(Debug)]
pub struct LockGuard {
    lock: ExclusionLock,
    id: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock(&self.id) {
            tracing::error!(record_id = %self.id, error = %e, "Lock released twice");
            debug_assert!(false, "{}", e);
        }
    }
}
