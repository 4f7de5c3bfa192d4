// In-memory editor lock registry: record id -> user holding the write lock.
//
// Every mutation is a compare-and-set under one mutex, so two requests that
// both observe "no holder" can never both win. Locks are not persisted and
// have no TTL; an abandoned lock is reclaimed only when another user asks to
// edit the same record (see `resolver`).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use labnote_common::types::RecordId;

#[derive(Debug, Default)]
pub struct EditorTracker {
    holders: Mutex<HashMap<RecordId, String>>,
}

impl EditorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire or refresh the lock. Succeeds if unheld or already held by `user`.
    pub fn try_acquire(&self, record_id: RecordId, user: &str) -> bool {
        let mut holders = self.holders();
        match holders.get(&record_id) {
            Some(holder) => holder == user,
            None => {
                holders.insert(record_id, user.to_string());
                true
            }
        }
    }

    /// Reassign the lock from `from` to `to`, only if `from` still holds it.
    pub fn steal(&self, record_id: RecordId, from: &str, to: &str) -> bool {
        let mut holders = self.holders();
        match holders.get_mut(&record_id) {
            Some(holder) if holder == from => {
                *holder = to.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn current_holder(&self, record_id: RecordId) -> Option<String> {
        self.holders().get(&record_id).cloned()
    }

    /// Remove the lock only if `user` holds it. A mismatched release is a no-op.
    pub fn release(&self, record_id: RecordId, user: &str) -> bool {
        let mut holders = self.holders();
        if holders.get(&record_id).is_some_and(|holder| holder == user) {
            holders.remove(&record_id);
            true
        } else {
            false
        }
    }

    /// Drop the entry unconditionally; used once the record no longer exists.
    pub fn forget(&self, record_id: RecordId) -> Option<String> {
        self.holders().remove(&record_id)
    }

    // Each operation leaves the map consistent, so a poisoned guard is still usable.
    fn holders(&self) -> MutexGuard<'_, HashMap<RecordId, String>> {
        self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
