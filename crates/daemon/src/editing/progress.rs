// Per-record "operation in progress" registry.
//
// `try_begin` is a compare-and-set on a set of record ids; the returned guard
// ends the operation when dropped. Contention fails immediately.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use labnote_common::types::RecordId;

#[derive(Debug, Default)]
pub struct OperationRegistry {
    running: Mutex<HashSet<RecordId>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an operation on `record_id` as running. `None` if one already is.
    pub fn try_begin(&self, record_id: RecordId) -> Option<OperationGuard<'_>> {
        if self.running().insert(record_id) {
            Some(OperationGuard { registry: self, record_id })
        } else {
            None
        }
    }

    fn end(&self, record_id: RecordId) {
        self.running().remove(&record_id);
    }

    fn running(&self) -> MutexGuard<'_, HashSet<RecordId>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ends the operation on drop, including on early return and unwind.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    registry: &'a OperationRegistry,
    record_id: RecordId,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.registry.end(self.record_id);
    }
}
