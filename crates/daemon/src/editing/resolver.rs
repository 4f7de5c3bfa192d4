// Decides what a user may do with a record and, for edit intent, claims the
// editor lock.
//
// Check order: read permission, record state, intent, write permission,
// lock. A lock held by a user with no live session is reclaimed in place
// with a compare-and-set, so two concurrent reclaimers cannot both win.

use std::sync::Arc;

use labnote_common::types::{EditStatus, Intent, Permission, Record, RecordId};
use tracing::{debug, info, warn};

use crate::audit::SECURITY_TARGET;
use crate::collab::{ActiveSessionRegistry, Authorization, RecordStorage};
use crate::editing::tracker::EditorTracker;
use crate::error::{EditError, EditResult};

/// Bounded retries when the lock changes hands between the liveness check and the CAS.
const MAX_CLAIM_ATTEMPTS: usize = 3;

pub struct EditStatusResolver {
    storage: Arc<dyn RecordStorage>,
    authorization: Arc<dyn Authorization>,
    sessions: Arc<dyn ActiveSessionRegistry>,
    tracker: Arc<EditorTracker>,
}

impl EditStatusResolver {
    pub fn new(
        storage: Arc<dyn RecordStorage>,
        authorization: Arc<dyn Authorization>,
        sessions: Arc<dyn ActiveSessionRegistry>,
        tracker: Arc<EditorTracker>,
    ) -> Self {
        Self { storage, authorization, sessions, tracker }
    }

    pub fn resolve(&self, record_id: RecordId, user: &str, intent: Intent) -> EditResult<EditStatus> {
        let record = self.storage.load_record(record_id)?.ok_or(EditError::RecordNotFound(record_id))?;
        self.resolve_for(&record, user, intent)
    }

    /// Resolve against an already loaded record.
    pub fn resolve_for(&self, record: &Record, user: &str, intent: Intent) -> EditResult<EditStatus> {
        if !self.authorization.is_permitted(user, record, Permission::Read)? {
            log_denied(user, record.id, Permission::Read);
            return Ok(EditStatus::AccessDenied);
        }

        if !record.is_editable() {
            return Ok(EditStatus::CanNeverEdit);
        }

        match intent {
            Intent::View => Ok(EditStatus::ViewMode),
            Intent::Edit => {
                if !self.authorization.is_permitted(user, record, Permission::Write)? {
                    log_denied(user, record.id, Permission::Write);
                    return Ok(EditStatus::AccessDenied);
                }
                self.claim_lock(record.id, user)
            }
        }
    }

    fn claim_lock(&self, record_id: RecordId, user: &str) -> EditResult<EditStatus> {
        let mut failed_steals = 0;

        loop {
            if self.tracker.try_acquire(record_id, user) {
                debug!(record_id, user, "edit lock granted");
                return Ok(EditStatus::EditMode);
            }

            // Released between the failed acquire and this read.
            let Some(holder) = self.tracker.current_holder(record_id) else {
                continue;
            };

            if self.sessions.is_active(&holder)? {
                debug!(record_id, user, holder = %holder, "edit lock held by a live session");
                return Ok(EditStatus::CannotEditOtherEditing { holder });
            }

            if self.tracker.steal(record_id, &holder, user) {
                info!(record_id, from = %holder, to = %user, "reclaimed stale edit lock");
                return Ok(EditStatus::EditMode);
            }

            failed_steals += 1;
            if failed_steals == MAX_CLAIM_ATTEMPTS {
                let holder = self.tracker.current_holder(record_id).unwrap_or(holder);
                warn!(record_id, user, holder = %holder, "edit lock contended; giving up");
                return Ok(EditStatus::CannotEditOtherEditing { holder });
            }
        }
    }
}

fn log_denied(user: &str, record_id: RecordId, permission: Permission) {
    warn!(
        target: SECURITY_TARGET,
        user,
        record_id,
        permission = permission.as_str(),
        "access denied"
    );
}
