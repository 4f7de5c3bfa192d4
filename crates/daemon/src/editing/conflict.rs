// Optimistic conflict detection against a client-held modification date.

use std::sync::Arc;

use labnote_common::types::{ChangeSet, ModificationDate, Permission, Record, RecordId};
use tracing::warn;

use crate::audit::SECURITY_TARGET;
use crate::collab::{Authorization, RecordStorage};
use crate::error::{EditError, EditResult};

/// True when canonical state moved past the client's baseline.
pub fn is_stale(baseline: ModificationDate, current: ModificationDate) -> bool {
    current > baseline
}

pub struct ConflictDetector {
    storage: Arc<dyn RecordStorage>,
    authorization: Arc<dyn Authorization>,
}

impl ConflictDetector {
    pub fn new(storage: Arc<dyn RecordStorage>, authorization: Arc<dyn Authorization>) -> Self {
        Self { storage, authorization }
    }

    /// Fields changed since `client_modification_date`, or none if the client is current.
    ///
    /// Pure read: no lock, no shadow, no canonical state is touched.
    pub fn changes_since(
        &self,
        record_id: RecordId,
        user: &str,
        client_modification_date: ModificationDate,
    ) -> EditResult<ChangeSet> {
        let record =
            self.storage.load_record(record_id)?.ok_or(EditError::RecordNotFound(record_id))?;
        if !self.authorization.is_permitted(user, &record, Permission::Read)? {
            warn!(target: SECURITY_TARGET, user, record_id, permission = "read", "access denied");
            return Err(EditError::AccessDenied {
                user: user.to_string(),
                record_id,
                action: "read",
            });
        }
        Ok(diff(&record, client_modification_date))
    }
}

/// Field-level change tracking is not kept, so a stale client receives every
/// canonical field as a detached copy.
pub fn diff(record: &Record, client_modification_date: ModificationDate) -> ChangeSet {
    let fields = if is_stale(client_modification_date, record.modification_date) {
        record.detached_fields()
    } else {
        Vec::new()
    };
    ChangeSet { record_id: record.id, modification_date: record.modification_date, fields }
}
