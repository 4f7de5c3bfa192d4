// Commit path: merge pending shadows into canonical fields.
//
// Nothing observable changes until the guarded persist succeeds. On any
// failure before or during persist the canonical record, the shadows and the
// lock are left exactly as they were.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use labnote_common::types::{ModificationDate, RecordId, SaveOutcome};
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditKind, SECURITY_TARGET};
use crate::collab::{AuditSink, PersistOutcome, RecordStorage};
use crate::editing::autosave::AutosaveStore;
use crate::editing::conflict;
use crate::editing::progress::OperationRegistry;
use crate::editing::tracker::EditorTracker;
use crate::error::{EditError, EditResult};

pub const NOTHING_PENDING_WARNING: &str = "no autosaved changes were pending";

/// Strictly greater than `previous`, and wall-clock based when the clock allows.
pub fn next_modification_date(previous: ModificationDate, now: DateTime<Utc>) -> ModificationDate {
    now.timestamp_millis().max(previous.saturating_add(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveRequest<'a> {
    pub record_id: RecordId,
    pub user: &'a str,
    pub release_lock: bool,
    /// Modification date the client last saw. `None` skips the conflict check.
    pub baseline: Option<ModificationDate>,
}

pub struct SaveRecordOperation {
    storage: Arc<dyn RecordStorage>,
    audit: Arc<dyn AuditSink>,
    tracker: Arc<EditorTracker>,
    autosave: Arc<AutosaveStore>,
    operations: Arc<OperationRegistry>,
}

impl SaveRecordOperation {
    pub fn new(
        storage: Arc<dyn RecordStorage>,
        audit: Arc<dyn AuditSink>,
        tracker: Arc<EditorTracker>,
        autosave: Arc<AutosaveStore>,
        operations: Arc<OperationRegistry>,
    ) -> Self {
        Self { storage, audit, tracker, autosave, operations }
    }

    pub fn save(&self, request: SaveRequest<'_>, now: DateTime<Utc>) -> EditResult<SaveOutcome> {
        let SaveRequest { record_id, user, release_lock, baseline } = request;

        // Held across the holder check, load and persist. Delete takes the same guard.
        let _operation = self
            .operations
            .try_begin(record_id)
            .ok_or(EditError::OperationInProgress { record_id })?;

        let holder = self.tracker.current_holder(record_id);
        if holder.as_deref() != Some(user) {
            warn!(
                target: SECURITY_TARGET,
                user,
                record_id,
                holder = holder.as_deref().unwrap_or("-"),
                "save rejected: caller does not hold the edit lock"
            );
            return Err(EditError::NotLockHolder { user: user.to_string(), record_id, holder });
        }

        let record =
            self.storage.load_record(record_id)?.ok_or(EditError::RecordNotFound(record_id))?;
        if !record.is_editable() {
            info!(
                record_id,
                user,
                deleted = record.deleted,
                signed = record.signed,
                "save refused: record frozen"
            );
            return Err(EditError::NotEditable { record_id });
        }

        if let Some(baseline) = baseline {
            if conflict::is_stale(baseline, record.modification_date) {
                info!(record_id, user, baseline, current = record.modification_date, "save conflict");
                return Err(EditError::DocumentAlreadyEdited {
                    record_id,
                    baseline,
                    current: record.modification_date,
                });
            }
        }

        let pending = self.autosave.pending(record_id);
        let mut merged = record.clone();
        let mut merged_fields = Vec::with_capacity(pending.len());
        let mut warnings = Vec::new();

        for temp in &pending {
            let Some(field) = merged.field_mut(temp.field_id) else {
                warnings.push(format!(
                    "autosaved field {} no longer exists on the record and was dropped",
                    temp.field_id
                ));
                continue;
            };
            field.kind.validate(field.id, &temp.content)?;
            field.content.clone_from(&temp.content);
            merged_fields.push(field.id);
        }
        if pending.is_empty() {
            warnings.push(NOTHING_PENDING_WARNING.to_string());
        }

        let expected = record.modification_date;
        merged.modification_date = next_modification_date(expected, now);

        match self.storage.persist(&merged, expected)? {
            PersistOutcome::Written => {}
            PersistOutcome::Stale { current } => {
                info!(record_id, user, expected, current, "canonical record changed during save");
                return Err(EditError::DocumentAlreadyEdited {
                    record_id,
                    baseline: baseline.unwrap_or(expected),
                    current,
                });
            }
            PersistOutcome::Frozen => {
                info!(record_id, user, "record frozen during save");
                return Err(EditError::NotEditable { record_id });
            }
        }

        self.autosave.discard_consumed(record_id, &pending);
        let lock_released = release_lock && self.tracker.release(record_id, user);

        self.audit.notify(AuditEvent::new(
            user,
            record_id,
            AuditKind::Write,
            format!(
                "saved record `{}` ({} field change(s))",
                merged.name,
                merged_fields.len()
            ),
            now,
        ));
        info!(
            record_id,
            user,
            modification_date = merged.modification_date,
            merged = merged_fields.len(),
            lock_released,
            "record saved"
        );

        Ok(SaveOutcome {
            record_id,
            modification_date: merged.modification_date,
            merged_fields,
            lock_released,
            navigation: merged.navigation_target(),
            warnings,
        })
    }
}
