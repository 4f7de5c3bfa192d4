// Facade over the editing core. Every public operation the transport layer
// exposes goes through here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use labnote_common::types::{
    AutosavedFields, ChangeSet, DeleteOutcome, EditStatus, FieldId, Intent, ModificationDate,
    NavigationTarget, Permission, Record, RecordId, SaveOutcome, UnlockAck, ViewResult,
};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditKind, SECURITY_TARGET};
use crate::collab::{ActiveSessionRegistry, AuditSink, Authorization, RecordStorage};
use crate::editing::autosave::{AutosaveStore, DEFAULT_MAX_CONTENT_BYTES};
use crate::editing::conflict::ConflictDetector;
use crate::editing::progress::OperationRegistry;
use crate::editing::resolver::EditStatusResolver;
use crate::editing::save::{SaveRecordOperation, SaveRequest};
use crate::editing::tracker::EditorTracker;
use crate::error::{EditError, EditResult};

pub type Clock = fn() -> DateTime<Utc>;

/// External services the core depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn RecordStorage>,
    pub authorization: Arc<dyn Authorization>,
    pub sessions: Arc<dyn ActiveSessionRegistry>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditingOptions {
    pub max_content_bytes: usize,
}

impl Default for EditingOptions {
    fn default() -> Self {
        Self { max_content_bytes: DEFAULT_MAX_CONTENT_BYTES }
    }
}

pub struct EditingService {
    storage: Arc<dyn RecordStorage>,
    authorization: Arc<dyn Authorization>,
    audit: Arc<dyn AuditSink>,
    tracker: Arc<EditorTracker>,
    autosave: Arc<AutosaveStore>,
    operations: Arc<OperationRegistry>,
    resolver: EditStatusResolver,
    saver: SaveRecordOperation,
    conflicts: ConflictDetector,
    clock: Clock,
}

impl EditingService {
    pub fn new(collaborators: Collaborators, options: EditingOptions) -> Self {
        let Collaborators { storage, authorization, sessions, audit } = collaborators;
        let tracker = Arc::new(EditorTracker::new());
        let autosave = Arc::new(AutosaveStore::new(storage.clone(), options.max_content_bytes));
        let operations = Arc::new(OperationRegistry::new());

        let resolver = EditStatusResolver::new(
            storage.clone(),
            authorization.clone(),
            sessions,
            tracker.clone(),
        );
        let saver = SaveRecordOperation::new(
            storage.clone(),
            audit.clone(),
            tracker.clone(),
            autosave.clone(),
            operations.clone(),
        );
        let conflicts = ConflictDetector::new(storage.clone(), authorization.clone());

        Self {
            storage,
            authorization,
            audit,
            tracker,
            autosave,
            operations,
            resolver,
            saver,
            conflicts,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn tracker(&self) -> &EditorTracker {
        &self.tracker
    }

    pub fn autosave(&self) -> &AutosaveStore {
        &self.autosave
    }

    // ── Lock lifecycle ─────────────────────────────────────────────────

    /// Open a record read-only. The record is withheld when access is denied.
    pub fn request_view(&self, record_id: RecordId, user: &str) -> EditResult<ViewResult> {
        let record = self.load(record_id)?;
        let status = self.resolver.resolve_for(&record, user, Intent::View)?;
        let record = (status != EditStatus::AccessDenied).then_some(record);
        Ok(ViewResult { status, record })
    }

    pub fn request_edit(&self, record_id: RecordId, user: &str) -> EditResult<EditStatus> {
        self.resolver.resolve(record_id, user, Intent::Edit)
    }

    /// Release the caller's lock. Idempotent; never releases someone else's lock.
    pub fn unlock(&self, record_id: RecordId, user: &str) -> UnlockAck {
        let released = self.tracker.release(record_id, user);
        debug!(record_id, user, released, "unlock requested");
        UnlockAck { record_id, released }
    }

    // ── Autosave ───────────────────────────────────────────────────────

    /// Shadow one field's content. Content is validated before the lock is checked.
    pub fn autosave_field(&self, field_id: FieldId, content: String, user: &str) -> EditResult<()> {
        let temp = self.autosave.save_field(field_id, content, (self.clock)(), |record_id| {
            self.require_lock(record_id, user, "autosave")
        })?;
        debug!(record_id = temp.record_id, field_id, user, revision = temp.revision, "field autosaved");
        Ok(())
    }

    pub fn get_autosaved_fields(&self, record_id: RecordId, user: &str) -> EditResult<AutosavedFields> {
        let record = self.load(record_id)?;
        self.require_permission(&record, user, Permission::Read, "read")?;

        let fields = self.autosave.get_autosaved_fields(record_id);
        let has_autosave = !fields.is_empty();
        Ok(AutosavedFields { record_id, fields, has_autosave })
    }

    /// Discard every shadow of the record. Canonical fields and the lock are kept.
    pub fn cancel_autosave(&self, record_id: RecordId, user: &str) -> EditResult<NavigationTarget> {
        let record = self.load(record_id)?;
        self.require_permission(&record, user, Permission::Write, "cancel edits on")?;
        if let Some(holder) = self.tracker.current_holder(record_id) {
            if holder != user {
                return Err(self.not_holder(record_id, user, Some(holder), "cancel autosave"));
            }
        }

        let discarded = self.autosave.cancel_autosave(record_id);
        info!(record_id, user, discarded, "autosave cancelled");
        Ok(record.navigation_target())
    }

    // ── Commit and conflicts ───────────────────────────────────────────

    pub fn save(
        &self,
        record_id: RecordId,
        user: &str,
        release_lock: bool,
        baseline: Option<ModificationDate>,
    ) -> EditResult<SaveOutcome> {
        self.saver.save(SaveRequest { record_id, user, release_lock, baseline }, (self.clock)())
    }

    pub fn changes_since(
        &self,
        record_id: RecordId,
        user: &str,
        client_modification_date: ModificationDate,
    ) -> EditResult<ChangeSet> {
        self.conflicts.changes_since(record_id, user, client_modification_date)
    }

    // ── Deletion ───────────────────────────────────────────────────────

    /// Soft-delete a record. Allowed only when the caller resolves to edit mode,
    /// so a record locked by another live session is never deleted under them.
    pub fn delete_record(&self, record_id: RecordId, user: &str) -> EditResult<DeleteOutcome> {
        let _operation = self
            .operations
            .try_begin(record_id)
            .ok_or(EditError::OperationInProgress { record_id })?;

        let record = self.load(record_id)?;
        let status = self.resolver.resolve_for(&record, user, Intent::Edit)?;
        if !status.is_edit_mode() {
            let holder = status.holder().map(str::to_string);
            info!(record_id, user, status = status.as_str(), "delete refused");
            return Ok(DeleteOutcome::Refused { status, holder });
        }

        if !self.storage.mark_deleted(record_id)? {
            self.tracker.release(record_id, user);
            return Err(EditError::RecordNotFound(record_id));
        }
        self.tracker.forget(record_id);
        let discarded = self.autosave.cancel_autosave(record_id);

        self.audit.notify(AuditEvent::new(
            user,
            record_id,
            AuditKind::Delete,
            format!("deleted record `{}`", record.name),
            (self.clock)(),
        ));
        info!(record_id, user, discarded, "record deleted");

        Ok(DeleteOutcome::Deleted { navigation: record.navigation_target() })
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn load(&self, record_id: RecordId) -> EditResult<Record> {
        self.storage.load_record(record_id)?.ok_or(EditError::RecordNotFound(record_id))
    }

    fn require_permission(
        &self,
        record: &Record,
        user: &str,
        permission: Permission,
        action: &'static str,
    ) -> EditResult<()> {
        if self.authorization.is_permitted(user, record, permission)? {
            return Ok(());
        }
        warn!(
            target: SECURITY_TARGET,
            user,
            record_id = record.id,
            permission = permission.as_str(),
            "access denied"
        );
        Err(EditError::AccessDenied { user: user.to_string(), record_id: record.id, action })
    }

    fn require_lock(&self, record_id: RecordId, user: &str, action: &str) -> EditResult<()> {
        match self.tracker.current_holder(record_id) {
            Some(holder) if holder == user => Ok(()),
            holder => Err(self.not_holder(record_id, user, holder, action)),
        }
    }

    fn not_holder(
        &self,
        record_id: RecordId,
        user: &str,
        holder: Option<String>,
        action: &str,
    ) -> EditError {
        warn!(
            target: SECURITY_TARGET,
            user,
            record_id,
            holder = holder.as_deref().unwrap_or("-"),
            action,
            "rejected: caller does not hold the edit lock"
        );
        EditError::NotLockHolder { user: user.to_string(), record_id, holder }
    }
}
