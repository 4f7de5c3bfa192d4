// Seams to the services the editing core consumes but does not own.
//
// Authorization, session liveness, audit and canonical storage all live
// outside this subsystem. Each is a trait so the core can be driven by the
// SQLite-backed implementations in production and by doubles in tests.

use anyhow::Result;
use labnote_common::types::{Field, FieldId, ModificationDate, Permission, Record, RecordId};

use crate::audit::AuditEvent;

/// Decides whether a user may act on a record.
pub trait Authorization: Send + Sync {
    fn is_permitted(&self, user: &str, record: &Record, permission: Permission) -> Result<bool>;
}

/// Answers whether a user currently has a live session. Never mutated here.
pub trait ActiveSessionRegistry: Send + Sync {
    fn is_active(&self, username: &str) -> Result<bool>;
}

/// Fire-and-forget sink for audit events.
pub trait AuditSink: Send + Sync {
    fn notify(&self, event: AuditEvent);
}

/// Outcome of a guarded persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// The stored timestamp no longer matched the expected one; nothing was written.
    Stale { current: ModificationDate },
    /// The record was signed or deleted meanwhile; nothing was written.
    Frozen,
}

/// A field together with the record that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedField {
    pub record_id: RecordId,
    pub field: Field,
}

/// Canonical record storage.
pub trait RecordStorage: Send + Sync {
    fn load_record(&self, record_id: RecordId) -> Result<Option<Record>>;

    fn locate_field(&self, field_id: FieldId) -> Result<Option<LocatedField>>;

    /// Write every field's content and the record's timestamp in one
    /// transaction, but only if the stored timestamp still equals
    /// `expected_modification_date` and the record is still editable.
    /// Header columns other than the timestamp are never written.
    fn persist(
        &self,
        record: &Record,
        expected_modification_date: ModificationDate,
    ) -> Result<PersistOutcome>;

    /// Soft-delete. Returns `false` when the record does not exist.
    fn mark_deleted(&self, record_id: RecordId) -> Result<bool>;
}
