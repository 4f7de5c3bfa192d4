// Sessions, record creation and sharing: the plumbing that feeds the
// editing core's liveness and permission checks.
//
// Everything here writes straight to the SQLite stores. Only the record
// owner may create grants or revoke them.

use chrono::Utc;
use labnote_common::field::ValidationError;
use labnote_common::types::{GrantAck, Permission, Record, RecordId, SessionAck, SessionInfo};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::SECURITY_TARGET;
use crate::collab::{Authorization, RecordStorage};
use crate::editing::Clock;
use crate::error::{EditError, EditResult};
use crate::store::grants::RecordGrants;
use crate::store::records::{NewField, NewRecord, SqliteRecordStore};
use crate::store::sessions::SessionRegistry;

#[derive(Clone)]
pub struct WorkspaceService {
    records: SqliteRecordStore,
    grants: RecordGrants,
    sessions: SessionRegistry,
    clock: Clock,
}

impl WorkspaceService {
    pub fn new(records: SqliteRecordStore, grants: RecordGrants, sessions: SessionRegistry) -> Self {
        Self { records, grants, sessions, clock: Utc::now }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // ── Sessions ───────────────────────────────────────────────────────

    /// Open a session. While it is active and heartbeating, the user's edit
    /// locks cannot be reclaimed by others.
    pub fn login(&self, user: &str) -> EditResult<SessionInfo> {
        let session_id = Uuid::new_v4().to_string();
        let session = self.sessions.login(&session_id, user)?;
        info!(user, session_id = %session_id, "session opened");
        Ok(SessionInfo { session_id, user: session.username, started_at: session.started_at })
    }

    pub fn heartbeat(&self, session_id: &str, user: &str) -> EditResult<SessionAck> {
        let ok = self.sessions.heartbeat(session_id, user)?;
        if !ok {
            debug!(user, session_id, "heartbeat ignored: session unknown, ended or not the caller's");
        }
        Ok(SessionAck { session_id: session_id.to_string(), ok })
    }

    pub fn logout(&self, session_id: &str, user: &str) -> EditResult<SessionAck> {
        let ok = self.sessions.logout(session_id, user)?;
        info!(user, session_id, ok, "session closed");
        Ok(SessionAck { session_id: session_id.to_string(), ok })
    }

    // ── Records ────────────────────────────────────────────────────────

    /// Create a record owned by `user`. A parent, when given, must be readable.
    pub fn create_record(
        &self,
        user: &str,
        name: String,
        parent_id: Option<RecordId>,
        fields: Vec<NewField>,
    ) -> EditResult<Record> {
        if let Some(parent_id) = parent_id {
            let parent =
                self.records.load_record(parent_id)?.ok_or(EditError::RecordNotFound(parent_id))?;
            self.require(&parent, user, Permission::Read, "file records under")?;
        }

        let new = NewRecord {
            owner: user.to_string(),
            name,
            parent_id,
            modification_date: (self.clock)().timestamp_millis(),
            signed: false,
            fields,
        };
        let record = self.records.create_record(&new).map_err(|error| {
            match error.downcast::<ValidationError>() {
                Ok(validation) => EditError::Validation(validation),
                Err(error) => EditError::Storage(error),
            }
        })?;
        info!(record_id = record.id, user, fields = record.fields.len(), "record created");
        Ok(record)
    }

    // ── Grants ─────────────────────────────────────────────────────────

    pub fn grant(
        &self,
        record_id: RecordId,
        user: &str,
        grantee: &str,
        permission: Permission,
    ) -> EditResult<GrantAck> {
        self.require_owner(record_id, user, "share")?;
        let changed = self.grants.grant(record_id, grantee, permission)?;
        info!(
            target: SECURITY_TARGET,
            record_id,
            owner = user,
            grantee,
            permission = permission.as_str(),
            changed,
            "permission granted"
        );
        Ok(GrantAck { record_id, grantee: grantee.to_string(), permission, changed })
    }

    pub fn revoke(
        &self,
        record_id: RecordId,
        user: &str,
        grantee: &str,
        permission: Permission,
    ) -> EditResult<GrantAck> {
        self.require_owner(record_id, user, "unshare")?;
        let changed = self.grants.revoke(record_id, grantee, permission)?;
        info!(
            target: SECURITY_TARGET,
            record_id,
            owner = user,
            grantee,
            permission = permission.as_str(),
            changed,
            "permission revoked"
        );
        Ok(GrantAck { record_id, grantee: grantee.to_string(), permission, changed })
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn require_owner(&self, record_id: RecordId, user: &str, action: &'static str) -> EditResult<()> {
        let record =
            self.records.load_record(record_id)?.ok_or(EditError::RecordNotFound(record_id))?;
        if record.owner == user {
            return Ok(());
        }
        warn!(
            target: SECURITY_TARGET,
            user,
            record_id,
            action,
            "rejected: caller does not own the record"
        );
        Err(EditError::AccessDenied { user: user.to_string(), record_id, action })
    }

    fn require(
        &self,
        record: &Record,
        user: &str,
        permission: Permission,
        action: &'static str,
    ) -> EditResult<()> {
        if self.grants.is_permitted(user, record, permission)? {
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
}
