// Core domain types shared across all labnote crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::field::FieldKind;

pub type RecordId = i64;
pub type FieldId = i64;

/// Milliseconds since the unix epoch. Strictly increases on every commit.
pub type ModificationDate = i64;

/// A canonical, persisted notebook record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub owner: String,
    pub name: String,
    /// Folder or notebook the record lives in (navigation target after save).
    pub parent_id: Option<RecordId>,
    pub fields: Vec<Field>,
    pub modification_date: ModificationDate,
    pub deleted: bool,
    /// Signed records are frozen and can never be edited again.
    pub signed: bool,
}

impl Record {
    pub fn field(&self, field_id: FieldId) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == field_id)
    }

    pub fn field_mut(&mut self, field_id: FieldId) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.id == field_id)
    }

    /// Whether the record's own state permits editing, regardless of who asks.
    pub fn is_editable(&self) -> bool {
        !self.deleted && !self.signed
    }

    pub fn detached_fields(&self) -> Vec<DetachedField> {
        self.fields.iter().map(|field| field.detach(self.id)).collect()
    }

    pub fn navigation_target(&self) -> NavigationTarget {
        NavigationTarget { record_id: self.id, parent_id: self.parent_id }
    }
}

/// One content unit of a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
    pub content: String,
}

impl Field {
    pub fn detach(&self, record_id: RecordId) -> DetachedField {
        DetachedField {
            id: self.id,
            record_id,
            name: self.name.clone(),
            kind: self.kind.clone(),
            content: self.content.clone(),
        }
    }
}

/// An owned copy of a field. Mutating it never reaches canonical state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetachedField {
    pub id: FieldId,
    pub record_id: RecordId,
    pub name: String,
    pub kind: FieldKind,
    pub content: String,
}

/// Resolved outcome of a view or edit request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditStatus {
    ViewMode,
    EditMode,
    /// Another live session holds the lock. `holder` is for display only.
    CannotEditOtherEditing { holder: String },
    AccessDenied,
    CanNeverEdit,
}

impl EditStatus {
    pub fn is_edit_mode(&self) -> bool {
        matches!(self, Self::EditMode)
    }

    pub fn holder(&self) -> Option<&str> {
        match self {
            Self::CannotEditOtherEditing { holder } => Some(holder),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewMode => "VIEW_MODE",
            Self::EditMode => "EDIT_MODE",
            Self::CannotEditOtherEditing { .. } => "CANNOT_EDIT_OTHER_EDITING",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::CanNeverEdit => "CAN_NEVER_EDIT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    View,
    Edit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Where a caller should land after an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavigationTarget {
    pub record_id: RecordId,
    pub parent_id: Option<RecordId>,
}

/// Result of `record.view`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewResult {
    #[serde(flatten)]
    pub status: EditStatus,
    /// Absent when access was denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
}

/// Result of `autosave.list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutosavedFields {
    pub record_id: RecordId,
    pub fields: Vec<DetachedField>,
    pub has_autosave: bool,
}

/// Result of a successful `record.save`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveOutcome {
    pub record_id: RecordId,
    pub modification_date: ModificationDate,
    pub merged_fields: Vec<FieldId>,
    pub lock_released: bool,
    pub navigation: NavigationTarget,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Acknowledgement of `record.unlock`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockAck {
    pub record_id: RecordId,
    pub released: bool,
}

/// Result of `record.delete`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted { navigation: NavigationTarget },
    /// Deletion refused; `holder` is set when another user holds the lock.
    Refused { status: EditStatus, holder: Option<String> },
}

/// Result of `record.changes_since`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeSet {
    pub record_id: RecordId,
    /// Canonical timestamp at the time of the poll; use as the next baseline.
    pub modification_date: ModificationDate,
    /// Empty when the client copy is current.
    pub fields: Vec<DetachedField>,
}

impl ChangeSet {
    pub fn is_stale(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Result of `session.login`. The id is needed for heartbeat and logout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub user: String,
    pub started_at: DateTime<Utc>,
}

/// Result of `session.heartbeat` and `session.logout`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionAck {
    pub session_id: String,
    /// `false` when the session is unknown, pruned or not the caller's.
    pub ok: bool,
}

/// Result of `record.grant` and `record.revoke`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantAck {
    pub record_id: RecordId,
    pub grantee: String,
    pub permission: Permission,
    /// Whether the grant table actually changed.
    pub changed: bool,
}
