// Typed failures of the editing operations.
//
// Lock contention is not an error: it is reported as
// `EditStatus::CannotEditOtherEditing` and callers branch on it.

use labnote_common::field::ValidationError;
use labnote_common::types::{FieldId, ModificationDate, RecordId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("`{user}` is not permitted to {action} record {record_id}")]
    AccessDenied { user: String, record_id: RecordId, action: &'static str },

    #[error("`{user}` does not hold the edit lock on record {record_id}")]
    NotLockHolder { user: String, record_id: RecordId, holder: Option<String> },

    #[error(
        "record {record_id} was modified at {current} after the client baseline {baseline}; reload before saving"
    )]
    DocumentAlreadyEdited {
        record_id: RecordId,
        baseline: ModificationDate,
        current: ModificationDate,
    },

    #[error("record {record_id} is signed or deleted and can no longer be edited")]
    NotEditable { record_id: RecordId },

    #[error("another save or delete is already running on record {record_id}")]
    OperationInProgress { record_id: RecordId },

    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    #[error("field {0} not found")]
    FieldNotFound(FieldId),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl EditError {
    /// Authorization failures (read or write) share one handling path.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, Self::AccessDenied { .. } | Self::NotLockHolder { .. })
    }
}

pub type EditResult<T> = Result<T, EditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_is_transparent() {
        let error: EditError = ValidationError::new(4, "must be a number").into();
        assert_eq!(error.to_string(), "field 4: must be a number");
        assert!(!error.is_authorization_failure());
    }

    #[test]
    fn conflict_message_names_both_timestamps() {
        let error = EditError::DocumentAlreadyEdited { record_id: 9, baseline: 100, current: 101 };
        let message = error.to_string();
        assert!(message.contains("101"));
        assert!(message.contains("100"));
    }

    #[test]
    fn lock_and_access_failures_are_authorization_failures() {
        let denied = EditError::AccessDenied { user: "bob".into(), record_id: 1, action: "edit" };
        let not_holder =
            EditError::NotLockHolder { user: "bob".into(), record_id: 1, holder: Some("alice".into()) };
        assert!(denied.is_authorization_failure());
        assert!(not_holder.is_authorization_failure());
    }
}
