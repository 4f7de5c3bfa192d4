// Autosave shadow copies ("temp fields") of in-progress edits.
//
// A temp field exists only in memory, keyed by record then field. Its
// presence is the sole signal of unsaved autosave state; absence means the
// canonical field is authoritative. Shadows are lost on restart.
//
// Each write bumps a store-wide revision so the commit path can remove
// exactly the shadows it merged and keep any that were rewritten meanwhile.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use labnote_common::field::{FieldKind, ValidationError};
use labnote_common::types::{DetachedField, FieldId, RecordId};

use crate::collab::{LocatedField, RecordStorage};
use crate::error::{EditError, EditResult};

pub const DEFAULT_MAX_CONTENT_BYTES: usize = 1024 * 1024;

/// Uncommitted content for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct TempField {
    pub field_id: FieldId,
    pub record_id: RecordId,
    pub name: String,
    pub kind: FieldKind,
    pub content: String,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl TempField {
    pub fn detach(&self) -> DetachedField {
        DetachedField {
            id: self.field_id,
            record_id: self.record_id,
            name: self.name.clone(),
            kind: self.kind.clone(),
            content: self.content.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Shadows {
    by_record: HashMap<RecordId, BTreeMap<FieldId, TempField>>,
    next_revision: u64,
}

pub struct AutosaveStore {
    storage: Arc<dyn RecordStorage>,
    shadows: Mutex<Shadows>,
    max_content_bytes: usize,
}

impl AutosaveStore {
    pub fn new(storage: Arc<dyn RecordStorage>, max_content_bytes: usize) -> Self {
        Self { storage, shadows: Mutex::new(Shadows::default()), max_content_bytes }
    }

    /// Validate and store a shadow for `field_id`. Last write wins per field.
    ///
    /// Content is validated first; `authorize` then sees the owning record
    /// and may refuse the write. Nothing is stored on either failure.
    pub fn save_field<F>(
        &self,
        field_id: FieldId,
        content: String,
        now: DateTime<Utc>,
        authorize: F,
    ) -> EditResult<TempField>
    where
        F: FnOnce(RecordId) -> EditResult<()>,
    {
        let located =
            self.storage.locate_field(field_id)?.ok_or(EditError::FieldNotFound(field_id))?;
        self.validate(&located, &content)?;
        authorize(located.record_id)?;
        Ok(self.put(&located, content, now))
    }

    fn validate(&self, located: &LocatedField, content: &str) -> Result<(), ValidationError> {
        if content.len() > self.max_content_bytes {
            return Err(ValidationError::new(
                located.field.id,
                format!("content exceeds the {} byte autosave limit", self.max_content_bytes),
            ));
        }
        located.field.kind.validate(located.field.id, content)
    }

    fn put(&self, located: &LocatedField, content: String, now: DateTime<Utc>) -> TempField {
        let mut shadows = self.shadows();
        shadows.next_revision += 1;
        let temp = TempField {
            field_id: located.field.id,
            record_id: located.record_id,
            name: located.field.name.clone(),
            kind: located.field.kind.clone(),
            content,
            revision: shadows.next_revision,
            updated_at: now,
        };
        shadows
            .by_record
            .entry(located.record_id)
            .or_default()
            .insert(located.field.id, temp.clone());
        temp
    }

    /// Detached copies of every shadow for the record, ordered by field id.
    pub fn get_autosaved_fields(&self, record_id: RecordId) -> Vec<DetachedField> {
        self.shadows()
            .by_record
            .get(&record_id)
            .map(|fields| fields.values().map(TempField::detach).collect())
            .unwrap_or_default()
    }

    pub fn has_autosave(&self, record_id: RecordId) -> bool {
        self.shadows().by_record.get(&record_id).is_some_and(|fields| !fields.is_empty())
    }

    /// Delete every shadow for the record. Canonical fields and the lock are untouched.
    pub fn cancel_autosave(&self, record_id: RecordId) -> usize {
        self.shadows().by_record.remove(&record_id).map(|fields| fields.len()).unwrap_or(0)
    }

    /// Snapshot of the pending shadows, for the commit path.
    pub fn pending(&self, record_id: RecordId) -> Vec<TempField> {
        self.shadows()
            .by_record
            .get(&record_id)
            .map(|fields| fields.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove the shadows that were merged, unless rewritten since the snapshot.
    pub fn discard_consumed(&self, record_id: RecordId, consumed: &[TempField]) -> usize {
        let mut shadows = self.shadows();
        let Some(fields) = shadows.by_record.get_mut(&record_id) else {
            return 0;
        };

        let mut removed = 0;
        for temp in consumed {
            if fields.get(&temp.field_id).is_some_and(|current| current.revision == temp.revision) {
                fields.remove(&temp.field_id);
                removed += 1;
            }
        }
        if fields.is_empty() {
            shadows.by_record.remove(&record_id);
        }
        removed
    }

    fn shadows(&self) -> MutexGuard<'_, Shadows> {
        self.shadows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
