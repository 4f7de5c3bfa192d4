// Canonical records and fields in `labnote.db`.
//
// `persist` is the only write path used by the editing core. It updates the
// record's timestamp and every field row in one transaction, guarded by the
// expected modification date and the record still being editable, so a
// failed, stale or frozen write leaves nothing behind.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Context, Result};
use labnote_common::field::FieldKind;
use labnote_common::types::{Field, FieldId, ModificationDate, Record, RecordId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::collab::{LocatedField, PersistOutcome, RecordStorage};
use crate::store::meta_db::MetaDb;

// ── Types ────────────────────────────────────────────────────────────

/// Input for creating a new record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub owner: String,
    pub name: String,
    pub parent_id: Option<RecordId>,
    pub modification_date: ModificationDate,
    pub signed: bool,
    pub fields: Vec<NewField>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub content: String,
}

// ── Store ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Arc<Mutex<MetaDb>>,
}

impl SqliteRecordStore {
    pub fn new(db: Arc<Mutex<MetaDb>>) -> Self {
        Self { db }
    }

    pub fn create_record(&self, new: &NewRecord) -> Result<Record> {
        let mut db = self.db();
        let tx = db.connection_mut().transaction().context("failed to start record insert")?;

        tx.execute(
            "INSERT INTO records (owner, name, parent_id, modification_date, deleted, signed) \
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![new.owner, new.name, new.parent_id, new.modification_date, new.signed],
        )
        .context("failed to insert record")?;
        let record_id = tx.last_insert_rowid();

        for (position, field) in new.fields.iter().enumerate() {
            let kind = serde_json::to_string(&field.kind).context("failed to encode field kind")?;
            tx.execute(
                "INSERT INTO fields (record_id, position, name, kind, content) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![record_id, position as i64, field.name, kind, field.content],
            )
            .with_context(|| format!("failed to insert field `{}`", field.name))?;
        }

        let record = load_record(&tx, record_id)?
            .with_context(|| format!("record {record_id} vanished after insert"))?;
        // Rolls back the insert on the first invalid field.
        for field in &record.fields {
            field.kind.validate(field.id, &field.content)?;
        }
        tx.commit().context("failed to commit record insert")?;
        Ok(record)
    }

    fn db(&self) -> MutexGuard<'_, MetaDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStorage for SqliteRecordStore {
    fn load_record(&self, record_id: RecordId) -> Result<Option<Record>> {
        load_record(self.db().connection(), record_id)
    }

    fn locate_field(&self, field_id: FieldId) -> Result<Option<LocatedField>> {
        self.db()
            .connection()
            .query_row(
                "SELECT record_id, id, name, kind, content FROM fields WHERE id = ?1",
                params![field_id],
                |row| Ok(LocatedField { record_id: row.get(0)?, field: row_to_field(row, 1)? }),
            )
            .optional()
            .with_context(|| format!("failed to locate field {field_id}"))
    }

    fn persist(
        &self,
        record: &Record,
        expected_modification_date: ModificationDate,
    ) -> Result<PersistOutcome> {
        let mut db = self.db();
        let tx = db.connection_mut().transaction().context("failed to start persist")?;

        let updated = tx
            .execute(
                "UPDATE records SET modification_date = ?1 \
                 WHERE id = ?2 AND modification_date = ?3 AND deleted = 0 AND signed = 0",
                params![record.modification_date, record.id, expected_modification_date],
            )
            .with_context(|| format!("failed to update record {}", record.id))?;

        if updated == 0 {
            let current: Option<(ModificationDate, bool, bool)> = tx
                .query_row(
                    "SELECT modification_date, deleted, signed FROM records WHERE id = ?1",
                    params![record.id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .context("failed to read current record state")?;
            return match current {
                Some((_, deleted, signed)) if deleted || signed => Ok(PersistOutcome::Frozen),
                Some((current, _, _)) => Ok(PersistOutcome::Stale { current }),
                None => bail!("record {} does not exist", record.id),
            };
        }

        for field in &record.fields {
            let changed = tx
                .execute(
                    "UPDATE fields SET content = ?1 WHERE id = ?2 AND record_id = ?3",
                    params![field.content, field.id, record.id],
                )
                .with_context(|| format!("failed to write field {}", field.id))?;
            if changed == 0 {
                bail!("field {} does not belong to record {}", field.id, record.id);
            }
        }

        tx.commit().with_context(|| format!("failed to commit record {}", record.id))?;
        Ok(PersistOutcome::Written)
    }

    fn mark_deleted(&self, record_id: RecordId) -> Result<bool> {
        let changed = self
            .db()
            .connection()
            .execute("UPDATE records SET deleted = 1 WHERE id = ?1", params![record_id])
            .with_context(|| format!("failed to delete record {record_id}"))?;
        Ok(changed > 0)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn load_record(conn: &Connection, record_id: RecordId) -> Result<Option<Record>> {
    let header = conn
        .query_row(
            "SELECT id, owner, name, parent_id, modification_date, deleted, signed \
             FROM records WHERE id = ?1",
            params![record_id],
            |row| {
                Ok(Record {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    name: row.get(2)?,
                    parent_id: row.get(3)?,
                    fields: Vec::new(),
                    modification_date: row.get(4)?,
                    deleted: row.get(5)?,
                    signed: row.get(6)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("failed to load record {record_id}"))?;

    let Some(mut record) = header else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT id, name, kind, content FROM fields \
             WHERE record_id = ?1 ORDER BY position, id",
        )
        .context("failed to prepare field query")?;
    let rows = stmt
        .query_map(params![record_id], |row| row_to_field(row, 0))
        .context("failed to query fields")?;
    record.fields = rows
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("failed to decode fields of record {record_id}"))?;

    Ok(Some(record))
}

fn row_to_field(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Field> {
    let kind_raw: String = row.get(offset + 2)?;
    let kind = serde_json::from_str::<FieldKind>(&kind_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            offset + 2,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;

    Ok(Field { id: row.get(offset)?, name: row.get(offset + 1)?, kind, content: row.get(offset + 3)? })
}
