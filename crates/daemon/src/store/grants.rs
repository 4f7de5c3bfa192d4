// Per-record permission grants.
//
// The record owner is always permitted. Everyone else needs a row in
// `record_grants`; a `write` grant also satisfies `read`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use labnote_common::types::{Permission, Record, RecordId};
use rusqlite::params;

use crate::collab::Authorization;
use crate::store::meta_db::MetaDb;

#[derive(Clone)]
pub struct RecordGrants {
    db: Arc<Mutex<MetaDb>>,
}

impl RecordGrants {
    pub fn new(db: Arc<Mutex<MetaDb>>) -> Self {
        Self { db }
    }

    /// Returns `false` when the grant already existed.
    pub fn grant(&self, record_id: RecordId, username: &str, permission: Permission) -> Result<bool> {
        let changed = self
            .db()
            .connection()
            .execute(
                "INSERT OR IGNORE INTO record_grants (record_id, username, permission) \
                 VALUES (?1, ?2, ?3)",
                params![record_id, username, permission.as_str()],
            )
            .context("failed to insert record grant")?;
        Ok(changed > 0)
    }

    pub fn revoke(&self, record_id: RecordId, username: &str, permission: Permission) -> Result<bool> {
        let changed = self
            .db()
            .connection()
            .execute(
                "DELETE FROM record_grants \
                 WHERE record_id = ?1 AND username = ?2 AND permission = ?3",
                params![record_id, username, permission.as_str()],
            )
            .context("failed to delete record grant")?;
        Ok(changed > 0)
    }

    fn db(&self) -> MutexGuard<'_, MetaDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn satisfied_by(permission: Permission) -> &'static [&'static str] {
    match permission {
        Permission::Read => &["read", "write"],
        Permission::Write => &["write"],
        Permission::Delete => &["delete"],
    }
}

impl Authorization for RecordGrants {
    fn is_permitted(&self, user: &str, record: &Record, permission: Permission) -> Result<bool> {
        if record.owner == user {
            return Ok(true);
        }

        let accepted = satisfied_by(permission);
        let db = self.db();
        let mut stmt = db
            .connection()
            .prepare(
                "SELECT permission FROM record_grants WHERE record_id = ?1 AND username = ?2",
            )
            .context("failed to prepare permission check")?;
        let rows = stmt
            .query_map(params![record.id, user], |row| row.get::<_, String>(0))
            .context("failed to check permission")?;

        for raw in rows {
            if accepted.contains(&raw.context("failed to decode grant row")?.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
