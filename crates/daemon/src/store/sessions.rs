// User session persistence and liveness checks.
//
// Each login creates a row in `user_sessions`. Sessions transition:
// active → disconnected → expired. A user counts as live while any of their
// sessions is active and was seen within the idle window.
//
// Timestamps are stored as fixed-width RFC 3339 (millisecond precision, `Z`
// suffix) so string comparison in SQL orders them correctly.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::collab::ActiveSessionRegistry;
use crate::store::meta_db::MetaDb;

// ── Types ────────────────────────────────────────────────────────────

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Disconnected,
    Expired,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disconnected => "disconnected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "disconnected" => Some(Self::Disconnected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A persisted user session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub session_id: String,
    pub username: String,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: SessionStatus,
}

// ── Store ────────────────────────────────────────────────────────────

/// Stateless CRUD operations on the `user_sessions` table.
pub struct SessionStore;

impl SessionStore {
    pub fn create(conn: &Connection, session: &UserSession) -> Result<()> {
        conn.execute(
            "INSERT INTO user_sessions \
             (session_id, username, started_at, last_seen_at, status) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.session_id,
                session.username,
                sql_ts(session.started_at),
                sql_ts(session.last_seen_at),
                session.status.as_str(),
            ],
        )
        .context("failed to insert user session")?;
        Ok(())
    }

    pub fn get(conn: &Connection, session_id: &str) -> Result<Option<UserSession>> {
        let mut stmt = conn
            .prepare(
                "SELECT session_id, username, started_at, last_seen_at, status \
                 FROM user_sessions WHERE session_id = ?1",
            )
            .context("failed to prepare session query")?;

        let mut rows = stmt
            .query_map(params![session_id], row_to_session)
            .context("failed to query user session")?;

        match rows.next() {
            Some(row) => Ok(Some(row.context("failed to decode session row")?)),
            None => Ok(None),
        }
    }

    /// Whether `username` has an active session seen at or after `cutoff`.
    pub fn has_live_session(
        conn: &Connection,
        username: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM user_sessions \
                 WHERE username = ?1 AND status = 'active' AND last_seen_at >= ?2",
                params![username, sql_ts(cutoff)],
                |row| row.get(0),
            )
            .context("failed to check session liveness")?;
        Ok(count > 0)
    }

    pub fn update_status(
        conn: &Connection,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE user_sessions SET status = ?1 WHERE session_id = ?2",
                params![status.as_str(), session_id],
            )
            .context("failed to update session status")?;
        Ok(changed > 0)
    }

    /// Update `last_seen_at` (heartbeat).
    pub fn touch(conn: &Connection, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE user_sessions SET last_seen_at = ?1 WHERE session_id = ?2",
                params![sql_ts(now), session_id],
            )
            .context("failed to touch session")?;
        Ok(changed > 0)
    }

    /// Prune sessions with `last_seen_at` older than `cutoff`.
    pub fn prune_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
        conn.execute(
            "DELETE FROM user_sessions WHERE last_seen_at < ?1",
            params![sql_ts(cutoff)],
        )
        .context("failed to prune old user sessions")
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Liveness view over `user_sessions` used for stale-lock recovery.
#[derive(Clone)]
pub struct SessionRegistry {
    db: Arc<Mutex<MetaDb>>,
    idle_timeout: Duration,
    clock: fn() -> DateTime<Utc>,
}

impl SessionRegistry {
    pub fn new(db: Arc<Mutex<MetaDb>>, idle_timeout: Duration) -> Self {
        Self { db, idle_timeout, clock: Utc::now }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Open a new active session for `username`.
    ///
    /// Rows not seen within the idle window are pruned first; they can no
    /// longer protect a lock, so nothing reads them again.
    pub fn login(&self, session_id: &str, username: &str) -> Result<UserSession> {
        let now = (self.clock)();
        let session = UserSession {
            session_id: session_id.to_string(),
            username: username.to_string(),
            started_at: now,
            last_seen_at: now,
            status: SessionStatus::Active,
        };

        let db = self.db();
        let pruned = SessionStore::prune_older_than(db.connection(), now - self.idle_timeout)?;
        if pruned > 0 {
            debug!(pruned, "pruned idle user sessions");
        }
        SessionStore::create(db.connection(), &session)?;
        Ok(session)
    }

    /// Refresh an active session of `username`. `false` for unknown, ended or
    /// someone else's sessions.
    pub fn heartbeat(&self, session_id: &str, username: &str) -> Result<bool> {
        let db = self.db();
        if !owns_active(db.connection(), session_id, username)? {
            return Ok(false);
        }
        SessionStore::touch(db.connection(), session_id, (self.clock)())
    }

    pub fn logout(&self, session_id: &str, username: &str) -> Result<bool> {
        let db = self.db();
        if !owns_active(db.connection(), session_id, username)? {
            return Ok(false);
        }
        SessionStore::update_status(db.connection(), session_id, SessionStatus::Disconnected)
    }

    fn db(&self) -> MutexGuard<'_, MetaDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActiveSessionRegistry for SessionRegistry {
    fn is_active(&self, username: &str) -> Result<bool> {
        let cutoff = (self.clock)() - self.idle_timeout;
        SessionStore::has_live_session(self.db().connection(), username, cutoff)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn owns_active(conn: &Connection, session_id: &str, username: &str) -> Result<bool> {
    Ok(SessionStore::get(conn, session_id)?
        .is_some_and(|session| session.username == username && session.status == SessionStatus::Active))
}

fn sql_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserSession> {
    let started_raw: String = row.get(2)?;
    let seen_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;

    let started_at = started_raw
        .parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;
    let last_seen_at = seen_raw
        .parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;
    let status = SessionStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("invalid session status `{status_raw}`").into(),
        )
    })?;

    Ok(UserSession {
        session_id: row.get(0)?,
        username: row.get(1)?,
        started_at,
        last_seen_at,
        status,
    })
}
