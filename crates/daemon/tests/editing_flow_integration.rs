use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use labnote_common::field::FieldKind;
use labnote_common::types::{
    DeleteOutcome, EditStatus, FieldId, ModificationDate, Permission, Record, RecordId,
};
use labnote_daemon::audit::{AuditKind, MemoryAuditSink};
use labnote_daemon::collab::{LocatedField, PersistOutcome, RecordStorage};
use labnote_daemon::editing::save::NOTHING_PENDING_WARNING;
use labnote_daemon::editing::{Collaborators, EditingOptions, EditingService};
use labnote_daemon::error::{EditError, EditResult};
use labnote_daemon::store::grants::RecordGrants;
use labnote_daemon::store::meta_db::MetaDb;
use labnote_daemon::store::records::{NewField, NewRecord, SqliteRecordStore};
use labnote_daemon::store::sessions::SessionRegistry;
use tempfile::TempDir;

type Hook = Box<dyn FnOnce() + Send>;

/// One-shot callbacks run around the next `load_record`.
#[derive(Default)]
struct LoadHooks {
    before: Mutex<Option<Hook>>,
    after: Mutex<Option<Hook>>,
}

impl LoadHooks {
    fn before_next_load(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before.lock().unwrap() = Some(Box::new(hook));
    }

    fn after_next_load(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after.lock().unwrap() = Some(Box::new(hook));
    }
}

struct HookedStorage {
    inner: SqliteRecordStore,
    hooks: Arc<LoadHooks>,
}

impl RecordStorage for HookedStorage {
    fn load_record(&self, record_id: RecordId) -> anyhow::Result<Option<Record>> {
        let before = self.hooks.before.lock().unwrap().take();
        if let Some(hook) = before {
            hook();
        }
        let record = self.inner.load_record(record_id)?;
        let after = self.hooks.after.lock().unwrap().take();
        if let Some(hook) = after {
            hook();
        }
        Ok(record)
    }

    fn locate_field(&self, field_id: FieldId) -> anyhow::Result<Option<LocatedField>> {
        self.inner.locate_field(field_id)
    }

    fn persist(&self, record: &Record, expected: ModificationDate) -> anyhow::Result<PersistOutcome> {
        self.inner.persist(record, expected)
    }

    fn mark_deleted(&self, record_id: RecordId) -> anyhow::Result<bool> {
        self.inner.mark_deleted(record_id)
    }
}

struct Harness {
    service: Arc<EditingService>,
    records: SqliteRecordStore,
    grants: RecordGrants,
    sessions: SessionRegistry,
    audit: Arc<MemoryAuditSink>,
    hooks: Arc<LoadHooks>,
    db: Arc<Mutex<MetaDb>>,
    _dir: TempDir,
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(0).single().expect("epoch should be valid")
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let db = MetaDb::open(dir.path().join("labnote.db")).expect("db should open");
    let db = Arc::new(Mutex::new(db));

    let records = SqliteRecordStore::new(Arc::clone(&db));
    let grants = RecordGrants::new(Arc::clone(&db));
    let sessions = SessionRegistry::new(Arc::clone(&db), Duration::minutes(30));
    let audit = Arc::new(MemoryAuditSink::new());
    let hooks = Arc::new(LoadHooks::default());

    let service = EditingService::new(
        Collaborators {
            storage: Arc::new(HookedStorage { inner: records.clone(), hooks: hooks.clone() }),
            authorization: Arc::new(grants.clone()),
            sessions: Arc::new(sessions.clone()),
            audit: audit.clone(),
        },
        EditingOptions::default(),
    )
    .with_clock(epoch);

    sessions.login("s-alice", "alice").expect("alice should log in");
    sessions.login("s-bob", "bob").expect("bob should log in");

    Harness { service: Arc::new(service), records, grants, sessions, audit, hooks, db, _dir: dir }
}

/// D: F1 = "a" (text), F2 = "b" (text), F3 = "" (number), modification date 100.
fn seed_document(h: &Harness) -> Record {
    let record = h
        .records
        .create_record(&NewRecord {
            owner: "alice".into(),
            name: "D".into(),
            parent_id: Some(1),
            modification_date: 100,
            signed: false,
            fields: vec![
                NewField { name: "F1".into(), kind: FieldKind::Text { max_len: None }, content: "a".into() },
                NewField { name: "F2".into(), kind: FieldKind::Text { max_len: None }, content: "b".into() },
                NewField {
                    name: "F3".into(),
                    kind: FieldKind::Number { min: Some(0.0), max: Some(100.0), decimal_places: None },
                    content: String::new(),
                },
            ],
        })
        .expect("document should be created");
    h.grants.grant(record.id, "bob", Permission::Write).expect("bob should get write access");
    record
}

/// Flip the signed flag directly, the way an out-of-band signing step would.
fn sign_in_place(db: &Mutex<MetaDb>, record_id: RecordId) {
    db.lock()
        .unwrap()
        .connection()
        .execute("UPDATE records SET signed = 1 WHERE id = ?1", [record_id])
        .expect("record should be signed");
}

fn reload(h: &Harness, record: &Record) -> Record {
    h.records
        .load_record(record.id)
        .expect("load should succeed")
        .expect("record should exist")
}

#[test]
fn lock_autosave_commit_and_handover() {
    let h = harness();
    let d = seed_document(&h);
    let (f1, f2) = (d.fields[0].id, d.fields[1].id);

    assert_eq!(h.service.request_edit(d.id, "alice").unwrap(), EditStatus::EditMode);
    h.service.autosave_field(f1, "draft".into(), "alice").expect("autosave should succeed");

    assert_eq!(
        h.service.request_edit(d.id, "bob").unwrap(),
        EditStatus::CannotEditOtherEditing { holder: "alice".into() }
    );

    let early = h.service.changes_since(d.id, "bob", 100).expect("poll should succeed");
    assert!(early.fields.is_empty(), "autosave must not touch canonical state");

    let outcome = h.service.save(d.id, "alice", true, Some(100)).expect("save should succeed");
    assert_eq!(outcome.modification_date, 101);
    assert_eq!(outcome.merged_fields, vec![f1]);
    assert!(outcome.lock_released);
    assert_eq!(outcome.navigation.parent_id, Some(1));

    let saved = reload(&h, &d);
    assert_eq!(saved.field(f1).unwrap().content, "draft");
    assert_eq!(saved.field(f2).unwrap().content, "b");
    assert_eq!(saved.modification_date, 101);
    assert_eq!(h.service.tracker().current_holder(d.id), None);
    assert!(!h.service.autosave().has_autosave(d.id));

    assert_eq!(h.service.request_edit(d.id, "bob").unwrap(), EditStatus::EditMode);

    let changes = h.service.changes_since(d.id, "bob", 100).expect("poll should succeed");
    assert_eq!(changes.modification_date, 101);
    let contents: Vec<(&str, &str)> =
        changes.fields.iter().map(|field| (field.name.as_str(), field.content.as_str())).collect();
    assert_eq!(contents, vec![("F1", "draft"), ("F2", "b"), ("F3", "")]);

    let events = h.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AuditKind::Write);
    assert_eq!(events[0].actor, "alice");
}

#[test]
fn concurrent_edit_requests_grant_exactly_one_lock() {
    let h = harness();
    let d = seed_document(&h);
    let users: Vec<String> = (0..8).map(|n| format!("user-{n}")).collect();
    for user in &users {
        h.grants.grant(d.id, user, Permission::Write).unwrap();
        h.sessions.login(&format!("s-{user}"), user).unwrap();
    }

    let barrier = Arc::new(Barrier::new(users.len()));
    let handles: Vec<_> = users
        .iter()
        .cloned()
        .map(|user| {
            let service = Arc::clone(&h.service);
            let barrier = Arc::clone(&barrier);
            let record_id = d.id;
            thread::spawn(move || {
                barrier.wait();
                service.request_edit(record_id, &user).expect("request should succeed")
            })
        })
        .collect();

    let statuses: Vec<EditStatus> =
        handles.into_iter().map(|handle| handle.join().expect("thread should finish")).collect();
    assert_eq!(statuses.iter().filter(|status| status.is_edit_mode()).count(), 1);

    let holder = h.service.tracker().current_holder(d.id).expect("a holder should exist");
    for status in statuses.iter().filter(|status| !status.is_edit_mode()) {
        assert_eq!(status, &EditStatus::CannotEditOtherEditing { holder: holder.clone() });
    }
}

#[test]
fn lock_of_a_dead_session_is_reclaimed() {
    let h = harness();
    let d = seed_document(&h);

    assert_eq!(h.service.request_edit(d.id, "alice").unwrap(), EditStatus::EditMode);
    h.sessions.logout("s-alice", "alice").unwrap();

    assert_eq!(h.service.request_edit(d.id, "bob").unwrap(), EditStatus::EditMode);
    assert_eq!(h.service.tracker().current_holder(d.id).as_deref(), Some("bob"));

    h.sessions.login("s-alice-2", "alice").unwrap();
    assert_eq!(
        h.service.request_edit(d.id, "alice").unwrap(),
        EditStatus::CannotEditOtherEditing { holder: "bob".into() }
    );
}

#[test]
fn autosave_round_trip_and_cancel() {
    let h = harness();
    let d = seed_document(&h);
    let f1 = d.fields[0].id;

    h.service.request_edit(d.id, "alice").unwrap();
    h.service.autosave_field(f1, "x".into(), "alice").unwrap();

    let autosaved = h.service.get_autosaved_fields(d.id, "alice").unwrap();
    assert!(autosaved.has_autosave);
    assert_eq!(autosaved.fields.len(), 1);
    assert_eq!(autosaved.fields[0].id, f1);
    assert_eq!(autosaved.fields[0].content, "x");

    let navigation = h.service.cancel_autosave(d.id, "alice").unwrap();
    assert_eq!(navigation.parent_id, Some(1));
    assert!(!h.service.get_autosaved_fields(d.id, "alice").unwrap().has_autosave);

    assert_eq!(h.service.tracker().current_holder(d.id).as_deref(), Some("alice"));
    assert_eq!(reload(&h, &d), d);
}

#[test]
fn storage_failure_leaves_record_shadows_and_lock_intact() {
    let h = harness();
    let d = seed_document(&h);
    let (f1, f2) = (d.fields[0].id, d.fields[1].id);

    h.service.request_edit(d.id, "alice").unwrap();
    h.service.autosave_field(f1, "draft".into(), "alice").unwrap();
    h.service.autosave_field(f2, "second".into(), "alice").unwrap();

    h.db.lock()
        .unwrap()
        .connection()
        .execute_batch(&format!(
            "CREATE TRIGGER fail_f2 BEFORE UPDATE ON fields WHEN NEW.id = {f2} \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
        ))
        .expect("failure trigger should be installed");

    let error = h.service.save(d.id, "alice", true, Some(100)).unwrap_err();
    assert!(matches!(error, EditError::Storage(_)), "unexpected error: {error}");

    assert_eq!(reload(&h, &d), d);
    let pending = h.service.get_autosaved_fields(d.id, "alice").unwrap();
    assert_eq!(pending.fields.len(), 2);
    assert_eq!(h.service.tracker().current_holder(d.id).as_deref(), Some("alice"));
    assert!(h.audit.events().is_empty());

    h.db.lock().unwrap().connection().execute_batch("DROP TRIGGER fail_f2;").unwrap();
    let outcome = h.service.save(d.id, "alice", true, Some(100)).expect("retry should succeed");
    assert_eq!(outcome.merged_fields, vec![f1, f2]);
    assert_eq!(reload(&h, &d).field(f2).unwrap().content, "second");
}

#[test]
fn timestamps_strictly_increase_and_drive_change_polling() {
    let h = harness();
    let d = seed_document(&h);
    let f1 = d.fields[0].id;
    h.service.request_edit(d.id, "alice").unwrap();

    let mut previous = d.modification_date;
    for content in ["one", "two", "three"] {
        h.service.autosave_field(f1, content.into(), "alice").unwrap();
        let outcome = h.service.save(d.id, "alice", false, Some(previous)).unwrap();
        assert!(outcome.modification_date > previous);

        let stale = h.service.changes_since(d.id, "bob", previous).unwrap();
        assert_eq!(stale.fields[0].content, content);
        let current = h.service.changes_since(d.id, "bob", outcome.modification_date).unwrap();
        assert!(current.fields.is_empty());

        previous = outcome.modification_date;
    }
    assert_eq!(previous, 103);
}

#[test]
fn stale_baseline_is_rejected_before_anything_changes() {
    let h = harness();
    let d = seed_document(&h);
    let f1 = d.fields[0].id;
    h.service.request_edit(d.id, "alice").unwrap();
    h.service.autosave_field(f1, "draft".into(), "alice").unwrap();

    let error = h.service.save(d.id, "alice", true, Some(99)).unwrap_err();
    assert!(matches!(
        error,
        EditError::DocumentAlreadyEdited { baseline: 99, current: 100, .. }
    ));
    assert_eq!(reload(&h, &d), d);
    assert!(h.service.autosave().has_autosave(d.id));
    assert_eq!(h.service.tracker().current_holder(d.id).as_deref(), Some("alice"));
}

#[test]
fn autosave_validates_before_checking_the_lock() {
    let h = harness();
    let d = seed_document(&h);
    let f3 = d.fields[2].id;
    h.service.request_edit(d.id, "alice").unwrap();

    let invalid = h.service.autosave_field(f3, "lots".into(), "bob").unwrap_err();
    assert!(matches!(invalid, EditError::Validation(ref v) if v.field_id == f3));

    let out_of_range = h.service.autosave_field(f3, "101".into(), "alice").unwrap_err();
    assert!(matches!(out_of_range, EditError::Validation(_)));

    let not_holder = h.service.autosave_field(f3, "42".into(), "bob").unwrap_err();
    assert!(not_holder.is_authorization_failure());
    assert!(!h.service.autosave().has_autosave(d.id));
}

#[test]
fn save_requires_the_lock() {
    let h = harness();
    let d = seed_document(&h);

    let unlocked = h.service.save(d.id, "alice", true, None).unwrap_err();
    assert!(matches!(unlocked, EditError::NotLockHolder { holder: None, .. }));

    h.service.request_edit(d.id, "alice").unwrap();
    let other = h.service.save(d.id, "bob", true, None).unwrap_err();
    assert!(matches!(other, EditError::NotLockHolder { holder: Some(ref holder), .. } if holder == "alice"));
    assert_eq!(reload(&h, &d).modification_date, 100);
}

#[test]
fn save_with_nothing_pending_still_commits() {
    let h = harness();
    let d = seed_document(&h);
    h.service.request_edit(d.id, "alice").unwrap();

    let outcome = h.service.save(d.id, "alice", false, None).unwrap();
    assert_eq!(outcome.modification_date, 101);
    assert!(outcome.merged_fields.is_empty());
    assert_eq!(outcome.warnings, vec![NOTHING_PENDING_WARNING.to_string()]);
    assert!(!outcome.lock_released);
    assert_eq!(h.service.tracker().current_holder(d.id).as_deref(), Some("alice"));
}

#[test]
fn mismatched_unlock_is_acknowledged_without_effect() {
    let h = harness();
    let d = seed_document(&h);
    h.service.request_edit(d.id, "alice").unwrap();

    assert!(!h.service.unlock(d.id, "bob").released);
    assert_eq!(h.service.tracker().current_holder(d.id).as_deref(), Some("alice"));
    assert!(h.service.unlock(d.id, "alice").released);
    assert!(!h.service.unlock(d.id, "alice").released);
}

#[test]
fn delete_respects_the_lock_and_cleans_up() {
    let h = harness();
    let d = seed_document(&h);
    let f1 = d.fields[0].id;
    h.service.request_edit(d.id, "alice").unwrap();
    h.service.autosave_field(f1, "draft".into(), "alice").unwrap();

    let refused = h.service.delete_record(d.id, "bob").unwrap();
    assert_eq!(
        refused,
        DeleteOutcome::Refused {
            status: EditStatus::CannotEditOtherEditing { holder: "alice".into() },
            holder: Some("alice".into()),
        }
    );
    assert!(!reload(&h, &d).deleted);

    let deleted = h.service.delete_record(d.id, "alice").unwrap();
    assert!(matches!(deleted, DeleteOutcome::Deleted { navigation } if navigation.parent_id == Some(1)));
    assert!(reload(&h, &d).deleted);
    assert_eq!(h.service.tracker().current_holder(d.id), None);
    assert!(!h.service.autosave().has_autosave(d.id));
    assert_eq!(h.service.request_edit(d.id, "alice").unwrap(), EditStatus::CanNeverEdit);

    let events = h.audit.events();
    assert_eq!(events.last().map(|event| event.kind), Some(AuditKind::Delete));
}

#[test]
fn permission_checks_gate_every_entry_point() {
    let h = harness();
    let d = seed_document(&h);
    h.grants.grant(d.id, "carol", Permission::Read).unwrap();
    h.sessions.login("s-carol", "carol").unwrap();

    let view = h.service.request_view(d.id, "mallory").unwrap();
    assert_eq!(view.status, EditStatus::AccessDenied);
    assert!(view.record.is_none());

    let view = h.service.request_view(d.id, "carol").unwrap();
    assert_eq!(view.status, EditStatus::ViewMode);
    assert_eq!(view.record.as_ref().map(|record| record.id), Some(d.id));

    assert_eq!(h.service.request_edit(d.id, "carol").unwrap(), EditStatus::AccessDenied);
    assert!(matches!(
        h.service.get_autosaved_fields(d.id, "mallory"),
        Err(EditError::AccessDenied { .. })
    ));
    assert!(matches!(
        h.service.changes_since(d.id, "mallory", 0),
        Err(EditError::AccessDenied { .. })
    ));
    assert!(matches!(
        h.service.cancel_autosave(d.id, "carol"),
        Err(EditError::AccessDenied { .. })
    ));
    assert!(matches!(
        h.service.delete_record(d.id, "carol").unwrap(),
        DeleteOutcome::Refused { status: EditStatus::AccessDenied, holder: None }
    ));
}

#[test]
fn signed_records_are_frozen() {
    let h = harness();
    let d = seed_document(&h);
    sign_in_place(&h.db, d.id);

    assert_eq!(h.service.request_edit(d.id, "alice").unwrap(), EditStatus::CanNeverEdit);
    assert_eq!(h.service.request_view(d.id, "alice").unwrap().status, EditStatus::CanNeverEdit);
    assert_eq!(h.service.tracker().current_holder(d.id), None);
}

#[test]
fn save_after_the_holder_deleted_the_record_is_refused() {
    let h = harness();
    let d = seed_document(&h);
    let f1 = d.fields[0].id;
    h.service.request_edit(d.id, "alice").unwrap();
    h.service.autosave_field(f1, "draft".into(), "alice").unwrap();
    h.service.delete_record(d.id, "alice").unwrap();

    let error = h.service.save(d.id, "alice", true, None).unwrap_err();
    assert!(matches!(error, EditError::NotLockHolder { holder: None, .. }));

    let stored = reload(&h, &d);
    assert!(stored.deleted);
    assert_eq!(stored.modification_date, 100);
    assert_eq!(stored.fields[0].content, "a");
    assert!(h.audit.events().iter().all(|event| event.kind != AuditKind::Write));
}

#[test]
fn delete_cannot_run_while_a_save_is_in_flight() {
    let h = harness();
    let d = seed_document(&h);
    let f1 = d.fields[0].id;
    h.service.request_edit(d.id, "alice").unwrap();
    h.service.autosave_field(f1, "draft".into(), "alice").unwrap();

    let attempted: Arc<Mutex<Option<EditResult<DeleteOutcome>>>> = Arc::new(Mutex::new(None));
    let service = Arc::downgrade(&h.service);
    let slot = Arc::clone(&attempted);
    let record_id = d.id;
    h.hooks.before_next_load(move || {
        let service = service.upgrade().expect("service should still be alive");
        *slot.lock().unwrap() = Some(service.delete_record(record_id, "alice"));
    });

    let outcome = h.service.save(d.id, "alice", true, None).expect("save should commit");
    assert_eq!(outcome.merged_fields, vec![f1]);

    let delete = attempted.lock().unwrap().take().expect("delete should have been attempted");
    assert!(matches!(delete, Err(EditError::OperationInProgress { .. })));
    let stored = reload(&h, &d);
    assert!(!stored.deleted);
    assert_eq!(stored.fields[0].content, "draft");
}

#[test]
fn save_refuses_a_record_signed_before_it_was_loaded() {
    let h = harness();
    let d = seed_document(&h);
    let f1 = d.fields[0].id;
    h.service.request_edit(d.id, "alice").unwrap();
    h.service.autosave_field(f1, "draft".into(), "alice").unwrap();

    let db = Arc::clone(&h.db);
    let record_id = d.id;
    h.hooks.before_next_load(move || sign_in_place(&db, record_id));

    let error = h.service.save(d.id, "alice", true, None).unwrap_err();
    assert!(matches!(error, EditError::NotEditable { record_id } if record_id == d.id));

    let stored = reload(&h, &d);
    assert!(stored.signed);
    assert_eq!(stored.modification_date, 100);
    assert_eq!(stored.fields[0].content, "a");
    assert!(h.audit.events().is_empty());
}

#[test]
fn signing_during_a_save_is_not_reverted() {
    let h = harness();
    let d = seed_document(&h);
    let f1 = d.fields[0].id;
    h.service.request_edit(d.id, "alice").unwrap();
    h.service.autosave_field(f1, "draft".into(), "alice").unwrap();

    let db = Arc::clone(&h.db);
    let record_id = d.id;
    h.hooks.after_next_load(move || sign_in_place(&db, record_id));

    let error = h.service.save(d.id, "alice", true, None).unwrap_err();
    assert!(matches!(error, EditError::NotEditable { .. }));

    let stored = reload(&h, &d);
    assert!(stored.signed, "the signed flag must survive the stale snapshot");
    assert_eq!(stored.modification_date, 100);
    assert_eq!(stored.fields[0].content, "a");
    assert!(h.audit.events().is_empty());
    assert!(h.service.autosave().has_autosave(d.id));
}
