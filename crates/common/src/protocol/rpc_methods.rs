// RPC method name constants: derived from contracts/jsonrpc-methods.json.

// ── Daemon-internal ────────────────────────────────────────────────
pub const RPC_PING: &str = "rpc.ping";
pub const DAEMON_SHUTDOWN: &str = "daemon.shutdown";

// ── Sessions ───────────────────────────────────────────────────────
pub const SESSION_LOGIN: &str = "session.login";
pub const SESSION_HEARTBEAT: &str = "session.heartbeat";
pub const SESSION_LOGOUT: &str = "session.logout";

// ── Records and sharing ────────────────────────────────────────────
pub const RECORD_CREATE: &str = "record.create";
pub const RECORD_GRANT: &str = "record.grant";
pub const RECORD_REVOKE: &str = "record.revoke";

// ── Record editing ─────────────────────────────────────────────────
pub const RECORD_VIEW: &str = "record.view";
pub const RECORD_EDIT: &str = "record.edit";
pub const RECORD_SAVE: &str = "record.save";
pub const RECORD_UNLOCK: &str = "record.unlock";
pub const RECORD_DELETE: &str = "record.delete";
pub const RECORD_CHANGES_SINCE: &str = "record.changes_since";

// ── Autosave ───────────────────────────────────────────────────────
pub const AUTOSAVE_FIELD: &str = "autosave.field";
pub const AUTOSAVE_LIST: &str = "autosave.list";
pub const AUTOSAVE_CANCEL: &str = "autosave.cancel";

/// All methods the daemon currently dispatches.
pub const IMPLEMENTED_METHODS: &[&str] = &[
    RPC_PING,
    DAEMON_SHUTDOWN,
    SESSION_LOGIN,
    SESSION_HEARTBEAT,
    SESSION_LOGOUT,
    RECORD_CREATE,
    RECORD_GRANT,
    RECORD_REVOKE,
    RECORD_VIEW,
    RECORD_EDIT,
    RECORD_SAVE,
    RECORD_UNLOCK,
    RECORD_DELETE,
    RECORD_CHANGES_SINCE,
    AUTOSAVE_FIELD,
    AUTOSAVE_LIST,
    AUTOSAVE_CANCEL,
];

/// Methods acknowledged in the contract as planned but not yet implemented.
pub const PLANNED_METHODS: &[&str] = &["record.history", "record.sign"];
