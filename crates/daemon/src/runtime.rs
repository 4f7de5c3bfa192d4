use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

use crate::audit::TracingAuditSink;
use crate::config::DaemonConfig;
use crate::editing::{Collaborators, EditingService};
use crate::rpc::methods::RpcServerState;
use crate::rpc::unix::serve_unix_until_shutdown;
use crate::security::ensure_owner_only_file;
use crate::startup::DaemonPaths;
use crate::store::grants::RecordGrants;
use crate::store::meta_db::MetaDb;
use crate::store::records::SqliteRecordStore;
use crate::store::sessions::SessionRegistry;
use crate::workspace::WorkspaceService;

/// Editing and workspace services plus direct handles to the stores behind them.
pub struct DaemonServices {
    pub editing: Arc<EditingService>,
    pub workspace: Arc<WorkspaceService>,
    pub records: SqliteRecordStore,
    pub grants: RecordGrants,
    pub sessions: SessionRegistry,
}

/// Open the database at `db_path` and wire the editing core to it.
pub fn open_services(db_path: &Path, config: &DaemonConfig) -> Result<DaemonServices> {
    let db = MetaDb::open(db_path)?;
    ensure_owner_only_file(db_path)?;
    let db = Arc::new(Mutex::new(db));

    let records = SqliteRecordStore::new(Arc::clone(&db));
    let grants = RecordGrants::new(Arc::clone(&db));
    let sessions = SessionRegistry::new(Arc::clone(&db), config.idle_timeout());

    let editing = EditingService::new(
        Collaborators {
            storage: Arc::new(records.clone()),
            authorization: Arc::new(grants.clone()),
            sessions: Arc::new(sessions.clone()),
            audit: Arc::new(TracingAuditSink),
        },
        config.editing_options(),
    );

    let workspace = WorkspaceService::new(records.clone(), grants.clone(), sessions.clone());

    Ok(DaemonServices {
        editing: Arc::new(editing),
        workspace: Arc::new(workspace),
        records,
        grants,
        sessions,
    })
}

impl DaemonServices {
    /// RPC state serving both services.
    pub fn rpc_state(&self) -> RpcServerState {
        RpcServerState::new(Arc::clone(&self.editing), Arc::clone(&self.workspace))
    }
}

pub async fn run_standalone() -> Result<()> {
    let config = DaemonConfig::load().context("failed to load ~/.labnote/config.toml")?;
    run_standalone_with_paths(DaemonPaths::resolve()?, config).await
}

async fn run_standalone_with_paths(paths: DaemonPaths, config: DaemonConfig) -> Result<()> {
    let (listener, lease) = paths.claim().await?;

    let db_path = config.db_path(&paths.base_dir);
    let services = open_services(&db_path, &config)?;
    info!(
        db_path = %db_path.display(),
        idle_timeout_sec = config.sessions.idle_timeout_sec,
        max_content_bytes = config.autosave.max_content_bytes,
        "editing service ready"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let state = services.rpc_state().with_shutdown_notifier(shutdown_tx.clone());
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = ctrl_c_tx.send(());
    });

    info!(socket_path = %paths.socket_path.display(), "standalone daemon started");
    let result = serve_unix_until_shutdown(listener, state, shutdown_rx).await;
    drop(lease);
    result.context("standalone daemon exited with error")
}
