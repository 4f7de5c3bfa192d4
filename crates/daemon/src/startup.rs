// State directory layout and the single-instance lease on the daemon socket.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

/// Where the daemon keeps its socket, PID file and (by default) database.
pub struct DaemonPaths {
    pub base_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
}

impl DaemonPaths {
    /// `~/.labnote/`, created owner-only if missing.
    pub fn resolve() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
            .context("could not determine home directory")?;
        Self::under(home.join(".labnote"))
    }

    pub fn under(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("failed to create `{}`", base_dir.display()))?;
        ensure_owner_only_dir(&base_dir)?;
        Ok(Self {
            socket_path: base_dir.join("daemon.sock"),
            pid_path: base_dir.join("daemon.pid"),
            base_dir,
        })
    }

    /// Bind the socket and record our PID, unless another daemon answers on it.
    /// A socket file nobody listens on is left over from a crash and replaced.
    pub async fn claim(&self) -> Result<(UnixListener, InstanceLease)> {
        if is_daemon_running(&self.socket_path).await {
            anyhow::bail!("a daemon is already listening on `{}`", self.socket_path.display());
        }
        remove_if_present(&self.socket_path)
            .with_context(|| format!("failed to remove stale `{}`", self.socket_path.display()))?;

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("failed to bind `{}`", self.socket_path.display()))?;
        let lease =
            InstanceLease { socket_path: self.socket_path.clone(), pid_path: self.pid_path.clone() };

        let pid = std::process::id();
        fs::write(&self.pid_path, pid.to_string())
            .with_context(|| format!("failed to write `{}`", self.pid_path.display()))?;
        ensure_owner_only_file(&self.pid_path)?;
        info!(pid, socket_path = %self.socket_path.display(), "daemon socket ready");
        Ok((listener, lease))
    }
}

/// Held for as long as this process owns the socket. Dropping it removes the
/// socket and PID files so the next start does not mistake them for a live daemon.
pub struct InstanceLease {
    socket_path: PathBuf,
    pid_path: PathBuf,
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        for path in [&self.pid_path, &self.socket_path] {
            if let Err(error) = remove_if_present(path) {
                warn!(path = %path.display(), %error, "failed to clean up daemon file");
            }
        }
    }
}

/// A daemon is running iff something accepts connections on the socket.
pub async fn is_daemon_running(socket_path: &Path) -> bool {
    UnixStream::connect(socket_path).await.is_ok()
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}
