use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use labnote_common::protocol::jsonrpc::{Request, RequestId, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

pub const DAEMON_NOT_RUNNING_EXIT_CODE: i32 = 10;

const SOCKET_RELATIVE_PATH: &str = ".labnote/daemon.sock";
const DEFAULT_TIMEOUT_SECS: u64 = 3;

#[derive(Debug)]
pub struct DaemonUnavailable {
    socket_path: PathBuf,
    source: io::Error,
}

impl DaemonUnavailable {
    fn new(socket_path: PathBuf, source: io::Error) -> Self {
        Self { socket_path, source }
    }

    pub fn exit_code(&self) -> i32 {
        DAEMON_NOT_RUNNING_EXIT_CODE
    }
}

impl fmt::Display for DaemonUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daemon is not running (socket `{}`)", self.socket_path.display())
    }
}

impl std::error::Error for DaemonUnavailable {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// An error object returned by the daemon, kept typed inside the `anyhow` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub method: String,
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

impl RemoteError {
    /// String field out of the error data, e.g. the current lock holder.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    pub fn data_i64(&self, key: &str) -> Option<i64> {
        self.data.as_ref()?.get(key)?.as_i64()
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({}): {}", self.method, self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

#[derive(Debug)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
    next_request_id: AtomicI64,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new(default_socket_path())
    }
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            next_request_id: AtomicI64::new(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One JSON-RPC round trip. Transport failures are retried once;
    /// daemon-side errors are returned as [`RemoteError`] without a retry.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).context("failed to serialize json-rpc params")?;
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);

        let response = match self.exchange(id, method, params.clone()).await {
            Ok(response) => response,
            Err(first_error) if first_error.downcast_ref::<DaemonUnavailable>().is_some() => {
                return Err(first_error);
            }
            Err(first_error) => self.exchange(id, method, params).await.map_err(|second_error| {
                second_error
                    .context(format!("json-rpc call failed after retry; first error: {first_error:#}"))
            })?,
        };

        if let Some(error) = response.error {
            return Err(anyhow!(RemoteError {
                method: method.to_string(),
                code: error.code,
                message: error.message,
                data: error.data,
            }));
        }

        let result = response.result.context("daemon json-rpc response missing `result` field")?;
        serde_json::from_value(result)
            .with_context(|| format!("failed to decode `{method}` result"))
    }

    async fn exchange(&self, id: i64, method: &str, params: Value) -> Result<Response> {
        let request = Request::new(method, Some(params), RequestId::Number(id));
        let mut payload = serde_json::to_vec(&request).context("failed to serialize json-rpc request")?;
        payload.push(b'\n');

        let stream = timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("timed out connecting to daemon socket")?
            .map_err(|err| {
                if is_daemon_unavailable_kind(err.kind()) {
                    anyhow!(DaemonUnavailable::new(self.socket_path.clone(), err))
                } else {
                    anyhow!(err).context(format!(
                        "failed to connect to daemon socket `{}`",
                        self.socket_path.display()
                    ))
                }
            })?;

        let (read_half, mut write_half) = stream.into_split();
        timeout(self.timeout, write_half.write_all(&payload))
            .await
            .context("timed out writing json-rpc request")?
            .context("failed writing json-rpc request to daemon socket")?;
        timeout(self.timeout, write_half.flush())
            .await
            .context("timed out flushing json-rpc request")?
            .context("failed flushing json-rpc request to daemon socket")?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = Vec::new();
        timeout(self.timeout, reader.read_until(b'\n', &mut response_line))
            .await
            .context("timed out waiting for json-rpc response")?
            .context("failed reading json-rpc response from daemon socket")?;

        if response_line.is_empty() {
            anyhow::bail!("daemon returned an empty json-rpc response");
        }

        serde_json::from_slice(&response_line).context("failed to decode daemon json-rpc response")
    }
}

pub fn daemon_unavailable_exit_code(error: &anyhow::Error) -> Option<i32> {
    error.downcast_ref::<DaemonUnavailable>().map(DaemonUnavailable::exit_code)
}

pub fn remote_error(error: &anyhow::Error) -> Option<&RemoteError> {
    error.chain().find_map(|cause| cause.downcast_ref::<RemoteError>())
}

pub fn default_socket_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    socket_path_from_home(&home)
}

fn socket_path_from_home(home: &Path) -> PathBuf {
    home.join(SOCKET_RELATIVE_PATH)
}

fn is_daemon_unavailable_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused)
}
