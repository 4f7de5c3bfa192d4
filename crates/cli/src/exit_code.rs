// Consistent exit codes for the labnote CLI.
//
//   0  = success
//   1  = general error
//   2  = usage or validation error
//   10 = daemon not reachable
//   11 = access denied or lock held elsewhere
//   12 = conflict (record changed, or another save is running)
//   13 = record or field not found

use std::process;

use labnote_common::protocol::jsonrpc::{
    ACCESS_DENIED, DOCUMENT_ALREADY_EDITED, INVALID_PARAMS, NOT_FOUND, OPERATION_IN_PROGRESS,
    VALIDATION_FAILED,
};

use crate::client::{daemon_unavailable_exit_code, remote_error};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    DaemonDown = 10,
    Denied = 11,
    Conflict = 12,
    NotFound = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        if daemon_unavailable_exit_code(err).is_some() {
            return Self::DaemonDown;
        }
        if let Some(remote) = remote_error(err) {
            return Self::from_rpc_code(remote.code);
        }
        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound => {
                        Self::DaemonDown
                    }
                    _ => Self::Error,
                };
            }
        }
        Self::Error
    }

    /// Map a daemon error code to an exit code.
    pub fn from_rpc_code(code: i32) -> Self {
        match code {
            ACCESS_DENIED => Self::Denied,
            DOCUMENT_ALREADY_EDITED | OPERATION_IN_PROGRESS => Self::Conflict,
            VALIDATION_FAILED | INVALID_PARAMS => Self::Usage,
            NOT_FOUND => Self::NotFound,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
