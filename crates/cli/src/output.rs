// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use std::io::{self, IsTerminal, Write};

use labnote_common::protocol::jsonrpc::{
    ACCESS_DENIED, DOCUMENT_ALREADY_EDITED, NOT_FOUND, OPERATION_IN_PROGRESS, VALIDATION_FAILED,
};
use serde::Serialize;

use crate::client::{daemon_unavailable_exit_code, remote_error};

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    /// JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => writeln!(writer, "{}", human_fn(value)),
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    print_stderr(format, "error", ANSI_RED, code, message);
}

pub fn print_warning(format: OutputFormat, code: &str, message: &str) {
    print_stderr(format, "warning", ANSI_YELLOW, code, message);
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, code, &message);
}

fn print_stderr(format: OutputFormat, label: &str, color: &str, code: &str, message: &str) {
    let mut err = io::stderr().lock();
    match format {
        OutputFormat::Human => {
            let line = render_human_stderr_line(label, message, io::stderr().is_terminal(), color);
            let _ = writeln!(err, "{line}");
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({ label: { "code": code, "message": message } });
            let _ = serde_json::to_writer(&mut err, &obj);
            let _ = writeln!(err);
        }
    }
}

fn actionable_error(error: &anyhow::Error) -> (&'static str, String) {
    if daemon_unavailable_exit_code(error).is_some() {
        return (
            "DAEMON_NOT_RUNNING",
            "Daemon is not running. Start it with: labnoted".to_string(),
        );
    }

    if let Some(remote) = remote_error(error) {
        return match remote.code {
            ACCESS_DENIED => match remote.data_str("holder") {
                Some(holder) => (
                    "LOCK_HELD",
                    format!("Record is being edited by {holder}. Try again once they save or unlock."),
                ),
                None => ("ACCESS_DENIED", remote.message.clone()),
            },
            DOCUMENT_ALREADY_EDITED => {
                let record = remote.data_i64("record_id").map_or("<id>".to_string(), |id| id.to_string());
                let baseline = remote.data_i64("baseline").map_or("<date>".to_string(), |d| d.to_string());
                (
                    "DOCUMENT_ALREADY_EDITED",
                    format!(
                        "Record was saved by someone else. Review with: labnote changes {record} --since {baseline}"
                    ),
                )
            }
            OPERATION_IN_PROGRESS => {
                ("OPERATION_IN_PROGRESS", "Another save or delete is running. Retry shortly.".to_string())
            }
            VALIDATION_FAILED => ("VALIDATION_FAILED", remote.message.clone()),
            NOT_FOUND => ("NOT_FOUND", remote.message.clone()),
            _ => ("RPC_ERROR", remote.message.clone()),
        };
    }

    let message = format!("{error:#}");
    if message.to_ascii_lowercase().contains("timed out") {
        return (
            "NETWORK_TIMEOUT",
            "Could not reach daemon. Check if labnoted is running: ps aux | grep labnoted".to_string(),
        );
    }

    ("ERROR", message)
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool, color: &str) -> String {
    if is_tty {
        format!("{color}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}
