// labnote CLI entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod exit_code;
mod output;

use client::DaemonClient;
use commands::Invocation;
use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "labnote", about = "Lock, autosave and commit notebook records")]
struct Cli {
    /// Act as this user (defaults to $LABNOTE_USER, then $USER).
    #[arg(long, global = true)]
    user: Option<String>,

    /// Daemon socket (defaults to ~/.labnote/daemon.sock).
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::detect(cli.json);
    match run(cli, format) {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            tracing::debug!(error = ?error, "command failed");
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}

fn run(cli: Cli, format: OutputFormat) -> anyhow::Result<()> {
    let user = resolve_user(cli.user)?;
    let client = cli.socket.map(DaemonClient::new).unwrap_or_default();
    let invocation = Invocation { client, user, format };

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(commands::run(cli.command, &invocation))
}

fn resolve_user(explicit: Option<String>) -> anyhow::Result<String> {
    explicit
        .or_else(|| std::env::var("LABNOTE_USER").ok())
        .or_else(|| std::env::var("USER").ok())
        .map(|user| user.trim().to_string())
        .filter(|user| !user.is_empty())
        .context("no user given; pass --user or set LABNOTE_USER")
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{resolve_user, Cli};
    use crate::commands::autosave::AutosaveCommand;
    use crate::commands::session::SessionCommand;
    use crate::commands::Command;
    use labnote_common::types::Permission;

    #[test]
    fn explicit_user_wins() {
        assert_eq!(resolve_user(Some(" alice ".into())).unwrap(), "alice");
    }

    #[test]
    fn parses_save_with_flags() {
        let cli = Cli::try_parse_from(["labnote", "save", "7", "--release", "--baseline", "100", "--user", "bob"])
            .expect("arguments should parse");
        assert_eq!(cli.user.as_deref(), Some("bob"));
        let Command::Save(args) = cli.command else { panic!("expected save") };
        assert_eq!(args.record_id, 7);
        assert!(args.release);
        assert_eq!(args.baseline, Some(100));
    }

    #[test]
    fn parses_autosave_put() {
        let cli = Cli::try_parse_from(["labnote", "autosave", "put", "70", "draft", "--json"])
            .expect("arguments should parse");
        assert!(cli.json);
        let Command::Autosave(AutosaveCommand::Put(args)) = cli.command else {
            panic!("expected autosave put")
        };
        assert_eq!(args.field_id, 70);
        assert_eq!(args.content.as_deref(), Some("draft"));
    }

    #[test]
    fn autosave_put_needs_content_or_file() {
        assert!(Cli::try_parse_from(["labnote", "autosave", "put", "70"]).is_err());
        assert!(Cli::try_parse_from(["labnote", "autosave", "put", "70", "x", "--file", "a.txt"]).is_err());
    }

    #[test]
    fn changes_requires_since() {
        assert!(Cli::try_parse_from(["labnote", "changes", "7"]).is_err());
        assert!(Cli::try_parse_from(["labnote", "changes", "7", "--since", "100"]).is_ok());
    }

    #[test]
    fn parses_session_and_sharing_commands() {
        let cli = Cli::try_parse_from(["labnote", "session", "heartbeat", "abc"]).unwrap();
        let Command::Session(SessionCommand::Heartbeat(args)) = cli.command else {
            panic!("expected session heartbeat")
        };
        assert_eq!(args.session_id, "abc");

        let cli = Cli::try_parse_from(["labnote", "grant", "7", "bob", "write"]).unwrap();
        let Command::Grant(args) = cli.command else { panic!("expected grant") };
        assert_eq!((args.record_id, args.grantee.as_str(), args.permission), (7, "bob", Permission::Write));
        assert!(Cli::try_parse_from(["labnote", "grant", "7", "bob", "admin"]).is_err());

        let cli = Cli::try_parse_from(["labnote", "create", "Assay", "--parent", "2"]).unwrap();
        let Command::Create(args) = cli.command else { panic!("expected create") };
        assert_eq!(args.parent, Some(2));
    }
}
